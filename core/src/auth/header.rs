//! Authenticators that only set a header: Basic, Bearer and custom `X-`
//! headers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use super::{AuthData, Authenticator};
use crate::error::{ApiError, AuthError};
use crate::request::Request;
use crate::transport::Transport;

fn require<'a>(data: &'a AuthData, request: &Request, credential: &str) -> Result<&'a str, ApiError> {
    data.get_non_empty(credential).ok_or_else(|| {
        AuthError::MissingCredentials {
            uri: request.get_uri(),
            credential: credential.to_string(),
        }
        .into()
    })
}

/// HTTP Basic: `Authorization: Basic base64(username:password)`.
#[derive(Debug, Clone)]
pub struct BasicAuthenticator {
    name: String,
}

impl BasicAuthenticator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Authenticator for BasicAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate_request(&self, request: &mut Request, _transport: &dyn Transport) -> Result<(), ApiError> {
        let data = self.resolve_data(request);
        let username = require(&data, request, "username")?;
        let password = require(&data, request, "password")?;
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        request.set_header("Authorization", format!("Basic {encoded}"), false);
        debug!(authenticator = %self.name, "basic credentials applied");
        Ok(())
    }

    fn is_authenticated(&self, request: &Request) -> bool {
        request
            .get_header("authorization")
            .is_some_and(|value| value.starts_with("Basic "))
    }
}

/// OAuth2-style bearer token: `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerAuthenticator {
    name: String,
}

impl BearerAuthenticator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Authenticator for BearerAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate_request(&self, request: &mut Request, _transport: &dyn Transport) -> Result<(), ApiError> {
        let data = self.resolve_data(request);
        let token = require(&data, request, "token")?;
        request.set_header("Authorization", format!("Bearer {token}"), false);
        debug!(authenticator = %self.name, "bearer token applied");
        Ok(())
    }

    fn is_authenticated(&self, request: &Request) -> bool {
        request
            .get_header("authorization")
            .is_some_and(|value| value.starts_with("Bearer "))
    }
}

/// Sends the `token` as-is in a custom `X-` header.
///
/// `header_name` defaults to `Authorization`; a name without the `X-` prefix
/// gets one, so the default header is `X-Authorization`.
#[derive(Debug, Clone)]
pub struct XAuthenticator {
    name: String,
}

impl XAuthenticator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn header_name(data: &AuthData) -> String {
        let name = data.get_non_empty("header_name").unwrap_or("Authorization");
        if name.get(..2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("x-")) {
            name.to_string()
        } else {
            format!("X-{name}")
        }
    }
}

impl Authenticator for XAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_data(&self) -> AuthData {
        AuthData::new().with("header_name", "Authorization")
    }

    fn authenticate_request(&self, request: &mut Request, _transport: &dyn Transport) -> Result<(), ApiError> {
        let data = self.resolve_data(request);
        let token = require(&data, request, "token")?.to_string();
        let header = Self::header_name(&data);
        debug!(authenticator = %self.name, header = %header, "header token applied");
        request.set_header(&header, token, false);
        Ok(())
    }

    fn is_authenticated(&self, request: &Request) -> bool {
        let data = self.resolve_data(request);
        request.get_headers().contains(&Self::header_name(&data))
    }
}
