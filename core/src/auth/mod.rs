//! Authenticators.
//!
//! # Design
//! An [`Authenticator`] adds credentials to a [`Request`] by setting headers.
//! It reads its credentials from the request's authentication data, laid
//! over the defaults the authenticator declares. Authentication is opt-in
//! per route and method: a request for a method without
//! `needs_authentication` reports no authenticator at all.
//!
//! The transport is passed in explicitly because OAuth1 has to make its own
//! handshake calls before it can sign the request.

mod header;
mod oauth1;
mod session;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::param::scalar_to_string;
use crate::request::Request;
use crate::transport::Transport;

pub use header::{BasicAuthenticator, BearerAuthenticator, XAuthenticator};
pub use oauth1::{
    authorization_header, percent_encode, sign, signature_base_string, OAuth1Authenticator,
};
pub use session::OAuth1Session;

/// Adds credentials to requests.
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Values used for keys the request's authentication data leaves unset.
    fn default_data(&self) -> AuthData {
        AuthData::new()
    }

    /// Sets the scheme's credential headers on `request`.
    fn authenticate_request(&self, request: &mut Request, transport: &dyn Transport) -> Result<(), ApiError>;

    /// Whether this scheme's credentials have already been applied to
    /// `request`. Says nothing about whether the server will accept them.
    fn is_authenticated(&self, request: &Request) -> bool;

    /// The request's authentication data laid over [`Authenticator::default_data`].
    fn resolve_data(&self, request: &Request) -> AuthData {
        request.get_authentication_data().merged_over(&self.default_data())
    }
}

/// Which OAuth1 credential pair a token callback receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Temporary,
    Permanent,
}

/// Credentials handed to a [`TokenCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCredentials {
    pub kind: TokenKind,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

/// Persists OAuth1 tokens obtained during the handshake.
pub type TokenCallback = Arc<dyn Fn(&TokenCredentials) + Send + Sync>;

/// Authentication data bag: string credentials and settings plus an
/// optional token callback.
#[derive(Clone, Default)]
pub struct AuthData {
    values: IndexMap<String, String>,
    token_callback: Option<TokenCallback>,
}

impl AuthData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`AuthData::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Scalars become strings; `null`, lists and maps are skipped.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut data = Self::new();
        for (key, value) in map {
            match value {
                Value::Null | Value::Array(_) | Value::Object(_) => {}
                scalar => data.set(key.clone(), scalar_to_string(scalar)),
            }
        }
        data
    }

    pub fn from_json(value: &Value) -> Self {
        value.as_object().map(Self::from_map).unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.shift_remove(key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Like [`AuthData::get`], treating an empty string as unset.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get_non_empty(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.token_callback.is_none()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn token_callback(&self) -> Option<&TokenCallback> {
        self.token_callback.as_ref()
    }

    pub fn set_token_callback(&mut self, callback: TokenCallback) {
        self.token_callback = Some(callback);
    }

    pub fn with_token_callback(mut self, callback: impl Fn(&TokenCredentials) + Send + Sync + 'static) -> Self {
        self.token_callback = Some(Arc::new(callback));
        self
    }

    /// `self` laid over `defaults`: keys set here win, including empty
    /// values.
    pub fn merged_over(&self, defaults: &AuthData) -> AuthData {
        let mut merged = defaults.clone();
        merged.overlay(self);
        merged
    }

    /// Copies every value (and the callback, if any) of `other` into `self`.
    pub fn overlay(&mut self, other: &AuthData) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
        if let Some(callback) = &other.token_callback {
            self.token_callback = Some(Arc::clone(callback));
        }
    }
}

impl fmt::Debug for AuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthData")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("token_callback", &self.token_callback.is_some())
            .finish()
    }
}

/// The stock authenticators under their usual names: `basic`, `bearer`,
/// `x`, `oauth1` and `twitter-oauth1`.
pub fn default_authenticators() -> Vec<Arc<dyn Authenticator>> {
    vec![
        Arc::new(BasicAuthenticator::new("basic")),
        Arc::new(BearerAuthenticator::new("bearer")),
        Arc::new(XAuthenticator::new("x")),
        Arc::new(OAuth1Authenticator::new("oauth1")),
        Arc::new(OAuth1Authenticator::twitter("twitter-oauth1")),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_json_keeps_scalars_only() {
        let data = AuthData::from_json(&json!({
            "username": "u",
            "port": 8080,
            "flag": true,
            "nested": {"a": 1},
            "missing": null
        }));
        assert_eq!(data.get("username"), Some("u"));
        assert_eq!(data.get("port"), Some("8080"));
        assert_eq!(data.get("flag"), Some("1"));
        assert_eq!(data.get("nested"), None);
        assert_eq!(data.get("missing"), None);
    }

    #[test]
    fn merged_over_prefers_own_values() {
        let defaults = AuthData::new().with("header_name", "Authorization").with("token", "");
        let own = AuthData::new().with("token", "abc").with("header_name", "");
        let merged = own.merged_over(&defaults);
        assert_eq!(merged.get("token"), Some("abc"));
        assert_eq!(merged.get("header_name"), Some(""));
        assert_eq!(merged.get_non_empty("header_name"), None);
    }

    #[test]
    fn debug_output_hides_values() {
        let data = AuthData::new().with("password", "hunter2");
        let rendered = format!("{data:?}");
        assert!(rendered.contains("password"));
        assert!(!rendered.contains("hunter2"));
    }
}
