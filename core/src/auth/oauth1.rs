//! OAuth 1.0a with HMAC-SHA1 signatures.
//!
//! # Design
//! The three-legged handshake runs inside
//! [`Authenticator::authenticate_request`] and is driven entirely by the
//! request's authentication data:
//!
//! 1. `token` and `token_secret` present: sign the request, nothing else.
//! 2. No temporary credentials: POST to `request_url` for them and report
//!    them to the token callback.
//! 3. No `temporary_token_verifier`: stop with
//!    [`AuthError::AuthorizationRequired`]. The caller sends the end user to
//!    the authorize URL and retries once the provider has called back with a
//!    verifier. Nothing blocks while the user decides.
//! 4. Verifier present: POST to `access_url` for the permanent token, report
//!    it to the token callback, drop the temporary state, then sign.
//!
//! Settings the handshake needs (endpoint URLs, token callback) are checked
//! before the first network call. The consumer key and secret are always
//! required.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;
use tracing::{debug, info};
use url::{form_urlencoded, Url};
use uuid::Uuid;

use super::{AuthData, Authenticator, TokenCallback, TokenCredentials, TokenKind};
use crate::error::{ApiError, AuthError, AuthorizationRequired};
use crate::http::{HttpMethod, HttpRequest};
use crate::request::{encode_form, flatten_params, Request, CONTENT_TYPE_FORM};
use crate::response::Response;
use crate::transport::Transport;

/// RFC 3986 unreserved characters stay as they are; everything else is
/// percent-encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

const REQUEST_TOKEN_LEG: &str = "request token";
const ACCESS_TOKEN_LEG: &str = "access token";

/// OAuth1 percent-encoding.
pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// The signature base string for `method` and `url`.
///
/// Query parameters in `url` are signed along with `params`. The URL is
/// normalized to lowercase scheme and host, without default port, query or
/// fragment.
pub fn signature_base_string(method: HttpMethod, url: &str, params: &[(String, String)]) -> String {
    let mut all: Vec<(String, String)> = Vec::with_capacity(params.len());
    let normalized_url = match Url::parse(url) {
        Ok(parsed) => {
            for (key, value) in parsed.query_pairs() {
                all.push((key.into_owned(), value.into_owned()));
            }
            let mut normalized = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or_default());
            if let Some(port) = parsed.port() {
                normalized.push_str(&format!(":{port}"));
            }
            normalized.push_str(parsed.path());
            normalized
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    all.extend(params.iter().cloned());

    let mut encoded: Vec<(String, String)> = all
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect();
    encoded.sort();
    let parameter_string = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode(&normalized_url),
        percent_encode(&parameter_string)
    )
}

/// Base64 HMAC-SHA1 of `base_string` keyed with both secrets.
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> Result<String, AuthError> {
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| AuthError::Signing(e.to_string()))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `OAuth key="value", ...` with keys and values percent-encoded.
pub fn authorization_header(protocol_params: &[(String, String)]) -> String {
    let pairs = protocol_params
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {pairs}")
}

fn default_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

fn default_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// OAuth 1.0a authenticator.
#[derive(Debug, Clone)]
pub struct OAuth1Authenticator {
    name: String,
    omit_callback: bool,
    nonce: fn() -> String,
    clock: fn() -> u64,
}

/// Settings the handshake legs need, checked up front.
struct Handshake<'a> {
    request_url: &'a str,
    authorize_url: &'a str,
    access_url: &'a str,
    callback_url: Option<&'a str>,
    callback: &'a TokenCallback,
}

impl OAuth1Authenticator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            omit_callback: false,
            nonce: default_nonce,
            clock: default_clock,
        }
    }

    /// Twitter's flavor: the request-token leg carries no `oauth_callback`,
    /// so `callback_url` is not needed either.
    pub fn twitter(name: impl Into<String>) -> Self {
        Self {
            omit_callback: true,
            ..Self::new(name)
        }
    }

    /// Replaces the nonce and timestamp sources.
    pub fn with_clock(mut self, nonce: fn() -> String, clock: fn() -> u64) -> Self {
        self.nonce = nonce;
        self.clock = clock;
        self
    }

    fn protocol_params(&self, consumer_key: &str) -> Vec<(String, String)> {
        vec![
            ("oauth_consumer_key".to_string(), consumer_key.to_string()),
            ("oauth_nonce".to_string(), (self.nonce)()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), (self.clock)().to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ]
    }

    fn setting<'a>(&self, data: &'a AuthData, key: &str) -> Result<&'a str, AuthError> {
        data.get_non_empty(key).ok_or_else(|| AuthError::MissingSetting {
            authenticator: self.name.clone(),
            setting: key.to_string(),
        })
    }

    fn handshake<'a>(&self, data: &'a AuthData) -> Result<Handshake<'a>, AuthError> {
        let request_url = self.setting(data, "request_url")?;
        let authorize_url = self.setting(data, "authorize_url")?;
        let access_url = self.setting(data, "access_url")?;
        let callback_url = if self.omit_callback {
            None
        } else {
            Some(self.setting(data, "callback_url")?)
        };
        let callback = data.token_callback().ok_or_else(|| AuthError::MissingSetting {
            authenticator: self.name.clone(),
            setting: "token_callback".to_string(),
        })?;
        Ok(Handshake {
            request_url,
            authorize_url,
            access_url,
            callback_url,
            callback,
        })
    }

    fn send_leg(
        &self,
        transport: &dyn Transport,
        leg: &'static str,
        request: &HttpRequest,
    ) -> Result<Response, AuthError> {
        let protocol_error = |message: String| AuthError::Protocol {
            leg,
            uri: request.url.clone(),
            message,
        };
        let raw = transport.send(request).map_err(|e| protocol_error(e.to_string()))?;
        let status = raw.status_code();
        if status >= 400 {
            return Err(protocol_error(format!("provider answered with status {status}")));
        }
        Ok(Response::without_route(raw, request.method))
    }

    fn request_temporary_credentials(
        &self,
        transport: &dyn Transport,
        handshake: &Handshake<'_>,
        consumer_key: &str,
        consumer_secret: &str,
    ) -> Result<(String, String), AuthError> {
        let mut protocol = self.protocol_params(consumer_key);
        if let Some(callback_url) = handshake.callback_url {
            protocol.push(("oauth_callback".to_string(), callback_url.to_string()));
        }
        let base = signature_base_string(HttpMethod::Post, handshake.request_url, &protocol);
        protocol.push(("oauth_signature".to_string(), sign(&base, consumer_secret, "")?));

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: handshake.request_url.to_string(),
            headers: vec![("Authorization".to_string(), authorization_header(&protocol))],
            body: None,
        };
        let response = self.send_leg(transport, REQUEST_TOKEN_LEG, &request)?;

        let invalid = |message: &str| AuthError::Protocol {
            leg: REQUEST_TOKEN_LEG,
            uri: handshake.request_url.to_string(),
            message: message.to_string(),
        };
        if handshake.callback_url.is_some() && param_text(&response, "oauth_callback_confirmed").as_deref() != Some("true") {
            return Err(invalid("the callback was not confirmed"));
        }
        let token = param_text(&response, "oauth_token").ok_or_else(|| invalid("no oauth_token in response"))?;
        let secret = param_text(&response, "oauth_token_secret")
            .ok_or_else(|| invalid("no oauth_token_secret in response"))?;
        Ok((token, secret))
    }

    fn request_token_credentials(
        &self,
        transport: &dyn Transport,
        handshake: &Handshake<'_>,
        credentials: &TokenCredentials,
        verifier: &str,
    ) -> Result<(String, String), AuthError> {
        let mut protocol = self.protocol_params(&credentials.consumer_key);
        protocol.push(("oauth_token".to_string(), credentials.token.clone()));
        let body_params = vec![("oauth_verifier".to_string(), verifier.to_string())];

        let mut signed = protocol.clone();
        signed.extend(body_params.iter().cloned());
        let base = signature_base_string(HttpMethod::Post, handshake.access_url, &signed);
        protocol.push((
            "oauth_signature".to_string(),
            sign(&base, &credentials.consumer_secret, &credentials.token_secret)?,
        ));

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: handshake.access_url.to_string(),
            headers: vec![
                ("Authorization".to_string(), authorization_header(&protocol)),
                ("Content-Type".to_string(), CONTENT_TYPE_FORM.to_string()),
            ],
            body: Some(encode_form(&body_params)),
        };
        let response = self.send_leg(transport, ACCESS_TOKEN_LEG, &request)?;

        let invalid = |message: String| AuthError::Protocol {
            leg: ACCESS_TOKEN_LEG,
            uri: handshake.access_url.to_string(),
            message,
        };
        if let Some(error) = param_text(&response, "error") {
            return Err(invalid(format!("provider reported an error: {error}")));
        }
        let token = param_text(&response, "oauth_token").ok_or_else(|| invalid("no oauth_token in response".into()))?;
        let secret = param_text(&response, "oauth_token_secret")
            .ok_or_else(|| invalid("no oauth_token_secret in response".into()))?;
        Ok((token, secret))
    }
}

fn param_text(response: &Response, name: &str) -> Option<String> {
    response
        .get_param(name)
        .and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|value| !value.is_empty())
}

fn authorize_url(base: &str, temporary_token: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("oauth_token", temporary_token)
        .finish();
    format!("{base}{separator}{query}")
}

impl Authenticator for OAuth1Authenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate_request(&self, request: &mut Request, transport: &dyn Transport) -> Result<(), ApiError> {
        let data = self.resolve_data(request);
        let missing = |credential: &str| AuthError::MissingCredentials {
            uri: request.get_uri(),
            credential: credential.to_string(),
        };
        let consumer_key = data.get_non_empty("consumer_key").ok_or_else(|| missing("consumer_key"))?;
        let consumer_secret = data
            .get_non_empty("consumer_secret")
            .ok_or_else(|| missing("consumer_secret"))?;

        let (token, token_secret) = match (data.get_non_empty("token"), data.get_non_empty("token_secret")) {
            (Some(token), Some(secret)) => (token.to_string(), secret.to_string()),
            _ => {
                let handshake = self.handshake(&data)?;

                let (temporary_token, temporary_secret) = match (
                    data.get_non_empty("temporary_token"),
                    data.get_non_empty("temporary_token_secret"),
                ) {
                    (Some(token), Some(secret)) => (token.to_string(), secret.to_string()),
                    _ => {
                        info!(authenticator = %self.name, "requesting temporary credentials");
                        let (token, secret) =
                            self.request_temporary_credentials(transport, &handshake, consumer_key, consumer_secret)?;
                        (handshake.callback)(&TokenCredentials {
                            kind: TokenKind::Temporary,
                            consumer_key: consumer_key.to_string(),
                            consumer_secret: consumer_secret.to_string(),
                            token: token.clone(),
                            token_secret: secret.clone(),
                        });
                        let auth = request.authentication_data_mut();
                        auth.set("temporary_token", token.clone());
                        auth.set("temporary_token_secret", secret.clone());
                        (token, secret)
                    }
                };

                let Some(verifier) = data.get_non_empty("temporary_token_verifier") else {
                    info!(authenticator = %self.name, "user authorization required");
                    return Err(AuthError::AuthorizationRequired(AuthorizationRequired {
                        authorize_url: authorize_url(handshake.authorize_url, &temporary_token),
                        temporary_token,
                        temporary_token_secret: temporary_secret,
                    })
                    .into());
                };

                info!(authenticator = %self.name, "exchanging verifier for token credentials");
                let temporary = TokenCredentials {
                    kind: TokenKind::Temporary,
                    consumer_key: consumer_key.to_string(),
                    consumer_secret: consumer_secret.to_string(),
                    token: temporary_token,
                    token_secret: temporary_secret,
                };
                let (token, secret) = self.request_token_credentials(transport, &handshake, &temporary, verifier)?;
                (handshake.callback)(&TokenCredentials {
                    kind: TokenKind::Permanent,
                    token: token.clone(),
                    token_secret: secret.clone(),
                    ..temporary
                });

                let auth = request.authentication_data_mut();
                for key in ["temporary_token", "temporary_token_secret", "temporary_token_verifier"] {
                    auth.remove(key);
                }
                auth.set("token", token.clone());
                auth.set("token_secret", secret.clone());
                (token, secret)
            }
        };

        let http = request.to_http_request()?;
        let mut protocol = self.protocol_params(consumer_key);
        protocol.push(("oauth_token".to_string(), token));
        let mut signed = protocol.clone();
        if request.get_method() != HttpMethod::Get {
            signed.extend(flatten_params(&request.get_params()));
        }
        let base = signature_base_string(http.method, &http.url, &signed);
        protocol.push(("oauth_signature".to_string(), sign(&base, consumer_secret, &token_secret)?));
        request.set_header("Authorization", authorization_header(&protocol), false);
        debug!(authenticator = %self.name, "request signed");
        Ok(())
    }

    fn is_authenticated(&self, request: &Request) -> bool {
        request
            .get_header("authorization")
            .is_some_and(|value| value.starts_with("OAuth "))
    }
}
