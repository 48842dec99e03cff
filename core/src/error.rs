//! Error types for the API client core.
//!
//! # Design
//! Parameter problems are reported where they happen (`set_param`,
//! `get_param`, request creation) so an invalid value never reaches a
//! transport. `ValidationError::MissingParams` is the one aggregated report:
//! it lists every missing required parameter at once.
//!
//! `AuthError::AuthorizationRequired` is not a failure. It carries what a
//! caller needs to send the end user to the provider and resume the OAuth1
//! handshake later; use [`ApiError::authorization_required`] to pick it out.

use thiserror::Error;

/// Errors returned by request building, validation and sending.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A parameter value was rejected or required parameters are missing.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A method name outside GET, POST, PUT, PATCH and DELETE.
    #[error("unsupported HTTP method: {0}")]
    UnknownMethod(String),

    /// The route does not declare the requested HTTP method.
    #[error("route {route} does not support method {method}")]
    UnsupportedMethod { route: String, method: String },

    /// A parameter outside the route's schema was used on a method that
    /// does not accept custom parameters.
    #[error("cannot use unsupported parameter {param} for route {route} with method {method}")]
    CustomParamNotAllowed {
        param: String,
        route: String,
        method: String,
    },

    /// No route of the structure matches the requested URI.
    #[error("the API {structure} does not provide a route for {uri}")]
    UnknownRoute { structure: String, uri: String },

    /// A route template could not be compiled into a matcher.
    #[error("invalid route template {uri}: {source}")]
    InvalidRoute {
        uri: String,
        #[source]
        source: regex::Error,
    },

    /// A transporter, authenticator, structure or storage lookup failed.
    #[error("no {kind} registered under the name {name}")]
    NotRegistered { kind: &'static str, name: String },

    #[error("the {kind} {name} already exists")]
    AlreadyRegistered { kind: &'static str, name: String },

    /// Neither a configured nor a default transport is available.
    #[error("the request cannot be sent as no transporter is available")]
    NoTransport,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request body could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Returns the OAuth1 resume data if this is the "authorization
    /// required" signal rather than a failure.
    pub fn authorization_required(&self) -> Option<&AuthorizationRequired> {
        match self {
            ApiError::Auth(AuthError::AuthorizationRequired(signal)) => Some(signal),
            _ => None,
        }
    }

    pub fn is_authorization_required(&self) -> bool {
        self.authorization_required().is_some()
    }
}

/// Parameter coercion and request validation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("the value {value} of {param} is smaller than the minimum allowed value of {minimum}")]
    BelowMinimum {
        param: String,
        value: i64,
        minimum: i64,
    },

    #[error("the value {value} of {param} is greater than the maximum allowed value of {maximum}")]
    AboveMaximum {
        param: String,
        value: i64,
        maximum: i64,
    },

    #[error("the value {value} of {param} is not within the allowed values of {}", .allowed.join(", "))]
    NotInEnum {
        param: String,
        value: String,
        allowed: Vec<String>,
    },

    /// A list or map was supplied for a scalar string parameter.
    #[error("the parameter {param} expects a scalar value")]
    NotScalar { param: String },

    #[error("the following required parameters have not been provided: {}", .0.join(", "))]
    MissingParams(Vec<String>),
}

impl ValidationError {
    /// Returns `true` for the minimum/maximum violations.
    pub fn is_range_error(&self) -> bool {
        matches!(self, Self::BelowMinimum { .. } | Self::AboveMaximum { .. })
    }

    pub fn is_enum_error(&self) -> bool {
        matches!(self, Self::NotInEnum { .. })
    }
}

/// Authentication errors, plus the OAuth1 suspension signal.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential the scheme needs is absent from the authentication data.
    #[error("the request to {uri} could not be authenticated as {credential} has not been provided")]
    MissingCredentials { uri: String, credential: String },

    /// A setting the authenticator needs (endpoint URL, token callback) is
    /// absent. Reported before any network call.
    #[error("the authenticator {authenticator} is missing the setting {setting}")]
    MissingSetting {
        authenticator: String,
        setting: String,
    },

    /// A handshake leg failed or returned an unusable response.
    #[error("the {leg} request to {uri} failed: {message}")]
    Protocol {
        leg: &'static str,
        uri: String,
        message: String,
    },

    /// The signing key was rejected by the HMAC implementation.
    #[error("the request could not be signed: {0}")]
    Signing(String),

    /// The end user has to authorize the temporary credentials first.
    #[error("authorization is required: {}", .0.authorize_url)]
    AuthorizationRequired(AuthorizationRequired),
}

/// Resume data for a suspended OAuth1 handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequired {
    /// Provider URL the end user must visit, with `oauth_token` appended.
    pub authorize_url: String,
    pub temporary_token: String,
    pub temporary_token_secret: String,
}

/// Opaque failure reported by a [`crate::transport::Transport`].
#[derive(Debug, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
