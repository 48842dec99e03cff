//! Generic HTTP API client core.
//!
//! # Overview
//! APIs are described declaratively as structures: base URIs, routes given as
//! URI templates, and per-method parameter schemas. The core turns calls
//! against such a description into validated, authenticated HTTP requests and
//! parses the results. It never touches the network itself (host-does-IO
//! pattern): every round-trip goes through a [`Transport`] supplied by the
//! host.
//!
//! # Design
//! - [`Route`] and [`Structure`] are immutable once built and shared as `Arc`.
//! - A [`Request`] is created per call, filled with [`Request::set_param`],
//!   and sent once with [`ApiClient::send_request`].
//! - Authenticators only set headers. OAuth1 may additionally run its
//!   handshake through the same transport and can suspend with
//!   [`ApiError::authorization_required`] until the end user has authorized
//!   the client.
//! - Pluggable components are registered by name in a [`Context`].

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod param;
pub mod request;
pub mod response;
pub mod route;
pub mod storage;
pub mod structure;
pub mod transport;

pub use api::Api;
pub use auth::{
    AuthData, Authenticator, BasicAuthenticator, BearerAuthenticator, OAuth1Authenticator, OAuth1Session,
    TokenCallback, TokenCredentials, TokenKind, XAuthenticator,
};
pub use client::ApiClient;
pub use config::Config;
pub use context::{ClientObserver, Context, Registry};
pub use error::{ApiError, AuthError, AuthorizationRequired, TransportError, ValidationError};
pub use http::{HeaderValue, Headers, HttpMethod, HttpRequest, StatusInfo, TransportResponse};
pub use param::{coerce, ParamLocation, ParamMap, ParamSchema, ParamType};
pub use request::Request;
pub use response::Response;
pub use route::{MethodSpec, PrimaryParamDefinition, Route, RouteDefinition};
pub use storage::{MemoryStorage, Storage};
pub use structure::{BaseUri, BaseUris, DefinedStructure, Structure, StructureDefinition};
pub use transport::Transport;
