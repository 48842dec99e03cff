//! Named client instances and request sending.
//!
//! # Design
//! An `ApiClient` pairs a name and a [`Config`] with a shared [`Context`].
//! Requests are created through [`ApiClient::get_request_object`] (or an
//! [`Api`] view) and sent with [`ApiClient::send_request`], which runs the
//! fixed pipeline: validate, resolve the transport, authenticate if needed,
//! send, parse. The transport is resolved before authenticating because the
//! OAuth1 handshake sends its own requests through it.
//!
//! With `config_updater` set and `config_updater_storage` naming a
//! registered storage, the client manages OAuth1 handshake state through an
//! [`OAuth1Session`] on that storage.

use std::sync::Arc;

use tracing::{debug, info};

use crate::api::Api;
use crate::auth::OAuth1Session;
use crate::config::Config;
use crate::context::Context;
use crate::error::{ApiError, ValidationError};
use crate::http::HttpMethod;
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct ApiClient {
    name: String,
    context: Arc<Context>,
    config: Config,
    session: Option<OAuth1Session>,
}

impl ApiClient {
    pub fn new(name: impl Into<String>, context: Arc<Context>, config: Config) -> Result<Self, ApiError> {
        let name = name.into();
        let session = Self::session_from_config(&name, &context, &config)?;
        let client = Self {
            name,
            context,
            config,
            session,
        };
        for observer in client.context.observers() {
            observer.on_started(&client.name);
        }
        info!(client = %client.name, "api client started");
        Ok(client)
    }

    fn session_from_config(name: &str, context: &Context, config: &Config) -> Result<Option<OAuth1Session>, ApiError> {
        let enabled = config.get("config_updater").and_then(|v| v.as_bool()).unwrap_or(false);
        let Some(storage_name) = config.get_str("config_updater_storage").filter(|_| enabled) else {
            return Ok(None);
        };
        let storage = context.storages().require(storage_name)?;
        let mut session = OAuth1Session::new(name, storage);
        if let Some(url) = config.get_str("config_updater_callback_url") {
            session = session.with_callback_base_url(url);
        }
        Ok(Some(session))
    }

    /// Replaces the OAuth1 session.
    pub fn with_session(mut self, session: OAuth1Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn session(&self) -> Option<&OAuth1Session> {
        self.session.as_ref()
    }

    /// The API backed by the structure registered as `structure`.
    pub fn api(&self, structure: &str) -> Result<Api<'_>, ApiError> {
        let structure = self.context.structures().require(structure)?;
        Ok(Api::new(self, structure))
    }

    pub fn get_request_object(&self, structure: &str, route_uri: &str, method: HttpMethod) -> Result<Request, ApiError> {
        self.api(structure)?.get_request_object(route_uri, method)
    }

    /// Validates, authenticates and sends `request`.
    ///
    /// Authentication headers are left on `request`, as is any
    /// authentication data the authenticator obtained. An OAuth1 handshake
    /// waiting for the user surfaces as an error for which
    /// [`ApiError::is_authorization_required`] is true.
    pub fn send_request(&self, request: &mut Request) -> Result<Response, ApiError> {
        for observer in self.context.observers() {
            observer.before_send(&self.name, request);
        }

        request.is_valid().map_err(ValidationError::MissingParams)?;

        let transport = self.resolve_transport()?;
        self.authenticate(request, transport.as_ref())?;

        let http = request.to_http_request()?;
        debug!(client = %self.name, method = %http.method, url = %http.url, "sending request");
        let raw = transport.send(&http)?;
        let response = request
            .get_route_object()
            .create_response_object(raw, request.get_method())?;
        info!(
            client = %self.name,
            method = %http.method,
            url = %http.url,
            status = response.status_code(),
            "response received"
        );

        for observer in self.context.observers() {
            observer.on_response(&self.name, request, &response);
        }
        Ok(response)
    }

    fn resolve_transport(&self) -> Result<Arc<dyn Transport>, ApiError> {
        match self.config.get_str("transporter") {
            Some(name) => self.context.transports().require(name),
            None => self.context.transports().default().ok_or(ApiError::NoTransport),
        }
    }

    fn authenticate(&self, request: &mut Request, transport: &dyn Transport) -> Result<(), ApiError> {
        let Some(name) = request.get_authenticator().map(str::to_string) else {
            return Ok(());
        };
        for observer in self.context.observers() {
            observer.before_authenticate(&self.name, request);
        }
        let authenticator = self.context.authenticators().require(&name)?;
        if authenticator.is_authenticated(request) {
            debug!(client = %self.name, authenticator = %name, "request already authenticated");
            return Ok(());
        }
        authenticator.authenticate_request(request, transport)?;
        debug!(client = %self.name, authenticator = %name, "request authenticated");
        Ok(())
    }
}
