//! One structure seen through one client's configuration.

use std::sync::Arc;

use tracing::debug;

use crate::auth::AuthData;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::http::{HttpMethod, TransportResponse};
use crate::request::Request;
use crate::response::Response;
use crate::structure::Structure;

/// Creates requests for a structure, applying the client's per-structure
/// settings: `<config key>.mode`, `<config key>.authenticator` and
/// `<config key>.authentication_data`.
#[derive(Clone)]
pub struct Api<'a> {
    client: &'a ApiClient,
    structure: Arc<dyn Structure>,
}

impl<'a> Api<'a> {
    pub(crate) fn new(client: &'a ApiClient, structure: Arc<dyn Structure>) -> Self {
        Self { client, structure }
    }

    pub fn structure(&self) -> &Arc<dyn Structure> {
        &self.structure
    }

    pub fn name(&self) -> &str {
        self.structure.name()
    }

    /// The configured mode, or `""` for the default base URI.
    pub fn mode(&self) -> &str {
        let key = format!("{}.mode", self.structure.config_key());
        self.client.config().get_str(&key).unwrap_or_default()
    }

    pub fn get_request_object(&self, route_uri: &str, method: HttpMethod) -> Result<Request, ApiError> {
        let route = self.structure.get_route_object(route_uri)?;
        let config = self.client.config();
        let config_key = self.structure.config_key();
        let mode = self.mode();

        let authenticator = config
            .get_str(&format!("{config_key}.authenticator"))
            .or_else(|| self.structure.get_authenticator())
            .map(str::to_string);

        let mut data = self.structure.get_authentication_data_defaults(mode);
        if let Some(overrides) = config.get(&format!("{config_key}.authentication_data")) {
            data.overlay(&AuthData::from_json(overrides));
        }
        if let Some(session) = self.client.session() {
            session.overlay(self.structure.name(), &mut data);
        }
        if data.token_callback().is_none() {
            if let Some(callback) = self.client.context().token_callback(self.structure.name()) {
                data.set_token_callback(Arc::clone(callback));
            }
        }

        debug!(
            structure = %self.structure.name(),
            route = %route.uri(),
            method = %method,
            mode = %mode,
            "creating request"
        );
        route.create_request_object(route_uri, method, mode, authenticator, data)
    }

    /// Parses a transport result for `request`.
    pub fn get_response_object(&self, request: &Request, raw: TransportResponse) -> Result<Response, ApiError> {
        request
            .get_route_object()
            .create_response_object(raw, request.get_method())
    }
}
