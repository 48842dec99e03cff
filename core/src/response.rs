//! Parsed transport results.
//!
//! # Design
//! A `Response` is built once from a [`TransportResponse`] and is read-only
//! afterwards. The body is decoded only when the route declares a JSON
//! response for the method; a body that fails to decode is logged and
//! leaves the response without parsed parameters rather than failing it.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use url::form_urlencoded;

use crate::http::{HeaderValue, Headers, HttpMethod, TransportResponse};
use crate::route::Route;

#[derive(Debug, Clone)]
pub struct Response {
    route: Option<Arc<Route>>,
    method: HttpMethod,
    status_code: u16,
    status_message: String,
    headers: Headers,
    raw_body: String,
    params: Option<Value>,
}

impl Response {
    /// Use [`Route::create_response_object`] rather than calling this
    /// directly.
    pub(crate) fn new(raw: TransportResponse, method: HttpMethod, route: Arc<Route>) -> Self {
        let decode_json = route.uses_json_response(method);
        let mut response = Self::parse(raw, method, Some(route));
        if decode_json {
            response.params = decode_json_body(&response.raw_body);
        }
        response
    }

    /// Parses a result that does not belong to a route, such as an OAuth1
    /// handshake leg. The body is decoded as JSON when the content type says
    /// so and as form data otherwise.
    pub fn without_route(raw: TransportResponse, method: HttpMethod) -> Self {
        let mut response = Self::parse(raw, method, None);
        response.params = if response.get_content_type().contains("json") {
            decode_json_body(&response.raw_body)
        } else {
            let map = form_urlencoded::parse(response.raw_body.trim().as_bytes())
                .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
                .collect::<serde_json::Map<_, _>>();
            (!map.is_empty()).then_some(Value::Object(map))
        };
        response
    }

    fn parse(raw: TransportResponse, method: HttpMethod, route: Option<Arc<Route>>) -> Self {
        let status_code = raw.status_code();
        let status_message = raw
            .response
            .message
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "OK".to_string());

        let mut headers = Headers::new();
        for (name, value) in raw.headers {
            let values = match value {
                HeaderValue::Single(value) => value
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .collect(),
                HeaderValue::Multiple(values) => values,
            };
            headers.set_values(&name, values);
        }

        Self {
            route,
            method,
            status_code,
            status_message,
            headers,
            raw_body: raw.body.unwrap_or_default(),
            params: None,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn raw_body(&self) -> &str {
        &self.raw_body
    }

    /// Header values joined with `,`.
    pub fn get_header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }

    pub fn get_header_values(&self, name: &str) -> Option<&[String]> {
        self.headers.get_all(name)
    }

    pub fn get_headers(&self) -> &Headers {
        &self.headers
    }

    /// Lowercased media type without parameters, or `""`.
    pub fn get_content_type(&self) -> String {
        self.headers
            .get_all("content-type")
            .and_then(|values| values.first())
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .unwrap_or_default()
    }

    /// A top-level field of the decoded body.
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.get(name)
    }

    /// The decoded body; `None` when the body was not decoded or failed to
    /// decode.
    pub fn get_params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    pub fn get_route_object(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn request_method(&self) -> HttpMethod {
        self.method
    }
}

fn decode_json_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "response body is not valid JSON");
            None
        }
    }
}
