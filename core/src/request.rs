//! Requests bound to a route and HTTP method.
//!
//! # Design
//! A `Request` resolves parameter values into the places they belong:
//!
//! 1. names absent from the schema go to the custom-parameter bag, if the
//!    method accepts custom parameters;
//! 2. base-URI placeholders are substituted into the base URI;
//! 3. primary (path capture) parameters are substituted into the route path;
//! 4. `query` parameters of non-GET methods go to the query string;
//! 5. everything else is a regular parameter, sent as the body (or as the
//!    query string for GET).
//!
//! Resolved path values are kept per parameter rather than re-read from a
//! partially rendered path, so primary parameters can be set in any order.
//! A path with unresolved captures renders them as their capture token in
//! [`Request::route_uri`] and as an empty segment in [`Request::get_uri`];
//! validity is checked separately by [`Request::is_valid`].

use std::sync::Arc;

use indexmap::IndexMap;
use regex::Captures;
use serde_json::Value;
use url::form_urlencoded;

use crate::auth::AuthData;
use crate::error::ApiError;
use crate::http::{Headers, HttpMethod, HttpRequest};
use crate::param::{coerce, scalar_to_string, ParamLocation, ParamMap, ParamSchema};
use crate::route::Route;
use crate::structure::{BaseUri, BASE_PLACEHOLDER_RE};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// A call in progress against one route and method.
#[derive(Debug, Clone)]
pub struct Request {
    route: Arc<Route>,
    method: HttpMethod,
    base: BaseUri,
    headers: Headers,
    base_params: IndexMap<String, Value>,
    uri_params: IndexMap<String, Value>,
    query_params: IndexMap<String, Value>,
    params: IndexMap<String, Value>,
    custom_params: IndexMap<String, Value>,
    authenticator: Option<String>,
    authentication_data: AuthData,
}

/// Where a parameter name resolves to.
enum Slot<'a> {
    Custom,
    Base(&'a ParamSchema),
    Uri(&'a ParamSchema),
    Query(&'a ParamSchema),
    Regular(&'a ParamSchema),
}

impl Request {
    /// Use [`Route::create_request_object`] rather than calling this
    /// directly; it checks that the method is supported.
    pub(crate) fn new(
        route: Arc<Route>,
        method: HttpMethod,
        base: &BaseUri,
        route_uri: &str,
        authenticator: Option<String>,
        authentication_data: AuthData,
    ) -> Result<Self, ApiError> {
        let mut request = Self {
            route,
            method,
            base: base.clone(),
            headers: Headers::new(),
            base_params: IndexMap::new(),
            uri_params: IndexMap::new(),
            query_params: IndexMap::new(),
            params: IndexMap::new(),
            custom_params: IndexMap::new(),
            authenticator: authenticator.filter(|name| !name.is_empty()),
            authentication_data,
        };

        // A concrete path seeds the primary values it carries.
        for (name, raw) in request.route.capture_primary_values(route_uri) {
            if let Some(schema) = request.route.primary_params().get(&name) {
                let value = coerce(&name, Value::String(raw), schema)?;
                request.uri_params.insert(name, value);
            }
        }

        if let (_, Some(query)) = request.route.split_query(route_uri) {
            for (name, raw) in form_urlencoded::parse(query.as_bytes()) {
                request
                    .query_params
                    .insert(name.into_owned(), Value::String(raw.into_owned()));
            }
        }

        Ok(request)
    }

    pub fn get_method(&self) -> HttpMethod {
        self.method
    }

    pub fn get_route_object(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn base_uri(&self) -> &str {
        &self.base.uri
    }

    /// Whether the body should be JSON encoded.
    pub fn should_use_json(&self) -> bool {
        self.route.uses_json_request(self.method)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>, add: bool) {
        self.headers.set(name, value, add);
    }

    /// Header value with multiple values joined by `,`.
    pub fn get_header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }

    pub fn get_header_values(&self, name: &str) -> Option<&[String]> {
        self.headers.get_all(name)
    }

    pub fn get_headers(&self) -> &Headers {
        &self.headers
    }

    /// Sets a parameter, routing it by its schema.
    pub fn set_param(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ApiError> {
        let value = value.into();
        let route = Arc::clone(&self.route);
        let base_schema = self.base.params.get(name).cloned();
        match self.slot(name, base_schema.as_ref(), &route) {
            Slot::Custom => {
                self.ensure_custom_params(name)?;
                self.custom_params.insert(name.to_string(), value);
                self.maybe_set_default_content_type();
            }
            Slot::Base(schema) => {
                let value = coerce(name, value, schema)?;
                self.base_params.insert(name.to_string(), value);
            }
            Slot::Uri(schema) => {
                let value = coerce(name, value, schema)?;
                self.uri_params.insert(name.to_string(), value);
            }
            Slot::Query(schema) => {
                let value = coerce(name, value, schema)?;
                self.query_params.insert(name.to_string(), value);
            }
            Slot::Regular(schema) => {
                let value = coerce(name, value, schema)?;
                self.params.insert(name.to_string(), value);
                self.maybe_set_default_content_type();
            }
        }
        Ok(())
    }

    pub fn set_params<I, K, V>(&mut self, params: I) -> Result<(), ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in params {
            self.set_param(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Reads a parameter back, falling back to the schema default.
    pub fn get_param(&self, name: &str) -> Result<Option<Value>, ApiError> {
        let base_schema = self.base.params.get(name);
        match self.slot(name, base_schema, &self.route) {
            Slot::Custom => {
                self.ensure_custom_params(name)?;
                Ok(self.custom_params.get(name).cloned())
            }
            Slot::Base(schema) => resolve(name, self.base_params.get(name), schema),
            Slot::Uri(schema) => resolve(name, self.uri_params.get(name), schema),
            Slot::Query(schema) => resolve(name, self.query_params.get(name), schema),
            Slot::Regular(schema) => resolve(name, self.params.get(name), schema),
        }
    }

    /// The parameters a transport sends as the body (or, for GET, as the
    /// query string): regular parameters with a value or default, plus
    /// custom parameters when the method accepts them. Path, base and
    /// non-GET query parameters are excluded; they are already in the URI.
    pub fn get_params(&self) -> IndexMap<String, Value> {
        let mut all = IndexMap::new();
        for (name, schema) in self.route.get_method_params(self.method) {
            if schema.is_primary() || schema.location == ParamLocation::Base {
                continue;
            }
            if self.method != HttpMethod::Get && schema.location == ParamLocation::Query {
                continue;
            }
            let value = self.params.get(&name).or_else(|| schema.default_value());
            if let Some(value) = value.filter(|value| !value.is_null()) {
                all.insert(name, value.clone());
            }
        }
        if self.route.supports_custom_params(self.method) {
            for (name, value) in &self.custom_params {
                all.insert(name.clone(), value.clone());
            }
        }
        all
    }

    /// `Ok(())` when every required parameter has a value, otherwise the
    /// names of all missing ones: unresolved base placeholders first, then
    /// method parameters in declaration order. Internal parameters are
    /// never reported.
    pub fn is_valid(&self) -> Result<(), Vec<String>> {
        let mut missing = Vec::new();

        for (name, schema) in &self.base.params {
            if schema.internal {
                continue;
            }
            let resolved = self
                .base_params
                .get(name)
                .is_some_and(|value| !scalar_to_string(value).is_empty());
            if !resolved {
                missing.push(name.clone());
            }
        }

        for (name, schema) in self.route.get_method_params(self.method) {
            if !schema.required || schema.internal {
                continue;
            }
            let resolved = matches!(self.get_param(&name), Ok(Some(value)) if !value.is_null());
            if !resolved {
                missing.push(name);
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Full URI: base URI with placeholders substituted, the route path with
    /// primary values substituted, and the query string of non-GET query
    /// parameters. Unresolved placeholders render empty.
    pub fn get_uri(&self) -> String {
        let mut uri = BASE_PLACEHOLDER_RE
            .replace_all(&self.base.uri, |caps: &Captures| {
                self.base_params
                    .get(&caps[1])
                    .map(scalar_to_string)
                    .unwrap_or_default()
            })
            .into_owned();
        if !uri.ends_with('/') {
            uri.push('/');
        }

        let path = self.route.render_path(|name| self.uri_param_text(name), false);
        uri.push_str(path.trim_start_matches('/'));

        if let Some(query) = self.query_string() {
            uri.push('?');
            uri.push_str(&query);
        }
        uri
    }

    /// The route path with resolved primary values substituted and
    /// unresolved ones left as their capture token, plus the query string.
    pub fn route_uri(&self) -> String {
        let mut uri = self.route.render_path(|name| self.uri_param_text(name), true);
        if let Some(query) = self.query_string() {
            uri.push('?');
            uri.push_str(&query);
        }
        uri
    }

    /// The authenticator to use, or `None` when this route and method do
    /// not need authentication.
    pub fn get_authenticator(&self) -> Option<&str> {
        if !self.route.needs_authentication(self.method) {
            return None;
        }
        self.authenticator.as_deref()
    }

    /// Authentication data; empty unless an authenticator applies.
    pub fn get_authentication_data(&self) -> AuthData {
        if self.get_authenticator().is_none() {
            return AuthData::new();
        }
        self.authentication_data.clone()
    }

    pub fn authentication_data_mut(&mut self) -> &mut AuthData {
        &mut self.authentication_data
    }

    /// Plain-data form for a transport. GET parameters are appended to the
    /// query string; other methods send them as a JSON or form-encoded body
    /// according to the content type.
    pub fn to_http_request(&self) -> Result<HttpRequest, ApiError> {
        let mut url = self.get_uri();
        let params = self.get_params();

        let body = if self.method == HttpMethod::Get {
            if !params.is_empty() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&encode_form(&flatten_params(&params)));
            }
            None
        } else if params.is_empty() {
            None
        } else if self
            .get_header("content-type")
            .is_some_and(|content_type| content_type.contains("json"))
        {
            Some(serde_json::to_string(&params)?)
        } else {
            Some(encode_form(&flatten_params(&params)))
        };

        Ok(HttpRequest {
            method: self.method,
            url,
            headers: self.headers.to_pairs(),
            body,
        })
    }

    fn slot<'a>(&self, name: &str, base_schema: Option<&'a ParamSchema>, route: &'a Route) -> Slot<'a> {
        if let Some(schema) = base_schema {
            return Slot::Base(schema);
        }
        match route.get_method_param(self.method, name) {
            None => Slot::Custom,
            Some(schema) if schema.location == ParamLocation::Base => Slot::Base(schema),
            Some(schema) if schema.is_primary() => Slot::Uri(schema),
            Some(schema) if self.method != HttpMethod::Get && schema.location == ParamLocation::Query => {
                Slot::Query(schema)
            }
            Some(schema) => Slot::Regular(schema),
        }
    }

    fn ensure_custom_params(&self, name: &str) -> Result<(), ApiError> {
        if self.route.supports_custom_params(self.method) {
            Ok(())
        } else {
            Err(ApiError::CustomParamNotAllowed {
                param: name.to_string(),
                route: self.route.uri().to_string(),
                method: self.method.to_string(),
            })
        }
    }

    fn uri_param_text(&self, name: &str) -> Option<String> {
        self.uri_params
            .get(name)
            .or_else(|| {
                self.route
                    .get_method_param(self.method, name)
                    .and_then(ParamSchema::default_value)
            })
            .map(scalar_to_string)
    }

    fn query_string(&self) -> Option<String> {
        if self.query_params.is_empty() {
            return None;
        }
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.query_params {
            serializer.append_pair(name, &scalar_to_string(value));
        }
        Some(serializer.finish())
    }

    fn maybe_set_default_content_type(&mut self) {
        if self.method == HttpMethod::Get || self.headers.contains("content-type") {
            return;
        }
        let content_type = if self.should_use_json() {
            CONTENT_TYPE_JSON
        } else {
            CONTENT_TYPE_FORM
        };
        self.headers.set("Content-Type", content_type, false);
    }
}

fn resolve(name: &str, stored: Option<&Value>, schema: &ParamSchema) -> Result<Option<Value>, ApiError> {
    match stored {
        Some(value) => Ok(Some(coerce(name, value.clone(), schema)?)),
        None => Ok(schema.default_value().cloned()),
    }
}

/// Flattens parameters into form pairs: lists become repeated `name[]`
/// entries, maps become `name[key]`, booleans become `1`/`0`.
pub fn flatten_params(params: &IndexMap<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in params {
        flatten_value(name, value, &mut pairs);
    }
    pairs
}

fn flatten_value(name: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_value(&format!("{name}[]"), item, pairs);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                flatten_value(&format!("{name}[{key}]"), item, pairs);
            }
        }
        Value::Bool(b) => pairs.push((name.to_string(), if *b { "1" } else { "0" }.to_string())),
        Value::Null => {}
        scalar => pairs.push((name.to_string(), scalar_to_string(scalar))),
    }
}

/// `application/x-www-form-urlencoded` encoding of `pairs`.
pub fn encode_form(pairs: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

/// Schema table of the base placeholders and method parameters together.
pub fn request_schema(request: &Request) -> ParamMap {
    let mut schema = request.base.params.clone();
    for (name, param) in request.route.get_method_params(request.method) {
        schema.insert(name, param);
    }
    schema
}
