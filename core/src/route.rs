//! Route definitions.
//!
//! # Design
//! A route is a URI template such as `/widgets/(?P<id>[\d]+)` plus, per HTTP
//! method, the parameters that method accepts. Every named capture of the
//! shape `/(?P<name>[class]+)` becomes a required "primary" parameter; its
//! type is `integer` when the class is `\d`, `string` otherwise.
//!
//! Routes are immutable once built and are shared as `Arc<Route>` between
//! the structure, requests and responses.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::AuthData;
use crate::error::ApiError;
use crate::http::{HttpMethod, TransportResponse};
use crate::param::{ParamLocation, ParamMap, ParamSchema, ParamType};
use crate::request::Request;
use crate::response::Response;
use crate::structure::BaseUris;

/// Matches one primary-parameter capture group in a route template.
static PRIMARY_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/\(\?P<([A-Za-z_][A-Za-z0-9_]*)>\[(.+?)\]\+\)").expect("static regex should not panic")
});

/// Optional metadata for a primary parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryParamDefinition {
    pub description: String,
    pub default: Option<Value>,
}

/// Behavior and parameters of one HTTP method on a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSpec {
    pub description: String,
    pub params: ParamMap,
    pub supports_custom_params: bool,
    pub uses_json_request: bool,
    pub uses_json_response: bool,
    pub needs_authentication: bool,
}

impl MethodSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, schema: ParamSchema) -> Self {
        self.params.insert(name.into(), schema);
        self
    }

    pub fn custom_params(mut self) -> Self {
        self.supports_custom_params = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.uses_json_request = true;
        self.uses_json_response = true;
        self
    }

    pub fn json_response(mut self) -> Self {
        self.uses_json_response = true;
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.needs_authentication = true;
        self
    }
}

/// Static description of a route, typically loaded from JSON.
///
/// Method keys other than `GET`, `POST`, `PUT`, `PATCH` and `DELETE` are
/// dropped when the route is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteDefinition {
    pub primary_params: IndexMap<String, PrimaryParamDefinition>,
    pub methods: IndexMap<String, MethodSpec>,
}

impl RouteDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod, spec: MethodSpec) -> Self {
        self.methods.insert(method.as_str().to_string(), spec);
        self
    }

    pub fn primary_param(mut self, name: impl Into<String>, definition: PrimaryParamDefinition) -> Self {
        self.primary_params.insert(name.into(), definition);
        self
    }
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    uri: String,
    matcher: Regex,
    primary_params: ParamMap,
    methods: BTreeMap<HttpMethod, MethodSpec>,
    base: Arc<BaseUris>,
}

impl Route {
    /// Builds a route without base URIs; see [`Route::with_base`].
    pub fn new(uri: impl Into<String>, definition: RouteDefinition) -> Result<Self, ApiError> {
        Self::with_base(uri, definition, Arc::new(BaseUris::default()))
    }

    /// Builds a route whose requests resolve against `base`.
    pub fn with_base(
        uri: impl Into<String>,
        definition: RouteDefinition,
        base: Arc<BaseUris>,
    ) -> Result<Self, ApiError> {
        let uri = uri.into();
        let matcher = Regex::new(&format!("(?i)^{uri}$")).map_err(|source| ApiError::InvalidRoute {
            uri: uri.clone(),
            source,
        })?;

        let mut methods = BTreeMap::new();
        for (key, spec) in definition.methods {
            match key.as_str() {
                "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => {
                    if let Ok(method) = key.parse::<HttpMethod>() {
                        methods.insert(method, spec);
                    }
                }
                _ => debug!(route = %uri, method = %key, "dropping unsupported route method"),
            }
        }

        let primary_params = extract_primary_params(&uri, &definition.primary_params);

        Ok(Self {
            uri,
            matcher,
            primary_params,
            methods,
            base,
        })
    }

    /// The URI template.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn primary_params(&self) -> &ParamMap {
        &self.primary_params
    }

    pub fn base_uris(&self) -> &BaseUris {
        &self.base
    }

    /// Whether `route_uri` (without query string) matches the template.
    pub fn matches(&self, route_uri: &str) -> bool {
        self.matcher.is_match(self.split_query(route_uri).0)
    }

    /// Splits `route_uri` into its path and query string. The template
    /// itself contains `?` inside its capture groups, so only what follows
    /// the whole template counts as a query when `route_uri` starts with it.
    pub fn split_query<'a>(&self, route_uri: &'a str) -> (&'a str, Option<&'a str>) {
        if let Some(rest) = route_uri.strip_prefix(self.uri.as_str()) {
            if rest.is_empty() || rest.starts_with('?') {
                return (&route_uri[..self.uri.len()], rest.strip_prefix('?'));
            }
        }
        match route_uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (route_uri, None),
        }
    }

    /// Primary parameter values captured from a concrete `route_uri`.
    pub fn capture_primary_values(&self, route_uri: &str) -> IndexMap<String, String> {
        let mut values = IndexMap::new();
        if let Some(caps) = self.matcher.captures(self.split_query(route_uri).0) {
            for name in self.primary_params.keys() {
                if let Some(m) = caps.name(name) {
                    values.insert(name.clone(), m.as_str().to_string());
                }
            }
        }
        values
    }

    /// Renders the template with each primary capture replaced by the value
    /// `lookup` returns. Unresolved captures stay as their capture token when
    /// `keep_unresolved` is set, otherwise they become empty.
    pub fn render_path(&self, lookup: impl Fn(&str) -> Option<String>, keep_unresolved: bool) -> String {
        PRIMARY_PARAM_RE
            .replace_all(&self.uri, |caps: &Captures| match lookup(&caps[1]) {
                Some(value) => format!("/{value}"),
                None if keep_unresolved => caps[0].to_string(),
                None => "/".to_string(),
            })
            .into_owned()
    }

    pub fn is_method_supported(&self, method: HttpMethod) -> bool {
        self.methods.contains_key(&method)
    }

    pub fn supported_methods(&self) -> impl Iterator<Item = HttpMethod> + '_ {
        self.methods.keys().copied()
    }

    pub fn method_spec(&self, method: HttpMethod) -> Option<&MethodSpec> {
        self.methods.get(&method)
    }

    pub fn method_description(&self, method: HttpMethod) -> &str {
        self.method_spec(method).map_or("", |spec| spec.description.as_str())
    }

    /// Primary params merged with the method's own params (the latter win).
    /// Empty when the method is not supported.
    pub fn get_method_params(&self, method: HttpMethod) -> ParamMap {
        let Some(spec) = self.method_spec(method) else {
            return ParamMap::new();
        };
        let mut params = self.primary_params.clone();
        for (name, schema) in &spec.params {
            params.insert(name.clone(), schema.clone());
        }
        params
    }

    /// Single-parameter lookup with the same precedence as
    /// [`Route::get_method_params`].
    pub fn get_method_param(&self, method: HttpMethod, name: &str) -> Option<&ParamSchema> {
        let spec = self.method_spec(method)?;
        spec.params.get(name).or_else(|| self.primary_params.get(name))
    }

    pub fn supports_custom_params(&self, method: HttpMethod) -> bool {
        self.method_spec(method).is_some_and(|spec| spec.supports_custom_params)
    }

    pub fn uses_json_request(&self, method: HttpMethod) -> bool {
        self.method_spec(method).is_some_and(|spec| spec.uses_json_request)
    }

    pub fn uses_json_response(&self, method: HttpMethod) -> bool {
        self.method_spec(method).is_some_and(|spec| spec.uses_json_response)
    }

    pub fn needs_authentication(&self, method: HttpMethod) -> bool {
        self.method_spec(method).is_some_and(|spec| spec.needs_authentication)
    }

    /// Creates a request for `route_uri` (the template itself or a concrete
    /// path matching it) against the base URI for `mode`.
    pub fn create_request_object(
        self: &Arc<Self>,
        route_uri: &str,
        method: HttpMethod,
        mode: &str,
        authenticator: Option<String>,
        authentication_data: AuthData,
    ) -> Result<Request, ApiError> {
        self.ensure_supported(method)?;
        let base = self.base.for_mode(mode);
        Request::new(
            Arc::clone(self),
            method,
            base,
            route_uri,
            authenticator,
            authentication_data,
        )
    }

    /// Parses a transport result for a request sent with `method`.
    pub fn create_response_object(
        self: &Arc<Self>,
        response: TransportResponse,
        method: HttpMethod,
    ) -> Result<Response, ApiError> {
        self.ensure_supported(method)?;
        Ok(Response::new(response, method, Arc::clone(self)))
    }

    fn ensure_supported(&self, method: HttpMethod) -> Result<(), ApiError> {
        if self.is_method_supported(method) {
            Ok(())
        } else {
            Err(ApiError::UnsupportedMethod {
                route: self.uri.clone(),
                method: method.to_string(),
            })
        }
    }
}

fn extract_primary_params(uri: &str, declared: &IndexMap<String, PrimaryParamDefinition>) -> ParamMap {
    let mut params = ParamMap::new();
    for caps in PRIMARY_PARAM_RE.captures_iter(uri) {
        let name = caps[1].to_string();
        let param_type = if &caps[2] == r"\d" {
            ParamType::Integer
        } else {
            ParamType::String
        };
        let metadata = declared.get(&name).cloned().unwrap_or_default();
        params.insert(
            name,
            ParamSchema {
                required: true,
                description: metadata.description,
                param_type,
                default: metadata.default,
                location: ParamLocation::Uri,
                ..ParamSchema::default()
            },
        );
    }
    params
}
