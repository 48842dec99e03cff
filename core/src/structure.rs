//! API structures: named collections of routes plus base URIs and default
//! authentication settings.
//!
//! # Design
//! [`Structure`] is the seam: anything that can hand out routes and base
//! URIs can back an [`crate::Api`]. [`DefinedStructure`] is the stock
//! implementation, built from a [`StructureDefinition`] that can be written
//! in code or loaded from JSON. Base URIs may contain `{placeholder}`
//! tokens; each one becomes a required string parameter with location
//! `base`.
//!
//! Modes select alternative base URIs and authentication defaults, for
//! example a sandbox and a production endpoint of the same API.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthData;
use crate::error::ApiError;
use crate::param::{ParamLocation, ParamMap, ParamSchema, ParamType};
use crate::route::{Route, RouteDefinition};

pub(crate) static BASE_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("static regex should not panic"));

/// Supplies routes, base URIs and authentication defaults for one API.
pub trait Structure: Send + Sync {
    fn name(&self) -> &str;

    /// Config section holding per-structure overrides.
    fn config_key(&self) -> &str {
        self.name()
    }

    /// Route whose template is `route_uri` or matches it.
    fn get_route_object(&self, route_uri: &str) -> Result<Arc<Route>, ApiError>;

    fn get_base_uri(&self, mode: &str) -> &str;

    /// Default authenticator name, if the API needs one.
    fn get_authenticator(&self) -> Option<&str>;

    fn get_authentication_data_defaults(&self, mode: &str) -> AuthData;
}

/// A base URI and the schemas of its `{placeholder}` parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseUri {
    pub uri: String,
    pub params: ParamMap,
}

impl BaseUri {
    /// Derives placeholder schemas from `uri`. Declared entries may supply a
    /// description, enum values and the internal flag; everything else is
    /// fixed (required string, location `base`).
    pub fn new(uri: impl Into<String>, declared: &ParamMap) -> Self {
        let uri = uri.into();
        let mut params = ParamMap::new();
        for caps in BASE_PLACEHOLDER_RE.captures_iter(&uri) {
            let name = caps[1].to_string();
            let mut schema = ParamSchema {
                required: true,
                param_type: ParamType::String,
                location: ParamLocation::Base,
                ..ParamSchema::default()
            };
            if let Some(declared) = declared.get(&name) {
                schema.description = declared.description.clone();
                schema.enum_values = declared.enum_values.clone();
                schema.internal = declared.internal;
            }
            params.insert(name, schema);
        }
        Self { uri, params }
    }
}

/// The default base URI plus per-mode alternatives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseUris {
    default: BaseUri,
    modes: HashMap<String, BaseUri>,
}

impl BaseUris {
    pub fn new(default: BaseUri) -> Self {
        Self {
            default,
            modes: HashMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>, base: BaseUri) -> Self {
        self.modes.insert(mode.into(), base);
        self
    }

    /// The base URI for `mode`, falling back to the default for an empty or
    /// unknown mode.
    pub fn for_mode(&self, mode: &str) -> &BaseUri {
        if mode.is_empty() {
            return &self.default;
        }
        self.modes.get(mode).unwrap_or(&self.default)
    }
}

/// Declarative description of an API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureDefinition {
    pub base_uri: String,
    pub base_uri_params: ParamMap,
    /// Alternative base URIs keyed by mode.
    pub advanced_uris: IndexMap<String, String>,
    pub advanced_uri_params: IndexMap<String, ParamMap>,
    /// Route templates and their definitions.
    pub routes: IndexMap<String, RouteDefinition>,
    pub authenticator: Option<String>,
    pub authentication_data_defaults: Map<String, Value>,
    pub advanced_authentication_data_defaults: IndexMap<String, Map<String, Value>>,
}

/// A structure built from a [`StructureDefinition`].
#[derive(Debug)]
pub struct DefinedStructure {
    name: String,
    config_key: String,
    base: Arc<BaseUris>,
    routes: IndexMap<String, Arc<Route>>,
    authenticator: Option<String>,
    authentication_data_defaults: Map<String, Value>,
    advanced_authentication_data_defaults: IndexMap<String, Map<String, Value>>,
}

impl DefinedStructure {
    pub fn new(name: impl Into<String>, definition: StructureDefinition) -> Result<Self, ApiError> {
        let name = name.into();

        let mut base = BaseUris::new(BaseUri::new(&definition.base_uri, &definition.base_uri_params));
        for (mode, uri) in &definition.advanced_uris {
            let declared = definition.advanced_uri_params.get(mode).cloned().unwrap_or_default();
            base = base.with_mode(mode.clone(), BaseUri::new(uri, &declared));
        }
        let base = Arc::new(base);

        let mut routes = IndexMap::new();
        for (uri, route_definition) in definition.routes {
            let route = Route::with_base(uri.clone(), route_definition, Arc::clone(&base))?;
            routes.insert(uri, Arc::new(route));
        }

        Ok(Self {
            config_key: name.clone(),
            name,
            base,
            routes,
            authenticator: definition.authenticator.filter(|name| !name.is_empty()),
            authentication_data_defaults: definition.authentication_data_defaults,
            advanced_authentication_data_defaults: definition.advanced_authentication_data_defaults,
        })
    }

    /// Loads a definition from JSON text.
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, ApiError> {
        let definition: StructureDefinition = serde_json::from_str(json)?;
        Self::new(name, definition)
    }

    pub fn with_config_key(mut self, config_key: impl Into<String>) -> Self {
        self.config_key = config_key.into();
        self
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    pub fn has_route(&self, route_uri: &str) -> bool {
        self.get_route_object(route_uri).is_ok()
    }

    pub fn get_base_uri_params(&self, mode: &str) -> &ParamMap {
        &self.base.for_mode(mode).params
    }
}

impl Structure for DefinedStructure {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_key(&self) -> &str {
        &self.config_key
    }

    fn get_route_object(&self, route_uri: &str) -> Result<Arc<Route>, ApiError> {
        if let Some(route) = self.routes.get(route_uri) {
            return Ok(Arc::clone(route));
        }
        self.routes
            .values()
            .find(|route| route.matches(route_uri))
            .cloned()
            .ok_or_else(|| ApiError::UnknownRoute {
                structure: self.name.clone(),
                uri: route_uri.to_string(),
            })
    }

    fn get_base_uri(&self, mode: &str) -> &str {
        &self.base.for_mode(mode).uri
    }

    fn get_authenticator(&self) -> Option<&str> {
        self.authenticator.as_deref()
    }

    fn get_authentication_data_defaults(&self, mode: &str) -> AuthData {
        let defaults = (!mode.is_empty())
            .then(|| self.advanced_authentication_data_defaults.get(mode))
            .flatten()
            .unwrap_or(&self.authentication_data_defaults);
        AuthData::from_map(defaults)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::HttpMethod;

    fn structure() -> DefinedStructure {
        DefinedStructure::from_json(
            "shop",
            &json!({
                "base_uri": "https://{region}.shop.example/api/",
                "base_uri_params": {
                    "region": {"description": "Data center.", "enum": ["eu", "us"], "required": false}
                },
                "advanced_uris": {"sandbox": "https://sandbox.shop.example/api"},
                "routes": {
                    "/orders": {"methods": {"GET": {}, "POST": {}}},
                    "/orders/(?P<id>[\\d]+)": {"methods": {"GET": {}}}
                },
                "authenticator": "bearer",
                "authentication_data_defaults": {"token": "live"},
                "advanced_authentication_data_defaults": {"sandbox": {"token": "test"}}
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn routes_resolve_by_key_then_pattern() {
        let shop = structure();
        assert_eq!(shop.get_route_object("/orders").unwrap().uri(), "/orders");
        assert_eq!(
            shop.get_route_object("/orders/15").unwrap().uri(),
            r"/orders/(?P<id>[\d]+)"
        );
        assert!(shop
            .get_route_object("/orders/15")
            .unwrap()
            .is_method_supported(HttpMethod::Get));
        let err = shop.get_route_object("/customers").unwrap_err();
        assert!(matches!(err, ApiError::UnknownRoute { .. }));
        assert!(!shop.has_route("/customers"));
    }

    #[test]
    fn base_placeholders_become_required_base_params() {
        let shop = structure();
        let params = shop.get_base_uri_params("");
        let region = &params["region"];
        assert!(region.required);
        assert_eq!(region.location, ParamLocation::Base);
        assert_eq!(region.description, "Data center.");
        assert_eq!(region.enum_values, vec!["eu", "us"]);
        assert!(shop.get_base_uri_params("sandbox").is_empty());
    }

    #[test]
    fn modes_select_base_uri_and_auth_defaults() {
        let shop = structure();
        assert_eq!(shop.get_base_uri(""), "https://{region}.shop.example/api/");
        assert_eq!(shop.get_base_uri("sandbox"), "https://sandbox.shop.example/api");
        assert_eq!(shop.get_base_uri("unknown"), "https://{region}.shop.example/api/");
        assert_eq!(shop.get_authentication_data_defaults("").get("token"), Some("live"));
        assert_eq!(
            shop.get_authentication_data_defaults("sandbox").get("token"),
            Some("test")
        );
        assert_eq!(shop.get_authenticator(), Some("bearer"));
    }
}
