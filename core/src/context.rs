//! Named components shared by client instances.
//!
//! # Design
//! A [`Context`] holds one [`Registry`] per pluggable concern (transports,
//! authenticators, structures, storages), the token-callback table and the
//! lifecycle observers. It is assembled up front and then shared read-only
//! as `Arc<Context>` between [`crate::ApiClient`] instances.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::auth::{default_authenticators, Authenticator, TokenCallback};
use crate::error::ApiError;
use crate::request::Request;
use crate::response::Response;
use crate::storage::{MemoryStorage, Storage};
use crate::structure::Structure;
use crate::transport::Transport;

/// Name to `Arc<T>` map with an optional explicit default.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: IndexMap<String, Arc<T>>,
    default: Option<String>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
            default: None,
        }
    }

    /// Fails if `name` is taken.
    pub fn register(&mut self, name: impl Into<String>, item: Arc<T>) -> Result<(), ApiError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ApiError::AlreadyRegistered { kind: self.kind, name });
        }
        self.entries.insert(name, item);
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) {
        self.entries.shift_remove(name);
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    /// Like [`Registry::get`], failing with `NotRegistered`.
    pub fn require(&self, name: &str) -> Result<Arc<T>, ApiError> {
        self.get(name).ok_or_else(|| ApiError::NotRegistered {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), ApiError> {
        self.require(name)?;
        self.default = Some(name.to_string());
        Ok(())
    }

    /// The chosen default, else the first registered entry.
    pub fn default(&self) -> Option<Arc<T>> {
        match &self.default {
            Some(name) => self.get(name),
            None => self.entries.values().next().cloned(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

/// Lifecycle hooks. Every method defaults to doing nothing.
pub trait ClientObserver: Send + Sync {
    fn on_started(&self, _client: &str) {}

    fn before_send(&self, _client: &str, _request: &Request) {}

    fn before_authenticate(&self, _client: &str, _request: &Request) {}

    fn on_response(&self, _client: &str, _request: &Request, _response: &Response) {}
}

pub struct Context {
    transports: Registry<dyn Transport>,
    authenticators: Registry<dyn Authenticator>,
    structures: Registry<dyn Structure>,
    storages: Registry<dyn Storage>,
    token_callbacks: HashMap<String, TokenCallback>,
    observers: Vec<Arc<dyn ClientObserver>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self {
            transports: Registry::new("transporter"),
            authenticators: Registry::new("authenticator"),
            structures: Registry::new("structure"),
            storages: Registry::new("storage"),
            token_callbacks: HashMap::new(),
            observers: Vec::new(),
        }
    }

    /// A context with the stock authenticators and a `memory` storage.
    pub fn with_defaults() -> Self {
        let mut context = Self::new();
        for authenticator in default_authenticators() {
            let name = authenticator.name().to_string();
            context.authenticators.entries.insert(name, authenticator);
        }
        context
            .storages
            .entries
            .insert("memory".to_string(), Arc::new(MemoryStorage::new()));
        context
    }

    pub fn transports(&self) -> &Registry<dyn Transport> {
        &self.transports
    }

    pub fn transports_mut(&mut self) -> &mut Registry<dyn Transport> {
        &mut self.transports
    }

    pub fn authenticators(&self) -> &Registry<dyn Authenticator> {
        &self.authenticators
    }

    pub fn authenticators_mut(&mut self) -> &mut Registry<dyn Authenticator> {
        &mut self.authenticators
    }

    pub fn structures(&self) -> &Registry<dyn Structure> {
        &self.structures
    }

    pub fn structures_mut(&mut self) -> &mut Registry<dyn Structure> {
        &mut self.structures
    }

    pub fn storages(&self) -> &Registry<dyn Storage> {
        &self.storages
    }

    pub fn storages_mut(&mut self) -> &mut Registry<dyn Storage> {
        &mut self.storages
    }

    /// Registers a transport.
    pub fn register_transport(&mut self, name: &str, transport: impl Transport + 'static) -> Result<(), ApiError> {
        self.transports.register(name, Arc::new(transport))
    }

    /// Registers a structure under its own name.
    pub fn register_structure(&mut self, structure: impl Structure + 'static) -> Result<(), ApiError> {
        let name = structure.name().to_string();
        self.structures.register(name, Arc::new(structure))
    }

    pub fn register_authenticator(&mut self, authenticator: impl Authenticator + 'static) -> Result<(), ApiError> {
        let name = authenticator.name().to_string();
        self.authenticators.register(name, Arc::new(authenticator))
    }

    /// Token callback used for OAuth1 requests of `structure` when the
    /// authentication data brings none.
    pub fn set_token_callback(&mut self, structure: impl Into<String>, callback: TokenCallback) {
        self.token_callbacks.insert(structure.into(), callback);
    }

    pub fn token_callback(&self, structure: &str) -> Option<&TokenCallback> {
        self.token_callbacks.get(structure)
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ClientObserver>) {
        self.observers.push(observer);
    }

    pub fn observers(&self) -> &[Arc<dyn ClientObserver>] {
        &self.observers
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("transports", &self.transports)
            .field("authenticators", &self.authenticators)
            .field("structures", &self.structures)
            .field("storages", &self.storages)
            .field("token_callbacks", &self.token_callbacks.keys().collect::<Vec<_>>())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::{HttpRequest, TransportResponse};

    fn ok_transport(_: &HttpRequest) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse::default())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut context = Context::new();
        context.register_transport("a", ok_transport).unwrap();
        let err = context.register_transport("a", ok_transport).unwrap_err();
        assert!(matches!(err, ApiError::AlreadyRegistered { kind: "transporter", .. }));
    }

    #[test]
    fn default_is_explicit_or_first() {
        let mut registry: Registry<dyn Storage> = Registry::new("storage");
        assert!(registry.default().is_none());
        let first: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let second: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        registry.register("first", Arc::clone(&first)).unwrap();
        registry.register("second", Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&registry.default().unwrap(), &first));

        registry.set_default("second").unwrap();
        assert!(Arc::ptr_eq(&registry.default().unwrap(), &second));
        assert!(registry.set_default("third").is_err());

        registry.unregister("second");
        assert!(Arc::ptr_eq(&registry.default().unwrap(), &first));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["first"]);
    }

    #[test]
    fn lookups_name_the_kind() {
        let context = Context::with_defaults();
        let err = context.authenticators().require("digest").err().unwrap();
        assert_eq!(err.to_string(), "no authenticator registered under the name digest");
        assert!(context.authenticators().is_registered("twitter-oauth1"));
        assert!(context.storages().is_registered("memory"));
        assert!(context.transports().default().is_none());
    }
}
