//! Persistence glue for the OAuth1 handshake.
//!
//! # Design
//! The handshake spans two separate invocations with a browser redirect in
//! between, so its state has to live outside the process. An
//! `OAuth1Session` connects the authenticator to a [`Storage`]:
//!
//! - [`OAuth1Session::overlay`] copies stored handshake values into a
//!   structure's authentication data and installs a token callback that
//!   writes new tokens back;
//! - [`OAuth1Session::handle_callback`] accepts the provider's redirect and
//!   stores the verifier, so the next request resumes the handshake.
//!
//! Structures are only managed when their authentication data has a
//! consumer key and secret but no permanent token pair of its own.

use std::sync::Arc;

use tracing::{debug, warn};
use url::form_urlencoded;

use super::{AuthData, TokenCallback, TokenCredentials, TokenKind};
use crate::storage::Storage;

const HANDSHAKE_FIELDS: [&str; 7] = [
    "consumer_key",
    "consumer_secret",
    "temporary_token",
    "temporary_token_secret",
    "temporary_token_verifier",
    "token",
    "token_secret",
];

const TEMPORARY_FIELDS: [&str; 3] = [
    "temporary_token",
    "temporary_token_secret",
    "temporary_token_verifier",
];

#[derive(Clone)]
pub struct OAuth1Session {
    client_name: String,
    storage: Arc<dyn Storage>,
    callback_base_url: Option<String>,
}

impl std::fmt::Debug for OAuth1Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Session")
            .field("client_name", &self.client_name)
            .field("callback_base_url", &self.callback_base_url)
            .finish()
    }
}

impl OAuth1Session {
    pub fn new(client_name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            client_name: client_name.into(),
            storage,
            callback_base_url: None,
        }
    }

    /// Derives `callback_url` for managed structures that do not set one:
    /// `base` plus the listener query variable naming the structure.
    pub fn with_callback_base_url(mut self, base: impl Into<String>) -> Self {
        self.callback_base_url = Some(base.into());
        self
    }

    /// Storage basename: `<client name>_config_auth`.
    pub fn basename(&self) -> String {
        format!("{}_config_auth", self.client_name)
    }

    /// Query variable that carries the structure name in callback URLs.
    pub fn listener_query_var(&self) -> String {
        format!("apiapi_{}_callback", self.client_name)
    }

    pub fn manages(data: &AuthData) -> bool {
        data.has("consumer_key")
            && data.has("consumer_secret")
            && !(data.has("token") && data.has("token_secret"))
    }

    /// Lays stored handshake values over `data` and installs the token
    /// callback, if `data` is managed.
    pub fn overlay(&self, structure: &str, data: &mut AuthData) {
        if !Self::manages(data) {
            return;
        }
        let basename = self.basename();
        for (key, value) in self.storage.get_multi(&basename, structure, &HANDSHAKE_FIELDS) {
            if !value.is_empty() {
                data.set(key, value);
            }
        }
        if !data.has("callback_url") {
            if let Some(base) = &self.callback_base_url {
                data.set("callback_url", self.callback_url(base, structure));
            }
        }
        if data.token_callback().is_none() {
            data.set_token_callback(self.token_callback(structure));
        }
    }

    fn callback_url(&self, base: &str, structure: &str) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(&self.listener_query_var(), structure)
            .finish();
        format!("{base}{separator}{query}")
    }

    /// Callback persisting tokens for `structure`. Permanent tokens replace
    /// the temporary handshake state.
    pub fn token_callback(&self, structure: &str) -> TokenCallback {
        let storage = Arc::clone(&self.storage);
        let basename = self.basename();
        let structure = structure.to_string();
        Arc::new(move |credentials: &TokenCredentials| {
            match credentials.kind {
                TokenKind::Temporary => storage.set_multi(
                    &basename,
                    &structure,
                    &[
                        ("temporary_token", credentials.token.as_str()),
                        ("temporary_token_secret", credentials.token_secret.as_str()),
                    ],
                ),
                TokenKind::Permanent => {
                    storage.delete_multi(&basename, &structure, &TEMPORARY_FIELDS);
                    storage.set_multi(
                        &basename,
                        &structure,
                        &[
                            ("token", credentials.token.as_str()),
                            ("token_secret", credentials.token_secret.as_str()),
                        ],
                    );
                }
            }
            debug!(structure = %structure, kind = ?credentials.kind, "stored oauth1 tokens");
        })
    }

    /// Accepts the provider's redirect for `structure`. Returns `false` and
    /// stores nothing when `oauth_token` is not the pending temporary token.
    pub fn handle_callback(&self, structure: &str, oauth_token: &str, oauth_verifier: &str) -> bool {
        let basename = self.basename();
        let pending = self.storage.get(&basename, structure, "temporary_token");
        if pending.as_deref() != Some(oauth_token) || oauth_token.is_empty() {
            warn!(structure = %structure, "oauth1 callback does not match the pending temporary token");
            return false;
        }
        self.storage
            .set(&basename, structure, "temporary_token_verifier", oauth_verifier);
        debug!(structure = %structure, "stored oauth1 verifier");
        true
    }

    /// [`OAuth1Session::handle_callback`] for a raw callback query string.
    pub fn handle_callback_query(&self, query: &str) -> bool {
        let listener = self.listener_query_var();
        let mut structure = None;
        let mut token = None;
        let mut verifier = None;
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match &*key {
                k if k == listener => structure = Some(value.into_owned()),
                "oauth_token" => token = Some(value.into_owned()),
                "oauth_verifier" => verifier = Some(value.into_owned()),
                _ => {}
            }
        }
        match (structure, token, verifier) {
            (Some(structure), Some(token), Some(verifier)) => self.handle_callback(&structure, &token, &verifier),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn session() -> (OAuth1Session, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (OAuth1Session::new("app", storage.clone()), storage)
    }

    fn consumer() -> AuthData {
        AuthData::new().with("consumer_key", "ck").with("consumer_secret", "cs")
    }

    #[test]
    fn naming_follows_client_name() {
        let (session, _) = session();
        assert_eq!(session.basename(), "app_config_auth");
        assert_eq!(session.listener_query_var(), "apiapi_app_callback");
    }

    #[test]
    fn overlay_loads_stored_values_and_installs_callback() {
        let (session, storage) = session();
        storage.set("app_config_auth", "tw", "temporary_token", "tmp");
        storage.set("app_config_auth", "tw", "temporary_token_secret", "");
        let session = session.with_callback_base_url("https://app.example/cb?x=1");

        let mut data = consumer();
        session.overlay("tw", &mut data);
        assert_eq!(data.get("temporary_token"), Some("tmp"));
        assert_eq!(data.get("temporary_token_secret"), None);
        assert_eq!(
            data.get("callback_url"),
            Some("https://app.example/cb?x=1&apiapi_app_callback=tw")
        );
        assert!(data.token_callback().is_some());
    }

    #[test]
    fn unmanaged_data_is_left_alone() {
        let (session, storage) = session();
        storage.set("app_config_auth", "tw", "temporary_token", "tmp");
        let mut data = consumer().with("token", "t").with("token_secret", "s");
        session.overlay("tw", &mut data);
        assert_eq!(data.get("temporary_token"), None);
        assert!(data.token_callback().is_none());

        let mut data = AuthData::new().with("consumer_key", "ck");
        session.overlay("tw", &mut data);
        assert!(data.token_callback().is_none());
    }

    #[test]
    fn permanent_tokens_replace_temporary_state() {
        let (session, storage) = session();
        let callback = session.token_callback("tw");
        let mut credentials = TokenCredentials {
            kind: TokenKind::Temporary,
            consumer_key: "ck".into(),
            consumer_secret: "cs".into(),
            token: "tmp".into(),
            token_secret: "tmps".into(),
        };
        callback(&credentials);
        assert!(session.handle_callback("tw", "tmp", "ver"));
        assert_eq!(storage.get("app_config_auth", "tw", "temporary_token_verifier").as_deref(), Some("ver"));

        credentials.kind = TokenKind::Permanent;
        credentials.token = "perm".into();
        credentials.token_secret = "perms".into();
        callback(&credentials);
        assert_eq!(storage.get("app_config_auth", "tw", "token").as_deref(), Some("perm"));
        assert_eq!(storage.get("app_config_auth", "tw", "temporary_token"), None);
        assert_eq!(storage.get("app_config_auth", "tw", "temporary_token_verifier"), None);
    }

    #[test]
    fn callback_with_foreign_token_is_rejected() {
        let (session, storage) = session();
        storage.set("app_config_auth", "tw", "temporary_token", "tmp");
        assert!(!session.handle_callback("tw", "other", "ver"));
        assert!(!session.handle_callback("unknown", "tmp", "ver"));
        assert_eq!(storage.get("app_config_auth", "tw", "temporary_token_verifier"), None);
    }

    #[test]
    fn callback_query_is_parsed() {
        let (session, storage) = session();
        storage.set("app_config_auth", "tw", "temporary_token", "tmp");
        assert!(!session.handle_callback_query("?apiapi_app_callback=tw&oauth_token=tmp"));
        assert!(session.handle_callback_query("?apiapi_app_callback=tw&oauth_token=tmp&oauth_verifier=v"));
        assert_eq!(storage.get("app_config_auth", "tw", "temporary_token_verifier").as_deref(), Some("v"));
    }
}
