//! Key/value persistence for values that have to survive between calls,
//! such as OAuth1 handshake state.
//!
//! # Design
//! Keys are grouped as `(basename, group, key)`: the basename identifies the
//! owner (e.g. `myclient_config_auth`), the group is usually a structure
//! name. Storage is best effort; backends log failures instead of
//! returning them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

pub trait Storage: Send + Sync {
    fn set(&self, basename: &str, group: &str, key: &str, value: &str);

    fn get(&self, basename: &str, group: &str, key: &str) -> Option<String>;

    fn delete(&self, basename: &str, group: &str, key: &str);

    fn set_multi(&self, basename: &str, group: &str, values: &[(&str, &str)]) {
        for (key, value) in values {
            self.set(basename, group, key, value);
        }
    }

    /// Values of the `keys` that are set, in the order asked for.
    fn get_multi(&self, basename: &str, group: &str, keys: &[&str]) -> IndexMap<String, String> {
        keys.iter()
            .filter_map(|key| self.get(basename, group, key).map(|value| (key.to_string(), value)))
            .collect()
    }

    fn delete_multi(&self, basename: &str, group: &str, keys: &[&str]) {
        for key in keys {
            self.delete(basename, group, key);
        }
    }
}

type StorageKey = (String, String, String);

/// In-process storage. Values are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StorageKey, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn storage_key(basename: &str, group: &str, key: &str) -> StorageKey {
    (basename.to_string(), group.to_string(), key.to_string())
}

impl Storage for MemoryStorage {
    fn set(&self, basename: &str, group: &str, key: &str, value: &str) {
        self.lock().insert(storage_key(basename, group, key), value.to_string());
    }

    fn get(&self, basename: &str, group: &str, key: &str) -> Option<String> {
        self.lock().get(&storage_key(basename, group, key)).cloned()
    }

    fn delete(&self, basename: &str, group: &str, key: &str) {
        self.lock().remove(&storage_key(basename, group, key));
    }
}
