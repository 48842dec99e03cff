//! Client configuration.
//!
//! # Design
//! Settings are a JSON object addressed by dotted paths, so per-structure
//! sections nest naturally: `transporter`, `<structure>.mode`,
//! `<structure>.authenticator`, `<structure>.authentication_data`.
//! A path segment never contains a dot; keys with dots cannot be reached.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    params: Map<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from a JSON object; other values give an empty
    /// config.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(params) => Self { params },
            _ => Self::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.params.get(first)?, |value, segment| value.as_object()?.get(segment))
    }

    /// Text of a scalar setting; `None` for missing, empty and non-string
    /// values.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// `true` when `path` is set to anything but `null`.
    pub fn isset(&self, path: &str) -> bool {
        self.get(path).is_some_and(|value| !value.is_null())
    }

    /// Sets `path`, creating intermediate objects and replacing
    /// intermediate non-object values.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.params;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert(last.to_string(), value.into());
    }

    pub fn unset(&mut self, path: &str) {
        let (parent, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (self.get_object_mut(parent), last),
            None => (Some(&mut self.params), path),
        };
        if let Some(parent) = parent {
            parent.remove(last);
        }
    }

    /// Deep-merges `other` into this config; values from `other` win,
    /// objects are merged key by key.
    pub fn merge(&mut self, other: &Config) {
        merge_maps(&mut self.params, &other.params);
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    fn get_object_mut(&mut self, path: &str) -> Option<&mut Map<String, Value>> {
        let mut current = &mut self.params;
        for segment in path.split('.') {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        Some(current)
    }
}

fn merge_maps(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_maps(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
