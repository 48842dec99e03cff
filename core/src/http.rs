//! HTTP data types for the host-does-IO pattern.
//!
//! # Design
//! These types describe requests and responses as plain data. The core
//! builds `HttpRequest` values and consumes `TransportResponse` values
//! without touching the network; a [`crate::transport::Transport`] does the
//! actual I/O.
//!
//! Header names are canonicalized the same way on both sides: lowercase,
//! with `-` and `_` treated as the same character.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// HTTP method of a request. Only these five are valid route methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ApiError::UnknownMethod(s.to_string())),
        }
    }
}

/// Canonical form of a header name.
pub fn canonicalize_header_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

/// Multi-valued, case and dash/underscore insensitive header map.
///
/// Remembers the name a header was last set with so transports can send it
/// in its usual spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, HeaderEntry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header. With `add`, the value is appended to existing values
    /// instead of replacing them.
    pub fn set(&mut self, name: &str, value: impl Into<String>, add: bool) {
        let key = canonicalize_header_name(name);
        let value = value.into();
        match self.entries.get_mut(&key) {
            Some(entry) if add && !entry.values.is_empty() => entry.values.push(value),
            _ => {
                self.entries.insert(
                    key,
                    HeaderEntry {
                        name: name.to_string(),
                        values: vec![value],
                    },
                );
            }
        }
    }

    pub(crate) fn set_values(&mut self, name: &str, values: Vec<String>) {
        let key = canonicalize_header_name(name);
        match self.entries.get_mut(&key) {
            Some(entry) => entry.values.extend(values),
            None => {
                self.entries.insert(
                    key,
                    HeaderEntry {
                        name: name.to_string(),
                        values,
                    },
                );
            }
        }
    }

    /// Returns the header's values joined with `,`, or `None` if unset.
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries
            .get(&canonicalize_header_name(name))
            .map(|entry| entry.values.join(","))
    }

    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.entries
            .get(&canonicalize_header_name(name))
            .map(|entry| entry.values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonicalize_header_name(name))
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.shift_remove(&canonicalize_header_name(name));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(canonical name, values)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.as_str(), entry.values.as_slice()))
    }

    /// Header lines as `(name, joined value)` in the spelling they were set
    /// with, ready for a transport.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .values()
            .map(|entry| (entry.name.clone(), entry.values.join(",")))
            .collect()
    }
}

/// An HTTP request described as plain data.
///
/// Built by [`crate::request::Request::to_http_request`] and by the OAuth1
/// handshake. A transport executes it and returns a `TransportResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let key = canonicalize_header_name(name);
        self.headers
            .iter()
            .find(|(n, _)| canonicalize_header_name(n) == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A header value as reported by a transport: one string or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Single(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Single(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        HeaderValue::Multiple(values)
    }
}

/// Status line of a transport result. Absent fields default to `200 OK`
/// when the response is parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Raw result of a transport call.
///
/// Deserializes from `{"headers": {...}, "body": "...", "response":
/// {"code": 200, "message": "OK"}}`; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportResponse {
    #[serde(default)]
    pub headers: IndexMap<String, HeaderValue>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub response: StatusInfo,
}

impl TransportResponse {
    pub fn new(code: u16, body: impl Into<String>) -> Self {
        Self {
            headers: IndexMap::new(),
            body: Some(body.into()),
            response: StatusInfo {
                code: Some(code),
                message: None,
            },
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.response.message = Some(message.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        self.response.code.unwrap_or(200)
    }
}
