//! The I/O seam.
//!
//! # Design
//! The core never touches the network. A [`Transport`] takes a plain-data
//! [`HttpRequest`] and returns a [`TransportResponse`]; the host decides how
//! the round-trip happens (blocking client, async runtime, test stub).
//! Closures implement the trait, so a test transport is a one-liner.

use crate::error::TransportError;
use crate::http::{HttpRequest, TransportResponse};

/// Executes HTTP round-trips for the client.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest) -> Result<TransportResponse, TransportError> + Send + Sync,
{
    fn send(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError> {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    #[test]
    fn closures_are_transports() {
        let transport = |request: &HttpRequest| -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::new(201, request.url.clone()))
        };
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: "https://example.com/".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let response = Transport::send(&transport, &request).unwrap();
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.body.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn failures_surface_as_transport_errors() {
        let transport = |_: &HttpRequest| -> Result<TransportResponse, TransportError> {
            Err(TransportError::new("connection refused"))
        };
        let request = HttpRequest {
            method: HttpMethod::Delete,
            url: "https://example.com/x".to_string(),
            headers: Vec::new(),
            body: None,
        };
        let err = transport.send(&request).unwrap_err();
        assert_eq!(err.to_string(), "transport error: connection refused");
    }
}
