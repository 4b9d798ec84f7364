//! Transport layer for target communication
//!
//! A [`Transport`] performs exactly one attempt of one HTTP request. Retry,
//! timeout and header policy live one level up in
//! [`TargetClient`](crate::client::TargetClient).
//! - `http` - reqwest-backed transport for live targets
//! - `mock` - scripted transport for tests

pub mod http;
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::template::HttpRequest;

pub use http::HttpTransport;
pub use mock::{MockResponse, MockTransport};

/// Default cap on captured response body bytes
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Target transport abstraction
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt of `request`
    async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError>;

    /// Get transport type name for logging/debugging
    fn transport_type(&self) -> &'static str;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connect timeout; the per-request timeout is enforced by the client
    pub connect_timeout: Duration,
    /// Maximum response body bytes kept
    pub max_body_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// A received response
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Whether the body was cut at the byte cap
    pub truncated: bool,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            truncated: false,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Why an attempt produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    /// The request cannot be put on the wire (bad header bytes, bad URL)
    InvalidRequest,
    Other,
}

impl TransportErrorKind {
    /// Faults worth exactly one retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionRefused | Self::ConnectionReset)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::ConnectionReset => "connection_reset",
            Self::Timeout => "timeout",
            Self::InvalidRequest => "invalid_request",
            Self::Other => "other",
        }
    }
}

/// A failed transport attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(TransportErrorKind::ConnectionRefused.is_transient());
        assert!(TransportErrorKind::ConnectionReset.is_transient());
        assert!(!TransportErrorKind::Timeout.is_transient());
        assert!(!TransportErrorKind::InvalidRequest.is_transient());
        assert!(!TransportErrorKind::Other.is_transient());
    }

    #[test]
    fn error_display() {
        let err = TransportError::new(TransportErrorKind::ConnectionReset, "peer hung up");
        assert_eq!(err.to_string(), "connection_reset: peer hung up");
    }

    #[test]
    fn default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn response_header_lookup() {
        let mut response = RawResponse::new(200, "{}");
        response
            .headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(response.header("x-missing").is_none());
    }
}
