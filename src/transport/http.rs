//! HTTP transport for live targets
//!
//! One reqwest call per attempt. Response bodies are read chunk by chunk
//! and cut at the configured byte cap.

use std::error::Error as StdError;
use std::io;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::template::HttpRequest;

use super::{RawResponse, Transport, TransportConfig, TransportError, TransportErrorKind};

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .use_rustls_tls()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    fn build(&self, request: &HttpRequest) -> Result<reqwest::Request, TransportError> {
        let invalid = |message: String| TransportError::new(TransportErrorKind::InvalidRequest, message);

        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| invalid(format!("invalid method: {}", e)))?;
        let url = Url::parse(&request.url)
            .map_err(|e| invalid(format!("invalid URL '{}': {}", request.url, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| invalid(format!("invalid value for header '{}': {}", name, e)))?;
            headers.append(name, value);
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder.build().map_err(|e| invalid(e.to_string()))
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<(Vec<u8>, bool), TransportError> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            let room = self.config.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                return Ok((body, true));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((body, false))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        let built = self.build(request)?;
        let response = self.client.execute(built).await.map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let (body, truncated) = self.read_body(response).await?;
        if truncated {
            debug!("Response body of {} truncated at {} bytes", request.url, body.len());
        }

        Ok(RawResponse {
            status,
            headers,
            body,
            truncated,
        })
    }

    fn transport_type(&self) -> &'static str {
        "http"
    }
}

/// Map a reqwest failure onto a transport error kind
fn classify(error: reqwest::Error) -> TransportError {
    let message = error.to_string();
    if error.is_timeout() {
        return TransportError::new(TransportErrorKind::Timeout, message);
    }
    if error.is_builder() {
        return TransportError::new(TransportErrorKind::InvalidRequest, message);
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            let kind = match io_err.kind() {
                io::ErrorKind::ConnectionRefused => Some(TransportErrorKind::ConnectionRefused),
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => Some(TransportErrorKind::ConnectionReset),
                io::ErrorKind::TimedOut => Some(TransportErrorKind::Timeout),
                _ => None,
            };
            if let Some(kind) = kind {
                return TransportError::new(kind, format!("{} ({})", message, io_err));
            }
        }
        source = err.source();
    }

    // hyper reports a peer that closed mid-message without an io::Error
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("connection closed") || lowered.contains("connection reset") {
        return TransportError::new(TransportErrorKind::ConnectionReset, message);
    }
    if lowered.contains("connection refused") {
        return TransportError::new(TransportErrorKind::ConnectionRefused, message);
    }

    TransportError::new(TransportErrorKind::Other, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::HttpMethod;

    #[test]
    fn invalid_header_is_invalid_request() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let request = HttpRequest::new(HttpMethod::Get, "http://localhost/a")
            .with_header("X-Bad", "line\r\nbreak");
        let err = transport.build(&request).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::InvalidRequest);
    }

    #[test]
    fn invalid_url_is_invalid_request() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let request = HttpRequest::new(HttpMethod::Get, "not a url");
        let err = transport.build(&request).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let request = HttpRequest::new(HttpMethod::Get, format!("http://127.0.0.1:{}/", port));
        let err = transport.execute(&request).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::ConnectionRefused);
    }
}
