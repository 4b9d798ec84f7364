//! Mock transport for testing
//!
//! Provides a scripted implementation of the Transport trait so the whole
//! fuzz loop can run without a live target. A handler closure decides the
//! reply for each request; every request is recorded for assertions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::template::HttpRequest;

use super::{RawResponse, Transport, TransportError, TransportErrorKind};

/// Scripted reply for one request
#[derive(Debug, Clone)]
pub enum MockResponse {
    Response(RawResponse),
    Error(TransportErrorKind),
    /// Wait before producing the inner reply
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A JSON response
    pub fn json(status: u16, body: Value) -> Self {
        let mut response = RawResponse::new(status, body.to_string());
        response
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
        MockResponse::Response(response)
    }

    /// A plain-text response
    pub fn text(status: u16, body: &str) -> Self {
        let mut response = RawResponse::new(status, body);
        response
            .headers
            .push(("content-type".to_string(), "text/plain".to_string()));
        MockResponse::Response(response)
    }

    /// An empty-bodied response
    pub fn status(status: u16) -> Self {
        MockResponse::Response(RawResponse::new(status, Vec::new()))
    }

    pub fn error(kind: TransportErrorKind) -> Self {
        MockResponse::Error(kind)
    }

    pub fn delayed(self, delay: Duration) -> Self {
        MockResponse::Delayed(delay, Box::new(self))
    }
}

type Handler = Arc<dyn Fn(&HttpRequest) -> MockResponse + Send + Sync>;

/// Mock transport for testing
#[derive(Clone)]
pub struct MockTransport {
    handler: Handler,
    sent_requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    /// Create a mock whose replies come from `handler`
    pub fn new(handler: impl Fn(&HttpRequest) -> MockResponse + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            sent_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always gives the same reply
    pub fn always(reply: MockResponse) -> Self {
        Self::new(move |_| reply.clone())
    }

    /// Get all requests received so far
    pub async fn sent_requests(&self) -> Vec<HttpRequest> {
        let requests = self.sent_requests.lock().await;
        requests.clone()
    }

    /// Number of requests received so far
    pub async fn request_count(&self) -> usize {
        self.sent_requests.lock().await.len()
    }

    /// Clear recorded requests
    pub async fn clear_sent(&self) {
        self.sent_requests.lock().await.clear();
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.sent_requests.lock().await.push(request.clone());

        let mut reply = (self.handler)(request);
        loop {
            match reply {
                MockResponse::Response(response) => return Ok(response),
                MockResponse::Error(kind) => {
                    return Err(TransportError::new(kind, format!("mock {}", kind.as_str())))
                }
                MockResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }

    fn transport_type(&self) -> &'static str {
        "mock"
    }
}
