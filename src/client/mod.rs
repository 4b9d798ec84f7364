//! Target Client - Request execution against the API under test
//!
//! Wraps a single-attempt [`Transport`] with the policies every request
//! shares:
//! - configured headers (request headers win on name clashes)
//! - a per-request timeout
//! - exactly one retry on connection refused/reset, none on timeouts or
//!   on any received response
//! - an append-only log of compact execution summaries

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::schema::HttpMethod;
use crate::template::HttpRequest;
use crate::transport::{RawResponse, Transport, TransportErrorKind};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What came back from the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSummary {
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub truncated: bool,
}

impl ResponseSummary {
    fn from_raw(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            content_type: raw.header("content-type").map(str::to_string),
            body: raw.body,
            truncated: raw.truncated,
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of sending one request, retries included
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Response(ResponseSummary),
    Timeout,
    /// Refused/reset that persisted through the retry
    TransientNetworkError { message: String },
    NetworkError { message: String },
    /// The request could not be encoded onto the wire
    Unsendable { message: String },
}

impl Outcome {
    pub fn response(&self) -> Option<&ResponseSummary> {
        match self {
            Outcome::Response(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Outcome::Response(r) => format!("HTTP {}", r.status),
            Outcome::Timeout => "timeout".to_string(),
            Outcome::TransientNetworkError { message } => {
                format!("transient network error: {}", message)
            }
            Outcome::NetworkError { message } => format!("network error: {}", message),
            Outcome::Unsendable { message } => format!("unsendable request: {}", message),
        }
    }
}

/// Execution record: written once, never mutated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub request: HttpRequest,
    pub outcome: Outcome,
    pub latency_ms: u64,
    pub attempts: u32,
}

/// One line of the client's result log; bodies are not kept
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub method: HttpMethod,
    pub url: String,
    /// `None` when no response arrived
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub attempts: u32,
}

impl LogEntry {
    fn of(result: &ExecutionResult) -> Self {
        Self {
            method: result.request.method,
            url: result.request.url.clone(),
            status: result.outcome.response().map(|r| r.status),
            latency_ms: result.latency_ms,
            attempts: result.attempts,
        }
    }
}

/// HTTP client for the target service
pub struct TargetClient {
    transport: Arc<dyn Transport>,
    headers: Vec<(String, String)>,
    timeout: Duration,
    log: Arc<Mutex<Vec<LogEntry>>>,
}

impl TargetClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Headers attached to every request
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport_type(&self) -> &'static str {
        self.transport.transport_type()
    }

    /// Send a request and record the result
    pub async fn send(&self, request: HttpRequest) -> ExecutionResult {
        let request = self.with_configured_headers(request);
        let started = Instant::now();
        let mut attempts = 0;

        let outcome = loop {
            attempts += 1;
            let attempt = tokio::time::timeout(self.timeout, self.transport.execute(&request)).await;
            match attempt {
                Err(_) => break Outcome::Timeout,
                Ok(Ok(raw)) => break Outcome::Response(ResponseSummary::from_raw(raw)),
                Ok(Err(e)) if e.kind.is_transient() => {
                    if attempts == 1 {
                        debug!("Retrying {} {} after {}", request.method, request.url, e);
                        continue;
                    }
                    warn!("{} {} failed after retry: {}", request.method, request.url, e);
                    break Outcome::TransientNetworkError { message: e.to_string() };
                }
                Ok(Err(e)) => match e.kind {
                    TransportErrorKind::Timeout => break Outcome::Timeout,
                    TransportErrorKind::InvalidRequest => {
                        break Outcome::Unsendable { message: e.message }
                    }
                    _ => break Outcome::NetworkError { message: e.to_string() },
                },
            }
        };

        let result = ExecutionResult {
            request,
            outcome,
            latency_ms: started.elapsed().as_millis() as u64,
            attempts,
        };
        match self.log.lock() {
            Ok(mut log) => log.push(LogEntry::of(&result)),
            Err(_) => warn!(
                "Result log lock poisoned, {} {} not logged",
                result.request.method, result.request.url
            ),
        }
        result
    }

    fn with_configured_headers(&self, mut request: HttpRequest) -> HttpRequest {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(name, _)| request.header(name).is_none())
            .cloned()
            .collect();
        headers.append(&mut request.headers);
        request.headers = headers;
        request
    }

    /// Snapshot of the result log
    pub fn log(&self) -> Vec<LogEntry> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of requests sent (retries not counted)
    pub fn request_count(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or_default()
    }
}
