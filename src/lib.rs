//! apifuzz - Schema-driven fuzzing for HTTP APIs
//!
//! Compiles a Swagger 2.0 / OpenAPI 3.x definition into mutation-annotated
//! request templates, links them into a producer/consumer model graph and
//! drives them against a live service, recording anomalous responses as
//! reproducible findings.
//!
//! # Modules
//!
//! - `schema` - definition normalization into operations
//! - `template` - fuzz templates, base URL resolution, request building
//! - `fuzzer` - mutation registry, model graph, classification, orchestration
//! - `client` - request execution policy (headers, timeout, retry)
//! - `transport` - single-attempt HTTP transports
//! - `reporter` - report envelopes and JUnit output
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use apifuzz::fuzzer::{FuzzConfig, FuzzSession};
//! use apifuzz::transport::{HttpTransport, TransportConfig};
//!
//! let transport = Arc::new(HttpTransport::new(TransportConfig::default())?);
//! let config = FuzzConfig::default().with_base_url("http://localhost:8080");
//! let results = FuzzSession::new(config, transport).run(&definition).await?;
//! results.print_text();
//! ```

pub mod client;
pub mod errors;
pub mod fuzzer;
pub mod reporter;
pub mod schema;
pub mod template;
pub mod transport;

// Re-export commonly used types
pub use errors::{ApiFuzzError, SchemaError, TemplateCompileError};
pub use fuzzer::{FuzzConfig, FuzzProfile, FuzzResults, FuzzSession, RunState};
