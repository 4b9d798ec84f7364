//! Reporter - Report envelopes and CI output formats

pub mod junit;

use serde::Serialize;

/// Generic report wrapper
#[derive(Debug, Clone, Serialize)]
pub struct Report<T: Serialize> {
    pub tool: String,
    pub version: String,
    pub timestamp: String,
    pub data: T,
}

impl<T: Serialize> Report<T> {
    pub fn new(data: T) -> Self {
        Self {
            tool: "apifuzz".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}
