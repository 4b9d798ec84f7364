//! Findings - Anomaly records and their persistence
//!
//! Findings accumulate in a shared append-only store while the run is in
//! flight and are written to the report directory when the run drains:
//!
//! ```text
//! <report_dir>/
//! ├── findings/
//! │   ├── 0001_get_items_id.json
//! │   └── ...
//! └── report.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ExecutionResult, Outcome};
use crate::errors::{ApiFuzzError, TemplateCompileError};
use crate::reporter::Report;
use crate::template::request::truncate_chars;
use crate::template::FuzzTemplate;

use super::detection::{AnomalyKind, Classification, Severity};
use super::mutation::strategy::{MutationCategory, MutationKind};
use super::mutation::MutationCandidate;
use super::FuzzResults;

/// Body characters kept in a finding
pub const REPORT_BODY_CHARS: usize = 1024;
/// Characters kept of a mutated value
const VALUE_PREVIEW_CHARS: usize = 256;

/// The mutation that produced a finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub field: String,
    pub location: String,
    pub kind: MutationKind,
    pub category: MutationCategory,
    pub value: String,
}

impl MutationRecord {
    pub fn from_candidate(candidate: &MutationCandidate) -> Self {
        Self {
            field: candidate.name.clone(),
            location: candidate.location.as_str().to_string(),
            kind: candidate.kind,
            category: candidate.kind.category(),
            value: candidate.value.preview(VALUE_PREVIEW_CHARS),
        }
    }
}

/// The request as sent, body truncated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// What the target answered, body truncated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub body: String,
    /// Whether the body was cut, either at capture or in this record
    pub truncated: bool,
}

/// A recorded anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    /// `METHOD /path`
    pub template: String,
    pub severity: Severity,
    pub anomaly: AnomalyKind,
    pub detail: String,
    /// `None` for baseline requests and compile failures
    pub mutation: Option<MutationRecord>,
    pub request: Option<RequestRecord>,
    pub response: Option<ResponseRecord>,
    /// Network error when no response arrived, or the contract break
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
    pub timestamp: String,
}

impl Finding {
    /// Finding for an anomalous execution
    pub fn from_execution(
        template: &FuzzTemplate,
        candidate: Option<&MutationCandidate>,
        result: &ExecutionResult,
        classification: Classification,
    ) -> Self {
        let request = &result.request;
        let request_record = RequestRecord {
            method: request.method.as_str().to_string(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request
                .body_text()
                .map(|body| truncate_chars(&body, REPORT_BODY_CHARS)),
        };

        let (response, error) = match &result.outcome {
            Outcome::Response(summary) => {
                let text = summary.body_text();
                let cut = text.chars().count() > REPORT_BODY_CHARS;
                (
                    Some(ResponseRecord {
                        status: summary.status,
                        body: truncate_chars(&text, REPORT_BODY_CHARS),
                        truncated: summary.truncated || cut,
                    }),
                    classification.anomaly.is_protocol_violation().then(|| {
                        ApiFuzzError::TargetProtocolViolation {
                            message: classification.detail.clone(),
                        }
                        .to_string()
                    }),
                )
            }
            Outcome::TransientNetworkError { message } => (
                None,
                Some(
                    ApiFuzzError::TransientNetwork {
                        message: message.clone(),
                    }
                    .to_string(),
                ),
            ),
            other => (None, Some(other.describe())),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            template: template.identity(),
            severity: classification.severity,
            anomaly: classification.anomaly,
            detail: classification.detail,
            mutation: candidate.map(MutationRecord::from_candidate),
            request: Some(request_record),
            response,
            error,
            latency_ms: Some(result.latency_ms),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Info finding for an operation that was skipped
    pub fn compile_failure(error: &TemplateCompileError) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            template: error.operation().unwrap_or("<definition>").to_string(),
            severity: Severity::Info,
            anomaly: AnomalyKind::CompileFailure,
            detail: error.to_string(),
            mutation: None,
            request: None,
            response: None,
            error: None,
            latency_ms: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// File name under `findings/`, numbered from 1
    pub fn file_name(&self, number: usize) -> String {
        let (method, path) = self
            .template
            .split_once(' ')
            .unwrap_or(("op", self.template.as_str()));
        format!("{:04}_{}_{}.json", number, method.to_ascii_lowercase(), slug(path))
    }
}

/// Lowercase alphanumerics, everything else collapsed to `_`
fn slug(path: &str) -> String {
    let mut out = String::new();
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Shared, append-only finding accumulator
#[derive(Debug, Clone, Default)]
pub struct FindingStore {
    findings: Arc<Mutex<Vec<Finding>>>,
    report_dir: Option<PathBuf>,
}

impl FindingStore {
    /// Create an in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that persists under `dir`
    pub fn with_report_dir(dir: PathBuf) -> Self {
        Self {
            findings: Arc::default(),
            report_dir: Some(dir),
        }
    }

    pub fn report_dir(&self) -> Option<&Path> {
        self.report_dir.as_deref()
    }

    /// Record a finding
    pub fn record(&self, finding: Finding) {
        debug!(
            "Finding [{}] {} {}: {}",
            finding.severity,
            finding.template,
            finding
                .mutation
                .as_ref()
                .map(|m| m.kind.as_str())
                .unwrap_or("baseline"),
            finding.detail
        );
        match self.findings.lock() {
            Ok(mut findings) => findings.push(finding),
            Err(_) => warn!(
                "Finding store lock poisoned, finding for {} dropped",
                finding.template
            ),
        }
    }

    /// Snapshot of all findings in record order
    pub fn findings(&self) -> Vec<Finding> {
        self.findings
            .lock()
            .map(|findings| findings.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.findings.lock().map(|f| f.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every finding and the run summary to the report directory.
    /// A store without a directory writes nothing.
    pub fn persist(&self, results: &FuzzResults) -> Result<Option<PathBuf>> {
        let Some(base) = &self.report_dir else {
            return Ok(None);
        };

        let findings_dir = base.join("findings");
        fs::create_dir_all(&findings_dir)
            .with_context(|| format!("Failed to create {}", findings_dir.display()))?;

        for (i, finding) in results.findings.iter().enumerate() {
            let path = findings_dir.join(finding.file_name(i + 1));
            let json = serde_json::to_string_pretty(finding)?;
            fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let report_path = base.join("report.json");
        let json = serde_json::to_string_pretty(&Report::new(results))?;
        fs::write(&report_path, json)
            .with_context(|| format!("Failed to write {}", report_path.display()))?;

        info!(
            "Wrote {} findings to {}",
            results.findings.len(),
            base.display()
        );
        Ok(Some(report_path))
    }
}
