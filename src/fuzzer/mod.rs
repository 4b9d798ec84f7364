//! Fuzz Engine - Schema-driven fuzzing of HTTP APIs
//!
//! - `config` - run configuration and profiles
//! - `mutation` - mutation strategy registry
//! - `graph` - producer/consumer dependencies between templates
//! - `detection` - anomaly classification
//! - `findings` - finding records and persistence
//! - `session` - the orchestrator

pub mod config;
pub mod detection;
pub mod findings;
pub mod graph;
pub mod mutation;
pub mod session;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

pub use config::{FuzzConfig, FuzzProfile};
pub use detection::{AnomalyDetector, AnomalyKind, ClassificationPolicy, Severity};
pub use findings::{Finding, FindingStore};
pub use graph::ModelGraph;
pub use mutation::{MutationCandidate, MutationRegistry};
pub use session::FuzzSession;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Preparing,
    Running,
    Draining,
    Done,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Preparing => "preparing",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A graph edge by template identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSummary {
    pub producer: String,
    pub consumer: String,
    pub field: String,
}

/// Fuzzing run results
#[derive(Debug, Clone, Serialize)]
pub struct FuzzResults {
    pub outcome: RunState,
    pub base_url: String,
    pub level: u32,
    pub seed: u64,
    /// Compiled templates in traversal order
    pub templates: Vec<String>,
    /// Operations skipped by the compiler
    pub compile_failures: usize,
    pub edges: Vec<EdgeSummary>,
    pub requests: u64,
    pub candidates: u64,
    /// Candidates whose request could not be built
    pub skipped: u64,
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
}

impl FuzzResults {
    /// Results of a run that has not sent anything yet
    pub fn empty(base_url: impl Into<String>) -> Self {
        Self {
            outcome: RunState::Idle,
            base_url: base_url.into(),
            level: 1,
            seed: config::DEFAULT_SEED,
            templates: Vec::new(),
            compile_failures: 0,
            edges: Vec::new(),
            requests: 0,
            candidates: 0,
            skipped: 0,
            findings: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn findings_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Findings other than skipped operations
    pub fn anomalies(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.anomaly != AnomalyKind::CompileFailure)
    }

    pub fn is_aborted(&self) -> bool {
        self.outcome == RunState::Aborted
    }

    pub fn print_text(&self) {
        use colored::Colorize;

        println!("{}", "Fuzzing Results".cyan().bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Target: {}", self.base_url);
        println!("Outcome: {}", self.outcome);
        println!("Duration: {:.1}s", self.duration_ms as f64 / 1000.0);
        println!("Level: {}  Seed: {}", self.level, self.seed);
        println!();

        println!("{}", "Model:".yellow());
        println!("  Templates: {}", self.templates.len());
        if self.compile_failures > 0 {
            println!(
                "  Skipped operations: {}",
                self.compile_failures.to_string().yellow()
            );
        }
        println!("  Dependencies: {}", self.edges.len());
        for edge in &self.edges {
            println!(
                "    {} -> {} ({})",
                edge.producer,
                edge.consumer,
                edge.field.dimmed()
            );
        }
        println!("  Candidates: {}", self.candidates);
        if self.skipped > 0 {
            println!("  Skipped requests: {}", self.skipped.to_string().yellow());
        }
        println!("  Requests: {}", self.requests);
        println!();

        let anomalies: Vec<&Finding> = self.anomalies().collect();
        if anomalies.is_empty() {
            println!("{}", "No anomalies found ✓".green());
            return;
        }

        let counts = self
            .findings_by_severity()
            .iter()
            .rev()
            .map(|(severity, count)| format!("{} {}", count, severity))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{} ({})",
            format!("Anomalies found: {}", anomalies.len()).red().bold(),
            counts
        );
        for finding in anomalies {
            let severity = match finding.severity {
                Severity::Critical | Severity::High => finding.severity.as_str().red(),
                Severity::Medium => finding.severity.as_str().yellow(),
                Severity::Low | Severity::Info => finding.severity.as_str().normal(),
            };
            println!();
            println!("  [{}] {}", severity, finding.template.bold());
            if let Some(mutation) = &finding.mutation {
                println!(
                    "  Mutation: {} on {} '{}' = {}",
                    mutation.kind,
                    mutation.location,
                    mutation.field,
                    mutation.value.dimmed()
                );
            } else {
                println!("  Mutation: {}", "baseline".dimmed());
            }
            println!("  {}: {}", finding.anomaly, finding.detail);
        }
    }

    pub fn print_json(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(self)?);
        Ok(())
    }
}
