//! Fuzzer Configuration - Settings and profiles for fuzzing runs
//!
//! Provides configuration options for controlling a run: deepness level,
//! workers, timeouts, target overrides, report destinations and profiles.

use std::path::PathBuf;
use std::time::Duration;

use super::detection::ClassificationPolicy;
use super::mutation::strategy::MAX_LEVEL;

/// Seed used when the operator supplies none
pub const DEFAULT_SEED: u64 = 0x5EED_0A91_F022;

/// Fuzzing configuration
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    /// Deepness level (>= 1); levels above the deepest saturate
    pub level: u32,
    /// Number of parallel workers, also the cap on in-flight requests
    pub workers: usize,
    /// Timeout per request in milliseconds
    pub request_timeout_ms: u64,
    /// Random seed threaded through candidate generation
    pub seed: u64,
    /// Operator-supplied base URL, takes precedence over the definition
    pub base_url: Option<String>,
    /// Headers attached to every request
    pub headers: Vec<(String, String)>,
    /// Findings/report directory
    pub report_dir: Option<PathBuf>,
    /// JUnit XML output path
    pub junit_report: Option<PathBuf>,
    /// Anomaly thresholds
    pub policy: ClassificationPolicy,
    /// Show the progress bar
    pub progress: bool,
    /// Profile this configuration started from
    pub profile: FuzzProfile,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            level: 1,
            workers: 4,
            request_timeout_ms: 10_000,
            seed: DEFAULT_SEED,
            base_url: None,
            headers: Vec::new(),
            report_dir: None,
            junit_report: None,
            policy: ClassificationPolicy::default(),
            progress: false,
            profile: FuzzProfile::Quick,
        }
    }
}

impl FuzzConfig {
    /// Create config with specific profile
    pub fn with_profile(profile: FuzzProfile) -> Self {
        profile.default_config()
    }

    /// Set deepness level (clamped to at least 1)
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.max(1);
        self
    }

    /// Set number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms.max(1);
        self
    }

    /// Set random seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set static headers. A later entry replaces an earlier one with the
    /// same (case-insensitive) name and keeps the later position.
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = dedupe_headers(headers);
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn with_junit_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.junit_report = Some(path.into());
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Level actually used for candidate generation
    pub fn effective_level(&self) -> u32 {
        self.level.clamp(1, MAX_LEVEL)
    }
}

fn dedupe_headers(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        out.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        out.push((name, value));
    }
    out
}

/// Fuzzing profiles with different intensity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FuzzProfile {
    /// Shallow mutations only (level 1)
    #[default]
    Quick,
    /// Adds length, injection and encoding mutations (level 2)
    Standard,
    /// Every mutation kind including oversized payloads (level 3)
    Intensive,
    /// CI-optimized (level 1, single worker, fixed seed)
    #[value(name = "ci")]
    CI,
}

impl FuzzProfile {
    /// Deepness level this profile runs at
    pub fn level(&self) -> u32 {
        match self {
            FuzzProfile::Quick | FuzzProfile::CI => 1,
            FuzzProfile::Standard => 2,
            FuzzProfile::Intensive => 3,
        }
    }

    /// Get default configuration for this profile
    pub fn default_config(&self) -> FuzzConfig {
        let base = FuzzConfig {
            level: self.level(),
            profile: *self,
            ..FuzzConfig::default()
        };
        match self {
            FuzzProfile::Quick => base.with_timeout(5_000),
            FuzzProfile::Standard => base,
            FuzzProfile::Intensive => base.with_workers(8).with_timeout(30_000),
            FuzzProfile::CI => base.with_workers(1).with_seed(42),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FuzzProfile::Quick => "quick",
            FuzzProfile::Standard => "standard",
            FuzzProfile::Intensive => "intensive",
            FuzzProfile::CI => "ci",
        }
    }
}

impl std::fmt::Display for FuzzProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
