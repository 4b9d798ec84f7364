//! apifuzz - Schema-driven HTTP API fuzzer
//!
//! Loads a Swagger/OpenAPI definition from a file or URL, fuzzes every
//! operation against the target and writes findings to the report
//! directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use apifuzz::errors::ApiFuzzError;
use apifuzz::fuzzer::{FuzzConfig, FuzzProfile, FuzzResults, FuzzSession};
use apifuzz::transport::{HttpTransport, TransportConfig};

/// Exit status for a run stopped by the operator
const EXIT_ABORTED: i32 = 130;

/// apifuzz - Fuzz HTTP APIs from their OpenAPI/Swagger definition
#[derive(Parser)]
#[command(
    name = "apifuzz",
    version,
    about = "Schema-driven HTTP API fuzzer",
    long_about = "apifuzz compiles an OpenAPI/Swagger definition into request templates, \
                  mutates every parameter according to its schema and reports the responses \
                  that look like bugs: server errors, timeouts, dropped connections and \
                  contract violations."
)]
struct Cli {
    /// Local API definition (JSON)
    #[arg(short = 's', long, required_unless_present = "src_url", conflicts_with = "src_url")]
    src_file: Option<PathBuf>,

    /// URL of the API definition (JSON)
    #[arg(long)]
    src_url: Option<String>,

    /// Directory for findings and the run report
    #[arg(short = 'r', long, default_value = "reports")]
    report_dir: PathBuf,

    /// Deepness level (>= 1); defaults to the profile's level
    #[arg(long)]
    level: Option<u32>,

    /// Target base URL, overrides the definition's servers/host
    #[arg(short = 'u', long)]
    url: Option<String>,

    /// Write a JUnit XML report to this path
    #[arg(short = 't', long)]
    test_report: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "warn")]
    log: LogLevel,

    /// Plain output: no colours, no progress bar
    #[arg(long)]
    basic_output: bool,

    /// Extra headers as JSON: {"Name": "value"} or [{"Name": "value"}, ...]
    #[arg(long)]
    headers: Option<String>,

    /// Parallel workers (caps in-flight requests)
    #[arg(short = 'W', long)]
    workers: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Seed for mutation sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Fuzzing profile
    #[arg(short, long, value_enum, default_value = "quick")]
    profile: FuzzProfile,

    /// Output format for the run summary
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn init_logging(level: LogLevel, basic_output: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("apifuzz={}", level.as_str())));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(!basic_output)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Parse `--headers`: an object, or an array of single-entry objects.
/// Entry order is kept; duplicates are resolved by the config.
fn parse_headers(raw: &str) -> anyhow::Result<Vec<(String, String)>> {
    let value: Value = serde_json::from_str(raw).context("--headers is not valid JSON")?;

    let entries: Vec<(String, Value)> = match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => {
            let mut entries = Vec::new();
            for item in items {
                let Value::Object(map) = item else {
                    bail!("--headers array entries must be objects");
                };
                if map.len() != 1 {
                    bail!("--headers array entries must hold exactly one header");
                }
                entries.extend(map);
            }
            entries
        }
        _ => bail!("--headers must be a JSON object or array of objects"),
    };

    Ok(entries
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => (name, s),
            other => (name, other.to_string()),
        })
        .collect())
}

fn load_definition_file(path: &Path) -> Result<Value, ApiFuzzError> {
    let source = || path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| ApiFuzzError::DefinitionSource {
        source_name: source(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ApiFuzzError::DefinitionSource {
        source_name: source(),
        message: e.to_string(),
    })
}

async fn fetch_definition(url: &str, report_dir: &Path) -> Result<Value, ApiFuzzError> {
    let failure = |message: String| ApiFuzzError::DefinitionSource {
        source_name: url.to_string(),
        message,
    };

    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| failure(e.to_string()))?;
    let definition: Value = response.json().await.map_err(|e| failure(e.to_string()))?;

    // Keep what was fuzzed next to the findings
    fs::create_dir_all(report_dir)?;
    let saved = report_dir.join("api_definition.json");
    let pretty = serde_json::to_string_pretty(&definition).map_err(|e| failure(e.to_string()))?;
    fs::write(&saved, pretty)?;
    info!("Saved API definition to {}", saved.display());

    Ok(definition)
}

fn build_config(cli: &Cli) -> anyhow::Result<FuzzConfig> {
    let mut config = FuzzConfig::with_profile(cli.profile)
        .with_report_dir(cli.report_dir.clone())
        .with_progress(!cli.basic_output && matches!(cli.format, OutputFormat::Text));

    if let Some(level) = cli.level {
        config = config.with_level(level);
    }
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(timeout);
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(url) = &cli.url {
        config = config.with_base_url(url.clone());
    }
    if let Some(raw) = &cli.headers {
        config = config.with_headers(parse_headers(raw)?);
    }
    if let Some(path) = &cli.test_report {
        config = config.with_junit_report(path.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> miette::Result<FuzzResults> {
    let config = build_config(&cli).map_err(|e| miette::miette!("{:#}", e))?;

    let definition = match (&cli.src_file, &cli.src_url) {
        (Some(path), _) => load_definition_file(path)?,
        (None, Some(url)) => fetch_definition(url, &cli.report_dir).await?,
        (None, None) => miette::bail!("either --src-file or --src-url is required"),
    };

    let transport = HttpTransport::new(TransportConfig {
        connect_timeout: config.request_timeout(),
        ..TransportConfig::default()
    })
    .map_err(|e| miette::miette!("{:#}", e))?;

    let mut session = FuzzSession::new(config, Arc::new(transport));
    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight requests");
            cancel.cancel();
        }
    });

    let results = session.run(&definition).await?;

    match cli.format {
        OutputFormat::Text => results.print_text(),
        OutputFormat::Json => results
            .print_json()
            .map_err(|e| miette::miette!("{:#}", e))?,
    }
    Ok(results)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log, cli.basic_output);
    if cli.basic_output {
        colored::control::set_override(false);
    }

    let code = match run(cli).await {
        Ok(results) if results.is_aborted() => {
            eprintln!("{}", "Run aborted; partial findings were written".yellow());
            EXIT_ABORTED
        }
        Ok(_) => 0,
        Err(report) => {
            eprintln!("{:?}", report);
            1
        }
    };
    std::process::exit(code);
}
