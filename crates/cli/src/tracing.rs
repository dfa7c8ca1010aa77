//! Log output for the `kvinject` binary
//!
//! Everything goes to stderr: stdout is reserved for secret values that the
//! caller pipes into the substitution step.

use std::sync::OnceLock;

pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::errors::CliError;

/// Crates whose events are shown at the requested level.
const LOG_TARGETS: [&str; 4] = [
    "kvinject",
    "kvinject_cli",
    "kvinject_azure",
    "kvinject_backends",
];

/// `--level` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Everything, including per-request HTTP details
    Trace,
    /// Per-secret decisions (skipped versions, disabled secrets)
    Debug,
    /// One line per command
    Info,
    /// Only problems (default)
    Warn,
    /// Only failures
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Shape of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human readable, one line per event
    Compact,
    /// One JSON object per event, for log shippers
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub format: TracingFormat,
    pub level: Level,
}

impl TracingConfig {
    pub fn from_flags(json: bool, level: LogLevel) -> Self {
        Self {
            format: if json {
                TracingFormat::Json
            } else {
                TracingFormat::Compact
            },
            level: level.into(),
        }
    }

    /// Directives used when `RUST_LOG` is not set
    fn directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, CliError> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.directives()))
            .map_err(|e| CliError::TracingError {
                source: Box::new(e),
            })
    }
}

static RUN_ID: OnceLock<Uuid> = OnceLock::new();

/// Identifier attached to every event of this process
pub fn run_id() -> Uuid {
    *RUN_ID.get_or_init(Uuid::new_v4)
}

/// Install the global subscriber
pub fn init_tracing(config: &TracingConfig) -> Result<(), CliError> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);

    match config.format {
        TracingFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        TracingFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    tracing::debug!(
        run_id = %run_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}
