//! Tracing subscriber initialization
//!
//! # Examples
//!
//! ```rust,no_run
//! use faultline_common::observability::{init_tracing, LogConfig, LogFormat};
//!
//! let config = LogConfig { format: LogFormat::Json, ..LogConfig::default() };
//! init_tracing(&config).expect("Failed to initialize tracing");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format for production (machine-readable)
    Json,
    /// Pretty format for development (human-readable)
    Pretty,
    /// Single-line format
    #[default]
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = TracingInitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(TracingInitError::UnknownFormat(other.to_string())),
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Fallback level when neither `filter` nor `RUST_LOG` is set
    pub level: String,
    /// Explicit `EnvFilter` directive, takes precedence over `RUST_LOG`
    pub filter: Option<String>,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), filter: None, format: LogFormat::default() }
    }
}

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum TracingInitError {
    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(String),

    #[error("Unknown log format '{0}' (expected json, pretty or compact)")]
    UnknownFormat(String),

    #[error("Global tracing subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

impl LogConfig {
    fn env_filter(&self) -> Result<EnvFilter, TracingInitError> {
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive)
                .map_err(|e| TracingInitError::InvalidFilter(e.to_string())),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.level))),
        }
    }
}

/// Install the global tracing subscriber
///
/// # Errors
/// Returns [`TracingInitError`] if the filter directive does not parse or a
/// global subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), TracingInitError> {
    let env_filter = config.env_filter()?;

    let result = match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_thread_ids(true)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_thread_names(true)
                .with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer().compact().with_target(true).with_filter(env_filter);
            tracing_subscriber::registry().with(layer).try_init()
        }
    };
    result.map_err(|e| TracingInitError::AlreadyInitialized(e.to_string()))?;

    info!(format = ?config.format, "Tracing initialized");
    Ok(())
}
