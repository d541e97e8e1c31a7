//! Resilience settings loader
//!
//! Loads breaker and retry defaults from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the environment when one exists
//! 2. Attempts to load from `FAULTLINE_*` environment variables
//! 3. If a required variable is missing, falls back to a settings file
//! 4. Probes multiple paths for settings files, JSON or TOML
//!
//! ## Environment Variables
//! Required:
//! - `FAULTLINE_BREAKER_FAILURE_THRESHOLD`: failures in the window to open
//! - `FAULTLINE_BREAKER_TIMEOUT_MS`: open-state cooldown in milliseconds
//! - `FAULTLINE_RETRY_MAX_ATTEMPTS`: attempts including the first call
//!
//! Optional:
//! - `FAULTLINE_BREAKER_SUCCESS_THRESHOLD`
//! - `FAULTLINE_BREAKER_MONITORING_PERIOD_MS`
//! - `FAULTLINE_BREAKER_VOLUME_THRESHOLD`
//! - `FAULTLINE_RETRY_INITIAL_DELAY_MS`
//! - `FAULTLINE_RETRY_MAX_DELAY_MS`
//! - `FAULTLINE_RETRY_BACKOFF_MULTIPLIER`
//! - `FAULTLINE_RETRY_JITTER` (true/false)
//! - `FAULTLINE_RETRY_RETRYABLE_ERRORS` (comma separated identifiers)
//!
//! Per-dependency breaker overrides are only read from files:
//!
//! ```toml
//! [breaker]
//! failure_threshold = 5
//! timeout = 60000
//!
//! [breakers.sms]
//! failure_threshold = 3
//! timeout = 30000
//!
//! [retry]
//! max_attempts = 3
//! initial_delay = 1000
//! ```
//!
//! ## File Locations
//! The loader probes `faultline.toml`, `faultline.json`,
//! `config/faultline.toml` and `config/faultline.json` in the current working
//! directory, then the same names next to the executable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use faultline_common::{
    duration_millis, impl_error_classification, option_duration_millis, CommonError,
    ErrorSeverity,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::retry::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
};
use crate::retry::RetryConfig;

/// Errors raised while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("No config file found in any of the standard locations")]
    NoConfigFile,

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Invalid(#[from] ConfigError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(SettingsError, Common,
    SettingsError::MissingVar(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    SettingsError::InvalidValue { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    SettingsError::FileNotFound(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    SettingsError::NoConfigFile => {
        retryable: false,
        severity: ErrorSeverity::Warning,
        critical: false,
    },
    SettingsError::UnsupportedFormat(_) => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    SettingsError::Invalid(_) => {
        retryable: false,
        severity: ErrorSeverity::Critical,
        critical: true,
    }
);

/// Result type for settings loading
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Default thresholds applied to every breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    #[serde(with = "duration_millis")]
    pub monitoring_period: Duration,
    pub volume_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: CircuitBreakerConfig::DEFAULT_FAILURE_THRESHOLD,
            success_threshold: CircuitBreakerConfig::DEFAULT_SUCCESS_THRESHOLD,
            timeout: CircuitBreakerConfig::DEFAULT_TIMEOUT,
            monitoring_period: CircuitBreakerConfig::DEFAULT_MONITORING_PERIOD,
            volume_threshold: CircuitBreakerConfig::DEFAULT_VOLUME_THRESHOLD,
        }
    }
}

/// Per-dependency changes to [`BreakerSettings`]; unset fields inherit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerOverride {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    #[serde(with = "option_duration_millis")]
    pub timeout: Option<Duration>,
    #[serde(with = "option_duration_millis")]
    pub monitoring_period: Option<Duration>,
    pub volume_threshold: Option<u32>,
}

/// Default retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub retryable_errors: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
            retryable_errors: Vec::new(),
        }
    }
}

/// Settings document for breakers and retries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub breaker: BreakerSettings,
    /// Overrides keyed by dependency name
    pub breakers: BTreeMap<String, BreakerOverride>,
    pub retry: RetrySettings,
}

impl ResilienceSettings {
    /// Validated breaker configuration for the dependency `name`
    pub fn breaker_config(&self, name: &str) -> ConfigResult<CircuitBreakerConfig> {
        let base = &self.breaker;
        let over = self.breakers.get(name).cloned().unwrap_or_default();

        CircuitBreakerConfig::builder(name)
            .failure_threshold(over.failure_threshold.unwrap_or(base.failure_threshold))
            .success_threshold(over.success_threshold.unwrap_or(base.success_threshold))
            .timeout(over.timeout.unwrap_or(base.timeout))
            .monitoring_period(over.monitoring_period.unwrap_or(base.monitoring_period))
            .volume_threshold(over.volume_threshold.unwrap_or(base.volume_threshold))
            .build()
    }

    /// Validated default retry configuration
    pub fn retry_config(&self) -> ConfigResult<RetryConfig> {
        let retry = &self.retry;
        RetryConfig::builder()
            .max_attempts(retry.max_attempts)
            .initial_delay(retry.initial_delay)
            .max_delay(retry.max_delay)
            .backoff_multiplier(retry.backoff_multiplier)
            .jitter(retry.jitter)
            .retryable_errors(retry.retryable_errors.iter().cloned())
            .build()
    }

    /// Check every section, including each per-dependency override
    pub fn validate(&self) -> ConfigResult<()> {
        self.retry_config()?;
        self.breaker_config("default")?;
        for name in self.breakers.keys() {
            self.breaker_config(name)?;
        }
        Ok(())
    }
}

/// Load settings with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a settings file.
///
/// # Errors
/// Returns `SettingsError` if settings cannot be loaded from either source or
/// fail validation.
pub fn load() -> SettingsResult<ResilienceSettings> {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env file");
    }

    match load_from_env() {
        Ok(settings) => {
            info!("Resilience settings loaded from environment variables");
            Ok(settings)
        }
        Err(SettingsError::MissingVar(key)) => {
            debug!(missing = %key, "Environment incomplete, trying settings file");
            load_from_file(None)
        }
        Err(e) => Err(e),
    }
}

/// Load settings from `FAULTLINE_*` environment variables
///
/// # Errors
/// Returns `SettingsError::MissingVar` if a required variable is missing and
/// `SettingsError::InvalidValue` if one cannot be parsed.
pub fn load_from_env() -> SettingsResult<ResilienceSettings> {
    let defaults = ResilienceSettings::default();

    let failure_threshold = env_parse("FAULTLINE_BREAKER_FAILURE_THRESHOLD")?;
    let timeout = env_parse::<u64>("FAULTLINE_BREAKER_TIMEOUT_MS").map(Duration::from_millis)?;
    let max_attempts = env_parse("FAULTLINE_RETRY_MAX_ATTEMPTS")?;

    let breaker = BreakerSettings {
        failure_threshold,
        timeout,
        success_threshold: env_opt("FAULTLINE_BREAKER_SUCCESS_THRESHOLD")?
            .unwrap_or(defaults.breaker.success_threshold),
        monitoring_period: env_opt::<u64>("FAULTLINE_BREAKER_MONITORING_PERIOD_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.breaker.monitoring_period),
        volume_threshold: env_opt("FAULTLINE_BREAKER_VOLUME_THRESHOLD")?
            .unwrap_or(defaults.breaker.volume_threshold),
    };

    let retry = RetrySettings {
        max_attempts,
        initial_delay: env_opt::<u64>("FAULTLINE_RETRY_INITIAL_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.initial_delay),
        max_delay: env_opt::<u64>("FAULTLINE_RETRY_MAX_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.max_delay),
        backoff_multiplier: env_opt("FAULTLINE_RETRY_BACKOFF_MULTIPLIER")?
            .unwrap_or(defaults.retry.backoff_multiplier),
        jitter: env_bool("FAULTLINE_RETRY_JITTER", defaults.retry.jitter),
        retryable_errors: std::env::var("FAULTLINE_RETRY_RETRYABLE_ERRORS")
            .map(|list| {
                list.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            })
            .unwrap_or_default(),
    };

    let settings = ResilienceSettings { breaker, breakers: BTreeMap::new(), retry };
    settings.validate()?;
    Ok(settings)
}

/// Load settings from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns `SettingsError` if the file is missing, unreadable, malformed or
/// fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> SettingsResult<ResilienceSettings> {
    let settings_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SettingsError::FileNotFound(p));
            }
            p
        }
        None => probe_config_paths().ok_or(SettingsError::NoConfigFile)?,
    };

    info!(path = %settings_path.display(), "Loading resilience settings from file");

    let contents = std::fs::read_to_string(&settings_path).map_err(CommonError::from)?;
    let settings = parse_settings(&contents, &settings_path)?;
    settings.validate()?;
    Ok(settings)
}

/// Parse settings from string content, format chosen by `path`'s extension
fn parse_settings(contents: &str, path: &Path) -> SettingsResult<ResilienceSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => Ok(toml::from_str(contents).map_err(CommonError::from)?),
        "json" => Ok(serde_json::from_str(contents).map_err(CommonError::from)?),
        other => Err(SettingsError::UnsupportedFormat(other.to_string())),
    }
}

/// First existing settings file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] =
        ["faultline.toml", "faultline.json", "config/faultline.toml", "config/faultline.json"];

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> SettingsResult<String> {
    std::env::var(key).map_err(|_| SettingsError::MissingVar(key.to_string()))
}

/// Parse a required environment variable
fn env_parse<T>(key: &str) -> SettingsResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(&env_var(key)?, key)
}

fn parse_value<T>(value: &str, key: &str) -> SettingsResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| SettingsError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parse an optional environment variable; unset means `None`
fn env_opt<T>(key: &str) -> SettingsResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key).ok().map(|value| parse_value(&value, key)).transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: [&str; 11] = [
        "FAULTLINE_BREAKER_FAILURE_THRESHOLD",
        "FAULTLINE_BREAKER_TIMEOUT_MS",
        "FAULTLINE_BREAKER_SUCCESS_THRESHOLD",
        "FAULTLINE_BREAKER_MONITORING_PERIOD_MS",
        "FAULTLINE_BREAKER_VOLUME_THRESHOLD",
        "FAULTLINE_RETRY_MAX_ATTEMPTS",
        "FAULTLINE_RETRY_INITIAL_DELAY_MS",
        "FAULTLINE_RETRY_MAX_DELAY_MS",
        "FAULTLINE_RETRY_BACKOFF_MULTIPLIER",
        "FAULTLINE_RETRY_JITTER",
        "FAULTLINE_RETRY_RETRYABLE_ERRORS",
    ];

    fn clear_env() {
        for key in ALL_VARS {
            std::env::remove_var(key);
        }
    }

    fn temp_settings(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = tempfile::Builder::new().suffix(&format!(".{extension}")).tempfile().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().to_path_buf();
        (temp_file, path)
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("FAULTLINE_TEST_BOOL_ON", "on");
        std::env::set_var("FAULTLINE_TEST_BOOL_UPPER", "TRUE");
        std::env::set_var("FAULTLINE_TEST_BOOL_OFF", "0");
        std::env::remove_var("FAULTLINE_TEST_BOOL_MISSING");

        assert!(env_bool("FAULTLINE_TEST_BOOL_ON", false));
        assert!(env_bool("FAULTLINE_TEST_BOOL_UPPER", false));
        assert!(!env_bool("FAULTLINE_TEST_BOOL_OFF", true));
        assert!(env_bool("FAULTLINE_TEST_BOOL_MISSING", true));

        std::env::remove_var("FAULTLINE_TEST_BOOL_ON");
        std::env::remove_var("FAULTLINE_TEST_BOOL_UPPER");
        std::env::remove_var("FAULTLINE_TEST_BOOL_OFF");
    }

    /// Validates loading from the environment with optional variables set.
    ///
    /// Assertions:
    /// - Confirms required and optional values are read.
    /// - Confirms the identifier list is split and trimmed.
    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("FAULTLINE_BREAKER_FAILURE_THRESHOLD", "3");
        std::env::set_var("FAULTLINE_BREAKER_TIMEOUT_MS", "1500");
        std::env::set_var("FAULTLINE_BREAKER_VOLUME_THRESHOLD", "4");
        std::env::set_var("FAULTLINE_RETRY_MAX_ATTEMPTS", "4");
        std::env::set_var("FAULTLINE_RETRY_INITIAL_DELAY_MS", "200");
        std::env::set_var("FAULTLINE_RETRY_JITTER", "false");
        std::env::set_var("FAULTLINE_RETRY_RETRYABLE_ERRORS", "ECONNREFUSED, 503 ,");

        let result = load_from_env();
        clear_env();

        let settings = result.expect("settings should load from env");
        assert_eq!(settings.breaker.failure_threshold, 3);
        assert_eq!(settings.breaker.timeout, Duration::from_millis(1500));
        assert_eq!(settings.breaker.volume_threshold, 4);
        assert_eq!(settings.breaker.success_threshold, 2);
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(200));
        assert!(!settings.retry.jitter);
        assert_eq!(settings.retry.retryable_errors, vec!["ECONNREFUSED", "503"]);
    }

    #[test]
    fn test_load_from_env_missing_var() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("FAULTLINE_BREAKER_FAILURE_THRESHOLD", "3");
        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(SettingsError::MissingVar(ref key)) if key == "FAULTLINE_BREAKER_TIMEOUT_MS"));
    }

    /// Validates parse and validation failures from the environment.
    ///
    /// Assertions:
    /// - Ensures a non-numeric threshold is an `InvalidValue` naming the key.
    /// - Ensures a zero attempt count fails validation.
    #[test]
    fn test_load_from_env_invalid_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("FAULTLINE_BREAKER_FAILURE_THRESHOLD", "many");
        std::env::set_var("FAULTLINE_BREAKER_TIMEOUT_MS", "1000");
        std::env::set_var("FAULTLINE_RETRY_MAX_ATTEMPTS", "3");
        let parse = load_from_env();

        std::env::set_var("FAULTLINE_BREAKER_FAILURE_THRESHOLD", "3");
        std::env::set_var("FAULTLINE_RETRY_MAX_ATTEMPTS", "0");
        let validation = load_from_env();
        clear_env();

        assert!(matches!(
            parse,
            Err(SettingsError::InvalidValue { ref key, .. }) if key == "FAULTLINE_BREAKER_FAILURE_THRESHOLD"
        ));
        assert!(matches!(validation, Err(SettingsError::Invalid(_))));
    }

    /// Validates TOML loading with a per-dependency override.
    ///
    /// Assertions:
    /// - Confirms overridden fields apply only to the named dependency.
    /// - Confirms unset fields inherit the defaults section.
    #[test]
    fn test_load_from_file_toml_with_override() {
        let (_file, path) = temp_settings(
            r#"
            [breaker]
            failure_threshold = 4
            timeout = 20000

            [breakers.sms]
            failure_threshold = 2
            timeout = 5000

            [retry]
            max_attempts = 5
            initial_delay = 250
            max_delay = 4000
            jitter = false
            "#,
            "toml",
        );

        let settings = load_from_file(Some(path)).expect("valid TOML settings");

        let sms = settings.breaker_config("sms").unwrap();
        assert_eq!(sms.failure_threshold, 2);
        assert_eq!(sms.timeout, Duration::from_secs(5));
        assert_eq!(sms.volume_threshold, 10);

        let email = settings.breaker_config("email").unwrap();
        assert_eq!(email.failure_threshold, 4);
        assert_eq!(email.timeout, Duration::from_secs(20));

        let retry = settings.retry_config().unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));
        assert!(!retry.jitter);
    }

    #[test]
    fn test_load_from_file_json() {
        let (_file, path) = temp_settings(
            r#"{ "breaker": { "volume_threshold": 1 }, "retry": { "retryable_errors": ["P1001"] } }"#,
            "json",
        );

        let settings = load_from_file(Some(path)).expect("valid JSON settings");
        assert_eq!(settings.breaker.volume_threshold, 1);
        assert_eq!(settings.breaker.failure_threshold, 5);
        assert_eq!(settings.retry.retryable_errors, vec!["P1001"]);
    }

    #[test]
    fn test_load_from_file_errors() {
        let missing = load_from_file(Some(PathBuf::from("/nonexistent/faultline.toml")));
        assert!(matches!(missing, Err(SettingsError::FileNotFound(_))));

        let (_file, path) = temp_settings("breaker: {}", "yaml");
        assert!(matches!(load_from_file(Some(path)), Err(SettingsError::UnsupportedFormat(_))));

        let (_file, path) = temp_settings("[breaker\nfailure_threshold = ", "toml");
        assert!(matches!(load_from_file(Some(path)), Err(SettingsError::Common(_))));

        let (_file, path) = temp_settings("[breakers.sms]\nsuccess_threshold = 0\n", "toml");
        assert!(matches!(load_from_file(Some(path)), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_defaults_round_trip_through_configs() {
        let settings = ResilienceSettings::default();
        assert_eq!(settings.breaker_config("push").unwrap(), CircuitBreakerConfig::new("push"));
        assert_eq!(settings.retry_config().unwrap().max_attempts, 3);
    }
}
