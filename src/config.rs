use serde::{Deserialize, Serialize};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::error::ConfigError;

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 2.0;
pub const DEFAULT_INTERVAL_SECONDS: f64 = 0.5;

/// Settings of a single run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ProbeConfig {
    pub attempts: u32,
    pub timeout_seconds: f64,
    pub interval_seconds: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        validate_attempts(self.attempts)?;
        validate_timeout(self.timeout_seconds)?;
        if !self.interval_seconds.is_finite() || self.interval_seconds < 0.0 {
            return Err(ConfigError::InvalidInterval(self.interval_seconds));
        }
        Ok(())
    }

    /// Per-attempt connect bound. Only meaningful on a validated config.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::MAX)
    }

    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_seconds).unwrap_or(Duration::ZERO)
    }
}

pub fn validate_port(port: u32) -> std::result::Result<u16, ConfigError> {
    match u16::try_from(port) {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(ConfigError::InvalidPort(port)),
    }
}

pub fn validate_attempts(attempts: u32) -> std::result::Result<u32, ConfigError> {
    if attempts > 0 {
        Ok(attempts)
    } else {
        Err(ConfigError::InvalidAttempts(attempts))
    }
}

pub fn validate_timeout(seconds: f64) -> std::result::Result<f64, ConfigError> {
    if seconds.is_finite() && seconds > 0.0 && Duration::try_from_secs_f64(seconds).is_ok() {
        Ok(seconds)
    } else {
        Err(ConfigError::InvalidTimeout(seconds))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    /// Take an IPv4 address when the host has one, otherwise whatever resolves first.
    #[default]
    Auto,
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Contents of the optional JSON settings file. Every field may be omitted;
/// command-line flags take precedence over anything set here.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u32>,
    pub attempts: Option<u32>,
    pub timeout_seconds: Option<f64>,
    pub interval_seconds: Option<f64>,
    #[serde(default)]
    pub family: IpFamily,
    #[serde(default)]
    pub color: ColorMode,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            attempts: None,
            timeout_seconds: None,
            interval_seconds: None,
            family: IpFamily::default(),
            color: ColorMode::default(),
            log_level: default_log_level(),
        }
    }
}

/// Get the log level as a tracing::Level
pub fn get_tracing_level(log_level: &str) -> std::result::Result<tracing::Level, ConfigError> {
    match log_level.to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" | "warning" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        _ => Err(ConfigError::InvalidLogLevel(log_level.to_string())),
    }
}

pub async fn load_file_config(file_path: &Path) -> Result<FileConfig> {
    if !file_path.exists() {
        return Err(anyhow::anyhow!("Config file not found: {}", file_path.display()));
    }

    let content = fs::read_to_string(file_path)
        .await
        .with_context(|| format!("reading {}", file_path.display()))?;
    let config: FileConfig = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", file_path.display()))?;
    Ok(config)
}
