use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OciDistError, Result};

/// Product name used in SOCI artifact types (`application/vnd.<product>.<kind>`).
pub const DEFAULT_PRODUCT: &str = "atomix";

/// Per-backend settings, fixed when a repository handle is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Use https and validate server certificates
    pub tls_verify: bool,

    /// Emit request-level debug logging
    pub debug: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            tls_verify: true,
            debug: false,
        }
    }
}

/// On-disk configuration (`~/.ocidist/config.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OciDistConfig {
    /// Default for `--tls-verify`
    pub tls_verify: bool,

    /// Default for `--debug`
    pub debug: bool,

    /// SOCI product name
    pub product: String,

    /// Log level when `RUST_LOG` is unset and `--debug` is off
    pub log_level: LogLevel,
}

impl Default for OciDistConfig {
    fn default() -> Self {
        Self {
            tls_verify: true,
            debug: false,
            product: DEFAULT_PRODUCT.to_string(),
            log_level: LogLevel::Warn,
        }
    }
}

impl OciDistConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".ocidist").join("config.yaml"))
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OciDistError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            OciDistError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit path, else the default path if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(p) if p.exists() => Self::load(&p),
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let product = self.product.trim();
        if product.is_empty() || product.contains(['/', ' ']) {
            return Err(OciDistError::ConfigError(format!(
                "Invalid product name '{}'",
                self.product
            )));
        }
        Ok(())
    }

    /// Backend settings derived from this configuration.
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            tls_verify: self.tls_verify,
            debug: self.debug,
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
