//! Configuration file for the Swing CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use swing_core::S3Settings;

/// Swing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Object store configuration
    pub storage: StorageConfig,
    /// Transfer configuration
    pub transfer: TransferConfig,
    /// Ledger configuration
    pub ledger: LedgerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Fallback region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Default bucket for uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// S3-compatible endpoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Path-style addressing
    pub force_path_style: bool,
    /// Per-operation timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Retries after the first attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum transfers in flight; one task per file when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger path
    pub file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(swing_files::DEFAULT_LEDGER_FILE),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

const VALID_LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Can't read config file {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("swing").join("config.toml"))
    }

    /// Load the file at `path`, or the default file if it exists
    ///
    /// An explicitly named file must exist; a missing default file means
    /// built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a file that should be read cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            );
        }

        if let Some(max) = self.transfer.max_concurrent {
            if max == 0 || max > 1000 {
                anyhow::bail!("Max concurrent transfers must be between 1 and 1000");
            }
        }

        if self.storage.bucket.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("storage.bucket must not be empty");
        }
        if self.storage.region.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("storage.region must not be empty");
        }

        if let Some(endpoint) = &self.storage.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("Endpoint '{endpoint}' must start with http:// or https://");
            }
        }

        if self.storage.timeout_ms == Some(0) {
            anyhow::bail!("storage.timeout_ms must be greater than 0");
        }

        if self.ledger.file.as_os_str().is_empty() {
            anyhow::bail!("ledger.file must not be empty");
        }

        Ok(())
    }

    /// S3 client settings, with `region` from the command line taking
    /// precedence over the file
    #[must_use]
    pub fn s3_settings(&self, region: Option<&str>) -> S3Settings {
        S3Settings {
            region: region
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .or_else(|| self.storage.region.clone()),
            endpoint: self.storage.endpoint.clone(),
            force_path_style: self.storage.force_path_style,
            timeout_ms: self.storage.timeout_ms,
            max_retries: self.storage.max_retries,
        }
    }
}
