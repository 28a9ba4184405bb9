//! Configuration for chess sessions.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Environment variable overriding [`ChessConfig::record_dir`].
pub const RECORD_DIR_ENV: &str = "STRICTLY_CHESS_RECORD_DIR";

/// Session configuration, usually loaded from `strictly_chess.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct ChessConfig {
    /// Directory game records are saved to.
    #[serde(default = "default_record_dir")]
    record_dir: PathBuf,

    /// Extension of saved record files.
    #[serde(default = "default_record_extension")]
    record_extension: String,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    log_filter: String,
}

#[instrument]
fn default_record_dir() -> PathBuf {
    PathBuf::from("records")
}

#[instrument]
fn default_record_extension() -> String {
    "jcr".to_string()
}

#[instrument]
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ChessConfig {
    fn default() -> Self {
        Self {
            record_dir: default_record_dir(),
            record_extension: default_record_extension(),
            log_filter: default_log_filter(),
        }
    }
}

impl ChessConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(record_dir = %config.record_dir.display(), "Config loaded successfully");
        Ok(config)
    }

    /// Loads `path` if it exists (defaults otherwise), then applies
    /// environment overrides.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            debug!("No config file, using defaults");
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    /// Applies `STRICTLY_CHESS_RECORD_DIR` if it is set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(RECORD_DIR_ENV) {
            debug!(record_dir = %dir, "Record directory overridden from environment");
            self.record_dir = PathBuf::from(dir);
        }
        self
    }

    /// Returns a copy writing records to `dir`.
    pub fn with_record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = dir.into();
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
