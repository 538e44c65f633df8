//! Engine configuration.
//!
//! # Responsibility
//! - Hold tunables for storage, baseline allocation and logging.
//! - Load them from JSON text or a file with defaults for absent keys.
//!
//! # Invariants
//! - A loaded config has passed `validate()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASELINE_VERSION_ATTEMPTS: u32 = 3;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_LOG_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Read { path: PathBuf, message: String },
    Parse(String),
    Invalid { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "failed to read config `{}`: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid config json: {message}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Rolling file log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace|debug|info|warn|error.
    pub level: String,
    /// Absolute directory; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            max_file_size_bytes: DEFAULT_MAX_LOG_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_LOG_FILES,
        }
    }
}

impl LoggingConfig {
    pub fn with_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: Some(log_dir.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts for one baseline version allocation before a conflict.
    pub baseline_version_attempts: u32,
    /// SQLite busy handler timeout.
    pub busy_timeout_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            baseline_version_attempts: DEFAULT_BASELINE_VERSION_ATTEMPTS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(value: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(value).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseline_version_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "baseline_version_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid {
                field: "logging.max_files",
                message: "must be at least 1".to_string(),
            });
        }
        if self.logging.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "logging.max_file_size_bytes",
                message: "must be greater than 0".to_string(),
            });
        }
        if let Some(dir) = &self.logging.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "logging.log_dir",
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        Ok(())
    }
}
