//! Engine configuration
//!
//! Loaded from a JSON file; every field except `data_dir` has a default.
//!
//! ```json
//! {
//!   "data_dir": "./database/ev",
//!   "max_chunk_rows": 10000,
//!   "max_chunk_bytes": 4194304,
//!   "sort_run_size": 5000,
//!   "merge_fan_in": 64,
//!   "parallel": true,
//!   "log_level": "info"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Database directory holding one subdirectory per table
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Rows per chunk before a new chunk is started (0 disables the limit)
    #[serde(default = "default_max_chunk_rows")]
    pub max_chunk_rows: u64,

    /// Bytes per chunk file before a new chunk is started (0 disables the limit)
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: u64,

    /// Records per in-memory sort run
    #[serde(default = "default_sort_run_size")]
    pub sort_run_size: usize,

    /// Most run files merged in one pass; more runs take extra passes
    #[serde(default = "default_merge_fan_in")]
    pub merge_fan_in: usize,

    /// Run per-chunk work on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Minimum log severity: trace, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_chunk_rows() -> u64 {
    10_000
}
fn default_max_chunk_bytes() -> u64 {
    4 * 1024 * 1024
}
fn default_sort_run_size() -> usize {
    5000
}
fn default_merge_fan_in() -> usize {
    64
}
fn default_parallel() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_chunk_rows: default_max_chunk_rows(),
            max_chunk_bytes: default_max_chunk_bytes(),
            sort_run_size: default_sort_run_size(),
            merge_fan_in: default_merge_fan_in(),
            parallel: default_parallel(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Default configuration rooted at `data_dir`
    pub fn for_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Loads and validates a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates configuration JSON
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sort_run_size == 0 {
            return Err(ConfigError::Invalid("sort_run_size must be > 0".into()));
        }
        if self.merge_fan_in < 2 {
            return Err(ConfigError::Invalid("merge_fan_in must be >= 2".into()));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed log threshold
    pub fn severity(&self) -> ConfigResult<Severity> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_json(r#"{"data_dir": "/tmp/db"}"#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/db"));
        assert_eq!(config.sort_run_size, 5000);
        assert_eq!(config.max_chunk_rows, 10_000);
        assert!(config.parallel);
    }

    #[test]
    fn test_zero_run_size_rejected() {
        let err = Config::from_json(r#"{"sort_run_size": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_fan_in_below_two_rejected() {
        assert!(Config::from_json(r#"{"merge_fan_in": 1}"#).is_err());
        assert_eq!(Config::default().merge_fan_in, 64);
    }

    #[test]
    fn test_bad_log_level_rejected() {
        assert!(Config::from_json(r#"{"log_level": "chatty"}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"data_dir": "db", "max_chunk_rows": 2}}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.max_chunk_rows, 2);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/synthquery.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
