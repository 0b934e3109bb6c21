//! CLI-specific error types
//!
//! Engine errors keep their own codes; everything else the CLI can hit gets
//! an `SQ_CLI_*` code.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::errors::EngineError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "SQ_CLI_CONFIG_ERROR",
            Self::Engine(e) => e.code(),
            Self::Io(_) | Self::Json(_) => "SQ_CLI_IO_ERROR",
        }
    }

    /// Message for the error envelope, without the code prefix
    pub fn message(&self) -> String {
        match self {
            Self::Engine(e) => match e.details() {
                Some(details) => format!("{} ({})", e.message(), details),
                None => e.message().to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
