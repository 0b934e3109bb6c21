//! Table encodings

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// On-disk encoding of a table's chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    /// Header row plus comma-delimited records
    Delimited,
    /// JSON array of objects; records carry a monotonic `id`
    RecordArray,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Delimited => "csv",
            TableFormat::RecordArray => "json",
        }
    }

    /// Whether records get an assigned `id`
    pub fn assigns_ids(&self) -> bool {
        matches!(self, TableFormat::RecordArray)
    }

    /// Infers the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "csv" => Some(TableFormat::Delimited),
            "json" => Some(TableFormat::RecordArray),
            _ => None,
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableFormat::Delimited => "csv",
            TableFormat::RecordArray => "json",
        })
    }
}

impl FromStr for TableFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" | "delimited" => Ok(TableFormat::Delimited),
            "json" | "record_array" => Ok(TableFormat::RecordArray),
            other => Err(EngineError::invalid_format("Unknown table format")
                .with_details(format!("format: {}", other))),
        }
    }
}
