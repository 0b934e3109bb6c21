//! Engine error types
//!
//! Error codes:
//! - SQ_NOT_FOUND: database, table or column absent
//! - SQ_INVALID_FORMAT: malformed stored data or request
//! - SQ_SCHEMA_MISMATCH: referenced column absent from a record or chunk
//! - SQ_TYPE_COERCION: numeric comparison/aggregation on non-numeric data
//! - SQ_IO_FAILURE: staging write, rename or read failure
//!
//! Every engine operation returns `EngineResult`. Validation errors are raised
//! before any chunk is touched.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Boxed source error carried across worker threads
pub type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidFormat,
    SchemaMismatch,
    TypeCoercion,
    IoFailure,
}

impl ErrorKind {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "SQ_NOT_FOUND",
            ErrorKind::InvalidFormat => "SQ_INVALID_FORMAT",
            ErrorKind::SchemaMismatch => "SQ_SCHEMA_MISMATCH",
            ErrorKind::TypeCoercion => "SQ_TYPE_COERCION",
            ErrorKind::IoFailure => "SQ_IO_FAILURE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Engine error with kind, message and optional context
#[derive(Debug)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    details: Option<String>,
    source: Option<BoxedSource>,
}

impl EngineError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Database, table or column does not exist
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Table does not exist in the database
    pub fn table_not_found(table: &str) -> Self {
        Self::new(ErrorKind::NotFound, "Table does not exist").with_details(format!("table: {}", table))
    }

    /// Stored data or request payload could not be parsed
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFormat, message)
    }

    /// Parse failure with the underlying decoder error attached
    pub fn invalid_format_with(message: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        let mut err = Self::new(ErrorKind::InvalidFormat, message);
        err.source = Some(source.into());
        err
    }

    /// A referenced column is missing from a record or chunk
    pub fn schema_mismatch(column: &str, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaMismatch, context).with_details(format!("column: {}", column))
    }

    /// A value could not be coerced to a number (or string, for `contains`)
    pub fn type_coercion(raw: &str, context: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeCoercion, context).with_details(format!("value: {:?}", raw))
    }

    /// I/O failure while staging, renaming or reading
    pub fn io_failure(message: impl Into<String>, source: io::Error) -> Self {
        let mut err = Self::new(ErrorKind::IoFailure, message);
        err.source = Some(Box::new(source));
        err
    }

    /// Attach free-form context
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the string code of the kind
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Returns the human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional context
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl StdError for EngineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::InvalidFormat,
            ErrorKind::SchemaMismatch,
            ErrorKind::TypeCoercion,
            ErrorKind::IoFailure,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_display_contains_code_and_details() {
        let err = EngineError::schema_mismatch("Year", "Sort column missing from record");
        let display = err.to_string();
        assert!(display.contains("SQ_SCHEMA_MISMATCH"));
        assert!(display.contains("Sort column missing"));
        assert!(display.contains("column: Year"));
    }

    #[test]
    fn test_io_failure_keeps_source() {
        let err = EngineError::io_failure(
            "rename failed",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_table_not_found() {
        let err = EngineError::table_not_found("vehicles");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.details(), Some("table: vehicles"));
    }
}
