//! JSON I/O handling for CLI
//!
//! - Arguments carrying data are JSON strings
//! - Output: single JSON object via stdout
//! - Logs stay on stderr

use std::io::{self, Write};

use serde_json::Value;

use super::errors::CliResult;
use crate::errors::EngineError;

/// Parses a JSON argument. Shells often leave the surrounding single quotes
/// on, so those are stripped first.
pub fn parse_json_arg(name: &str, text: &str) -> CliResult<Value> {
    let trimmed = text.trim().trim_matches('\'');
    serde_json::from_str(trimmed).map_err(|e| {
        EngineError::invalid_format_with("Invalid JSON string.", e)
            .with_details(format!("argument: --{}", name))
            .into()
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(&response)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(&response)
}

fn write_line(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
