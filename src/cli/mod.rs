//! CLI module for synthquery
//!
//! One subcommand per engine operation; every invocation prints exactly one
//! JSON object on stdout.

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{load_config, run, run_command};
pub use errors::{CliError, CliResult};
pub use io::{parse_json_arg, write_error, write_response};
