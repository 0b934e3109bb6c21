//! CLI argument definitions using clap
//!
//! Commands:
//! - synthquery create-table --table <name> --format csv|json --columns a,b
//! - synthquery adopt --table <name>
//! - synthquery insert --table <name> --values '<json>'
//! - synthquery delete --table <name> --conditions '<json>'
//! - synthquery update --table <name> --conditions '<json>'
//! - synthquery update-id --table <name> --id <n> --values '<json>'
//! - synthquery project --table <name> [--columns a,b]
//! - synthquery filter --table <name> --conditions '<json>'
//! - synthquery order --table <name> --column <col[,col..]> [--ascending T|F] [--numeric]
//! - synthquery sort --table <name> --column <col[,col..]> [--ascending T|F] [--numeric]
//! - synthquery groupby --table <name> --column <col> [--agg <fn>] [--project a,b]
//! - synthquery join --left <a> --right <b> [--columns left,right]
//! - synthquery query --table <name> --request '<json>'

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::store::TableFormat;

/// synthquery - chunked query engine over CSV and JSON tables
#[derive(Parser, Debug)]
#[command(name = "synthquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Database directory; overrides `data_dir` from the config file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty table
    CreateTable {
        #[arg(long)]
        table: String,
        /// csv or json
        #[arg(long, default_value = "csv")]
        format: TableFormat,
        /// Comma-separated column names
        #[arg(long, default_value = "")]
        columns: String,
    },

    /// Split a single-file `<table>.csv` / `<table>.json` into chunks
    Adopt {
        #[arg(long)]
        table: String,
    },

    /// Insert a row (a JSON object) or several rows (a JSON array)
    Insert {
        #[arg(long)]
        table: String,
        #[arg(long)]
        values: String,
    },

    /// Delete rows matching all conditions
    Delete {
        #[arg(long)]
        table: String,
        #[arg(long)]
        conditions: String,
    },

    /// Replace values: {"col": {"from": "old", "to": "new"}}
    Update {
        #[arg(long)]
        table: String,
        #[arg(long)]
        conditions: String,
    },

    /// Update one record of a json table by its id
    UpdateId {
        #[arg(long)]
        table: String,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        values: String,
    },

    /// Print all rows or selected columns
    Project {
        #[arg(long)]
        table: String,
        #[arg(long)]
        columns: Option<String>,
    },

    /// Print rows matching all conditions
    Filter {
        #[arg(long)]
        table: String,
        #[arg(long)]
        conditions: String,
    },

    /// Print rows sorted by one or more columns
    Order {
        #[arg(long)]
        table: String,
        /// Comma-separated; earlier columns take precedence
        #[arg(long)]
        column: String,
        /// T/True/true or F/False/false
        #[arg(long, default_value = "T")]
        ascending: String,
        /// Compare keys as numbers
        #[arg(long)]
        numeric: bool,
    },

    /// Re-order the table on disk
    Sort {
        #[arg(long)]
        table: String,
        #[arg(long)]
        column: String,
        #[arg(long, default_value = "T")]
        ascending: String,
        #[arg(long)]
        numeric: bool,
    },

    /// Aggregate every column per group, or list each group's records
    Groupby {
        #[arg(long)]
        table: String,
        #[arg(long)]
        column: String,
        /// sum, mean, min, max or count; without it the grouped records are printed
        #[arg(long)]
        agg: Option<String>,
        /// Restrict aggregation to these columns
        #[arg(long)]
        project: Option<String>,
    },

    /// Inner equi-join of two tables
    Join {
        #[arg(long)]
        left: String,
        #[arg(long)]
        right: String,
        /// `left_col,right_col`, or one name for both sides; omitted joins on
        /// the shared columns
        #[arg(long, default_value = "")]
        columns: String,
    },

    /// Run a composite query
    Query {
        #[arg(long)]
        table: String,
        #[arg(long)]
        request: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
