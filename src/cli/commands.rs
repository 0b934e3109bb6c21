//! CLI command implementations
//!
//! Each command opens the database, runs one engine operation and prints a
//! single JSON envelope. Failures are printed as an error envelope and also
//! returned, so the process exits non-zero.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::aggregate::{AggregateFn, RecordGroup};
use crate::condition::Conjunction;
use crate::config::Config;
use crate::engine::{ColumnChange, Database};
use crate::join::JoinSpec;
use crate::pipeline::{parse_ascending, parse_columns, QuerySpec};
use crate::record::Record;
use crate::sort::SortOrder;

use super::args::{Cli, Command};
use super::errors::CliResult;
use super::io::{parse_json_arg, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let result = load_config(cli.config.as_deref(), cli.db)
        .and_then(|config| run_command(&config, cli.command));

    match result {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code(), &e.message())?;
            Err(e)
        }
    }
}

/// Config file (or defaults), with `--db` taking precedence over `data_dir`
pub fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> CliResult<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(db) = db {
        config.data_dir = db;
    }
    Ok(config)
}

/// Run one command and return the `data` payload
pub fn run_command(config: &Config, cmd: Command) -> CliResult<Value> {
    let db = Database::open(config)?;

    match cmd {
        Command::CreateTable {
            table,
            format,
            columns,
        } => {
            let manifest = db.create_table(&table, format, parse_columns(&columns))?;
            Ok(json!({
                "table": manifest.table,
                "format": manifest.format.to_string(),
                "columns": manifest.columns,
            }))
        }

        Command::Adopt { table } => {
            let manifest = db.adopt_legacy_table(&table)?;
            Ok(json!({
                "table": manifest.table,
                "chunks": manifest.chunks.len(),
                "rows": manifest.total_rows(),
            }))
        }

        Command::Insert { table, values } => insert(&db, &table, &values),

        Command::Delete { table, conditions } => {
            let conjunction = conditions_arg(&conditions)?;
            let deleted = db.delete_where(&table, &conjunction)?;
            Ok(json!({"message": "Rows deleted successfully.", "rows_deleted": deleted}))
        }

        Command::Update { table, conditions } => {
            let changes = ColumnChange::parse_map(&parse_json_arg("conditions", &conditions)?)?;
            let updated = db.update_where(&table, &changes)?;
            Ok(json!({"message": "Rows updated successfully.", "rows_updated": updated}))
        }

        Command::UpdateId { table, id, values } => {
            let values = Record::from_json(parse_json_arg("values", &values)?)?;
            let updated = db.update_by_id(&table, id, values)?;
            let message = if updated {
                "Record updated successfully."
            } else {
                "No matching record found to update."
            };
            Ok(json!({"message": message, "updated": updated}))
        }

        Command::Project { table, columns } => {
            let columns = columns.as_deref().map(parse_columns);
            rows(db.project(&table, columns.as_deref())?)
        }

        Command::Filter { table, conditions } => {
            rows(db.filter(&table, &conditions_arg(&conditions)?)?)
        }

        Command::Order {
            table,
            column,
            ascending,
            numeric,
        } => rows(db.order_by(&table, &column, parse_ascending(&ascending)?, numeric)?),

        Command::Sort {
            table,
            column,
            ascending,
            numeric,
        } => {
            let order = SortOrder::parse(&column, parse_ascending(&ascending)?, numeric)?;
            let manifest = db.sort_table(&table, order)?;
            Ok(json!({
                "table": manifest.table,
                "rows": manifest.total_rows(),
                "chunks": manifest.chunks.len(),
            }))
        }

        Command::Groupby {
            table,
            column,
            agg,
            project,
        } => match agg {
            Some(agg) => {
                let function: AggregateFn = agg.parse()?;
                let project = project.as_deref().map(parse_columns);
                rows(db.group_by(&table, &column, function, project)?)
            }
            None => Ok(RecordGroup::to_json_map(&db.group_records(&table, &column)?)),
        },

        Command::Join {
            left,
            right,
            columns,
        } => rows(db.join(&left, &right, &JoinSpec::parse(&columns))?),

        Command::Query { table, request } => {
            let spec = QuerySpec::from_json(parse_json_arg("request", &request)?)?;
            rows(db.query(&table, &spec)?)
        }
    }
}

/// A JSON object inserts one row; a JSON array inserts each element in order.
/// Every element is parsed before the first insert.
fn insert(db: &Database, table: &str, values: &str) -> CliResult<Value> {
    match parse_json_arg("values", values)? {
        Value::Array(items) => {
            let records = items
                .into_iter()
                .map(Record::from_json)
                .collect::<Result<Vec<_>, _>>()?;
            let mut outcomes = Vec::with_capacity(records.len());
            for record in records {
                outcomes.push(db.insert_row(table, record)?);
            }
            Ok(serde_json::to_value(outcomes)?)
        }
        other => Ok(serde_json::to_value(db.insert_row(table, Record::from_json(other)?)?)?),
    }
}

fn conditions_arg(text: &str) -> CliResult<Conjunction> {
    Ok(Conjunction::from_json(&parse_json_arg("conditions", text)?)?)
}

fn rows(records: Vec<Record>) -> CliResult<Value> {
    Ok(Value::Array(records.iter().map(Record::to_json).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TableFormat;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        load_config(None, Some(dir.path().to_path_buf())).unwrap()
    }

    #[test]
    fn test_insert_then_filter() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        run_command(
            &config,
            Command::CreateTable {
                table: "ev".into(),
                format: TableFormat::Delimited,
                columns: "Make,Year".into(),
            },
        )
        .unwrap();
        run_command(
            &config,
            Command::Insert {
                table: "ev".into(),
                values: r#"[{"Make": "TESLA", "Year": "2020"}, {"Make": "KIA", "Year": "2019"}]"#.into(),
            },
        )
        .unwrap();

        let out = run_command(
            &config,
            Command::Filter {
                table: "ev".into(),
                conditions: r#"{"Year": {"operator": "gt", "value": 2019}}"#.into(),
            },
        )
        .unwrap();
        assert_eq!(out, json!([{"Make": "TESLA", "Year": "2020"}]));
    }

    #[test]
    fn test_malformed_batch_inserts_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        run_command(
            &config,
            Command::CreateTable {
                table: "t".into(),
                format: TableFormat::Delimited,
                columns: "a".into(),
            },
        )
        .unwrap();

        let err = run_command(
            &config,
            Command::Insert {
                table: "t".into(),
                values: r#"[{"a": "1"}, [1]]"#.into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "SQ_INVALID_FORMAT");

        let out = run_command(
            &config,
            Command::Project {
                table: "t".into(),
                columns: None,
            },
        )
        .unwrap();
        assert_eq!(out, json!([]));
    }

    #[test]
    fn test_groupby_without_agg_lists_records() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        run_command(
            &config,
            Command::CreateTable {
                table: "ev".into(),
                format: TableFormat::Delimited,
                columns: "Make,Year".into(),
            },
        )
        .unwrap();
        run_command(
            &config,
            Command::Insert {
                table: "ev".into(),
                values: r#"[{"Make": "KIA", "Year": "2019"}, {"Make": "BMW", "Year": "2020"}, {"Make": "KIA", "Year": "2021"}]"#.into(),
            },
        )
        .unwrap();

        let out = run_command(
            &config,
            Command::Groupby {
                table: "ev".into(),
                column: "Make".into(),
                agg: None,
                project: None,
            },
        )
        .unwrap();
        assert_eq!(
            out,
            json!({
                "BMW": [{"Make": "BMW", "Year": "2020"}],
                "KIA": [{"Make": "KIA", "Year": "2019"}, {"Make": "KIA", "Year": "2021"}]
            })
        );
    }

    #[test]
    fn test_insert_into_json_table_reports_ids() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        run_command(
            &config,
            Command::CreateTable {
                table: "j".into(),
                format: TableFormat::RecordArray,
                columns: String::new(),
            },
        )
        .unwrap();
        let out = run_command(
            &config,
            Command::Insert {
                table: "j".into(),
                values: r#"{"name": "a"}"#.into(),
            },
        )
        .unwrap();
        assert_eq!(out["assigned_id"], 1);
    }

    #[test]
    fn test_bad_ascending_flag() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let err = run_command(
            &config,
            Command::Order {
                table: "ev".into(),
                column: "Year".into(),
                ascending: "maybe".into(),
                numeric: false,
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), "SQ_INVALID_FORMAT");
    }

    #[test]
    fn test_missing_database() {
        let dir = TempDir::new().unwrap();
        let config = load_config(None, Some(dir.path().join("nope"))).unwrap();
        let err = run_command(&config, Command::Adopt { table: "t".into() }).unwrap_err();
        assert_eq!(err.code(), "SQ_NOT_FOUND");
        assert!(err.message().starts_with("Database does not exist."));
    }
}
