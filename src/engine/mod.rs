//! Database facade
//!
//! `Database` is the single entry point the CLI and the integration tests
//! use. It owns the table store, the condition evaluator and the query
//! pipeline, all built once from a `Config`, and exposes one method per
//! external operation:
//!
//! | Operation            | Method                 |
//! |----------------------|------------------------|
//! | create / adopt table | `create_table`, `adopt_legacy_table` |
//! | insert               | `insert_row`           |
//! | delete               | `delete_where`         |
//! | update               | `update_where`, `update_by_id` |
//! | projection           | `project`              |
//! | filter               | `filter`               |
//! | ordering             | `order_by`, `sort_table` |
//! | aggregation          | `group_by`, `group_records` |
//! | join                 | `join`                 |
//! | composite query      | `query`                |

mod mutation;

pub use mutation::{ColumnChange, InsertOutcome, ID_COLUMN};

use crate::aggregate::{group_by_table, group_records, AggregateFn, AggregateSpec, RecordGroup};
use crate::condition::{ConditionEvaluator, Conjunction};
use crate::config::Config;
use crate::errors::{EngineError, EngineResult};
use crate::join::{join_tables, JoinSpec};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::pipeline::{filter_table, QueryPipeline, QuerySpec};
use crate::record::Record;
use crate::sort::{sort_table, sort_table_stream, SortOptions, SortOrder};
use crate::store::{PartitionPolicy, TableFormat, TableManifest, TableStore};

/// An open database directory
#[derive(Debug, Clone)]
pub struct Database {
    store: TableStore,
    evaluator: ConditionEvaluator,
    sort_options: SortOptions,
    pipeline: QueryPipeline,
}

impl Database {
    /// Opens the database directory named by `config.data_dir`
    pub fn open(config: &Config) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|e| EngineError::invalid_format_with("Invalid configuration", e))?;
        if let Ok(severity) = config.severity() {
            Logger::set_threshold(severity);
        }

        let store = TableStore::open(config.data_path(), PartitionPolicy::from_config(config))?;
        let evaluator = ConditionEvaluator::default();
        let sort_options = SortOptions::from_config(config);
        let pipeline = QueryPipeline::new(evaluator.clone(), sort_options);

        let data_dir = config.data_path().display().to_string();
        let run_size = sort_options.run_size.to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("data_dir", data_dir.as_str()), ("sort_run_size", run_size.as_str())],
        );

        Ok(Self {
            store,
            evaluator,
            sort_options,
            pipeline,
        })
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn list_tables(&self) -> EngineResult<Vec<String>> {
        self.store.list_tables()
    }

    pub fn create_table(
        &self,
        table: &str,
        format: TableFormat,
        columns: Vec<String>,
    ) -> EngineResult<TableManifest> {
        self.store.create_table(table, format, columns)
    }

    pub fn adopt_legacy_table(&self, table: &str) -> EngineResult<TableManifest> {
        self.store.adopt_legacy_table(table)
    }

    /// All rows, or only the named columns. Every named column must be part
    /// of the table schema.
    pub fn project(&self, table: &str, columns: Option<&[String]>) -> EngineResult<Vec<Record>> {
        let manifest = self.store.load_manifest(table)?;
        let columns = match columns {
            Some(columns) if !columns.is_empty() => columns,
            _ => return self.store.scan(&manifest).collect(),
        };
        if let Some(missing) = columns.iter().find(|c| !manifest.has_column(c)) {
            return Err(EngineError::not_found(
                "One or more selected columns do not exist in the table.",
            )
            .with_details(format!("table: {}, column: {}", table, missing)));
        }
        self.store
            .scan(&manifest)
            .map(|record| record.map(|r| r.project(columns)))
            .collect()
    }

    /// Rows matching every condition, in table order
    pub fn filter(&self, table: &str, conditions: &Conjunction) -> EngineResult<Vec<Record>> {
        let manifest = self.store.load_manifest(table)?;
        let outcome = filter_table(
            &self.store,
            &manifest,
            conditions,
            &self.evaluator,
            self.sort_options.parallel,
        )?;
        outcome.report(table);
        Ok(outcome.records)
    }

    /// Sorted rows; the table itself is left as it is.
    ///
    /// `columns` may name several comma-separated columns, compared left to
    /// right in the same direction.
    pub fn order_by(
        &self,
        table: &str,
        columns: &str,
        ascending: bool,
        numeric: bool,
    ) -> EngineResult<Vec<Record>> {
        let manifest = self.store.load_manifest(table)?;
        let order = SortOrder::parse(columns, ascending, numeric)?;
        sort_table_stream(&self.store, &manifest, &order, &self.sort_options)?.collect()
    }

    /// Re-orders the table on disk
    pub fn sort_table(
        &self,
        table: &str,
        order: impl Into<SortOrder>,
    ) -> EngineResult<TableManifest> {
        sort_table(&self.store, table, &order.into(), &self.sort_options)
    }

    /// One row per group: `{"Group": key, column: value, ..}`
    pub fn group_by(
        &self,
        table: &str,
        column: &str,
        function: AggregateFn,
        project: Option<Vec<String>>,
    ) -> EngineResult<Vec<Record>> {
        let manifest = self.store.load_manifest(table)?;
        let spec = match project {
            Some(columns) if !columns.is_empty() => AggregateSpec::new(function).with_columns(columns),
            _ => AggregateSpec::new(function),
        };
        Ok(group_by_table(
            &self.store,
            &manifest,
            column,
            &spec,
            self.sort_options.parallel,
        )?
        .into_rows())
    }

    /// Every record of the table under its `column` value, in key order
    pub fn group_records(&self, table: &str, column: &str) -> EngineResult<Vec<RecordGroup>> {
        let manifest = self.store.load_manifest(table)?;
        group_records(&self.store, &manifest, column, &self.sort_options)
    }

    /// Inner equi-join of two tables; `JoinSpec::natural()` joins on the
    /// shared columns
    pub fn join(&self, left: &str, right: &str, spec: &JoinSpec) -> EngineResult<Vec<Record>> {
        let left = self.store.load_manifest(left)?;
        let right = self.store.load_manifest(right)?;
        join_tables(&self.store, &left, &right, spec, &self.sort_options)
    }

    /// Runs the staged query pipeline over one table
    pub fn query(&self, table: &str, spec: &QuerySpec) -> EngineResult<Vec<Record>> {
        let manifest = self.store.load_manifest(table)?;
        self.pipeline.execute(&self.store, &manifest, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::record::Value;
    use crate::sort::SortKey;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Database {
        let mut config = Config::for_dir(dir.path());
        config.max_chunk_rows = 2;
        config.sort_run_size = 2;
        Database::open(&config).unwrap()
    }

    fn seeded(dir: &TempDir) -> Database {
        let db = open(dir);
        db.create_table(
            "ev",
            TableFormat::Delimited,
            vec!["Make".into(), "Year".into(), "Range".into()],
        )
        .unwrap();
        for (make, year, range) in [
            ("TESLA", "2020", "220"),
            ("KIA", "2019", "NA"),
            ("TESLA", "2021", "30"),
            ("FORD", "2018", "100"),
            ("KIA", "2022", "250"),
        ] {
            db.insert_row(
                "ev",
                Record::from_pairs([("Make", make), ("Year", year), ("Range", range)]),
            )
            .unwrap();
        }
        db
    }

    fn texts(rows: &[Record], column: &str) -> Vec<String> {
        rows.iter()
            .map(|r| r.get(column).unwrap().raw_text().into_owned())
            .collect()
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_dir(dir.path().join("absent"));
        assert_eq!(Database::open(&config).unwrap_err().code(), "SQ_NOT_FOUND");
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_dir(dir.path());
        config.log_level = "loud".into();
        assert_eq!(
            Database::open(&config).unwrap_err().code(),
            "SQ_INVALID_FORMAT"
        );
    }

    #[test]
    fn test_project_unknown_column_is_not_found() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        let err = db.project("ev", Some(&["Color".to_string()])).unwrap_err();
        assert_eq!(err.code(), "SQ_NOT_FOUND");

        let rows = db.project("ev", Some(&["Year".to_string()])).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].len(), 1);
    }

    #[test]
    fn test_filter_across_chunks() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        let rows = db
            .filter(
                "ev",
                &Conjunction::new(vec![Condition::ge("Range", Value::integer(100))]),
            )
            .unwrap();
        assert_eq!(texts(&rows, "Make"), vec!["TESLA", "FORD", "KIA"]);
    }

    #[test]
    fn test_order_by_numeric_descending() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        let rows = db.order_by("ev", "Year", false, true).unwrap();
        assert_eq!(texts(&rows, "Year"), vec!["2022", "2021", "2020", "2019", "2018"]);
    }

    #[test]
    fn test_order_by_several_columns() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        let rows = db.order_by("ev", "Make, Year", false, false).unwrap();
        assert_eq!(texts(&rows, "Year"), vec!["2021", "2020", "2022", "2019", "2018"]);
        assert_eq!(
            db.order_by("ev", "Make,Color", true, false).unwrap_err().code(),
            "SQ_SCHEMA_MISMATCH"
        );
    }

    #[test]
    fn test_group_records_keeps_table_order() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        let groups = db.group_records("ev", "Make").unwrap();
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["FORD", "KIA", "TESLA"]);
        assert_eq!(texts(&groups[1].records, "Year"), vec!["2019", "2022"]);
    }

    #[test]
    fn test_sort_table_persists() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        db.sort_table("ev", SortKey::ascending("Make")).unwrap();
        let rows = db.project("ev", None).unwrap();
        assert_eq!(texts(&rows, "Make"), vec!["FORD", "KIA", "KIA", "TESLA", "TESLA"]);
        let chunks: Vec<u64> = db
            .store()
            .load_manifest("ev")
            .unwrap()
            .chunks
            .iter()
            .map(|c| c.rows)
            .collect();
        assert_eq!(chunks, vec![2, 2, 1]);
    }

    #[test]
    fn test_group_by_with_projection() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        let rows = db
            .group_by("ev", "Make", AggregateFn::Max, Some(vec!["Range".into()]))
            .unwrap();
        assert_eq!(texts(&rows, "Group"), vec!["FORD", "KIA", "TESLA"]);
        assert_eq!(rows[1].get("Range"), Some(&Value::number(250.0)));
        assert!(!rows[1].contains("Year"));
    }

    #[test]
    fn test_join_and_query_need_tables() {
        let dir = TempDir::new().unwrap();
        let db = seeded(&dir);
        assert!(db.join("ev", "missing", &JoinSpec::parse("Year")).is_err());
        assert!(db.query("missing", &QuerySpec::new()).is_err());
        assert_eq!(db.query("ev", &QuerySpec::new()).unwrap().len(), 5);
        assert_eq!(db.list_tables().unwrap(), vec!["ev".to_string()]);
    }
}
