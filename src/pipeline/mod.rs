//! Query pipeline
//!
//! Fixed stage order, every stage optional:
//!
//! ```text
//! Filter(where) → GroupBy+Aggregate → Filter(having) → OrderBy → Project
//! ```
//!
//! Each stage materializes its output and hands it to the next. `having`
//! only runs when both a group column and an aggregate are given. The first
//! failing stage aborts the query; no partial result is returned.

mod filter;
mod spec;

pub use filter::{filter_records, filter_table, FilterOutcome};
pub use spec::{parse_ascending, parse_columns, QuerySpec};

use crate::aggregate::{group_by_records, AggregateSpec};
use crate::condition::ConditionEvaluator;
use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::record::Record;
use crate::sort::{sort_stream, SortOptions};
use crate::store::{TableManifest, TableStore};

/// Executes `QuerySpec`s against stored tables
#[derive(Debug, Clone, Default)]
pub struct QueryPipeline {
    evaluator: ConditionEvaluator,
    sort_options: SortOptions,
}

impl QueryPipeline {
    pub fn new(evaluator: ConditionEvaluator, sort_options: SortOptions) -> Self {
        Self {
            evaluator,
            sort_options,
        }
    }

    pub fn execute(
        &self,
        store: &TableStore,
        manifest: &TableManifest,
        spec: &QuerySpec,
    ) -> EngineResult<Vec<Record>> {
        let table = manifest.table.as_str();
        match self.run_stages(store, manifest, spec) {
            Ok(records) => {
                let rows = records.len().to_string();
                log_event_with_fields(
                    Event::QueryExecuted,
                    &[("table", table), ("rows", rows.as_str())],
                );
                Ok(records)
            }
            Err(e) => {
                log_event_with_fields(
                    Event::QueryRejected,
                    &[("table", table), ("code", e.code()), ("reason", e.message())],
                );
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        store: &TableStore,
        manifest: &TableManifest,
        spec: &QuerySpec,
    ) -> EngineResult<Vec<Record>> {
        let table = manifest.table.as_str();
        let parallel = self.sort_options.parallel;

        let mut data = stage("QUERY_FILTER", table, || {
            let outcome = match &spec.filter {
                Some(conjunction) => {
                    filter_table(store, manifest, conjunction, &self.evaluator, parallel)?
                }
                None => FilterOutcome {
                    records: store.scan(manifest).collect::<EngineResult<_>>()?,
                    coercion_skipped: 0,
                },
            };
            outcome.report(table);
            Ok(outcome.records)
        })?;

        if let Some((group_column, function)) = spec.grouping() {
            data = stage("QUERY_GROUP", table, || {
                Ok(group_by_records(&data, group_column, &AggregateSpec::new(function))?
                    .into_rows())
            })?;

            if let Some(having) = &spec.having {
                data = stage("QUERY_HAVING", table, || {
                    let outcome = filter_records(data.drain(..).map(Ok), having, &self.evaluator)?;
                    outcome.report(table);
                    Ok(outcome.records)
                })?;
            }
        }

        if let Some(order) = &spec.order {
            data = stage("QUERY_ORDER", table, || {
                sort_stream(data.drain(..).map(Ok), order, &self.sort_options)?.collect()
            })?;
        }

        if let Some(columns) = &spec.project {
            data = stage("QUERY_PROJECT", table, || project_records(&data, columns))?;
        }

        Ok(data)
    }
}

/// Runs one stage inside an observation scope
fn stage<F>(name: &'static str, table: &str, run: F) -> EngineResult<Vec<Record>>
where
    F: FnOnce() -> EngineResult<Vec<Record>>,
{
    let scope = ObservationScope::with_fields(name, &[("table", table)]);
    match run() {
        Ok(records) => {
            let rows = records.len().to_string();
            scope.complete_with_fields(&[("rows", rows.as_str())]);
            Ok(records)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}

/// Projects materialized rows. A column present in none of the rows is a
/// `SchemaMismatch`; a column missing from only some rows is left out of
/// those rows.
pub fn project_records(records: &[Record], columns: &[String]) -> EngineResult<Vec<Record>> {
    if !records.is_empty() {
        if let Some(missing) = columns
            .iter()
            .find(|c| !records.iter().any(|r| r.contains(c)))
        {
            return Err(EngineError::schema_mismatch(
                missing,
                "Projected column is absent from every row",
            ));
        }
    }
    Ok(records.iter().map(|r| r.project(columns)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFn;
    use crate::condition::{Condition, Conjunction};
    use crate::record::Value;
    use crate::sort::SortKey;
    use crate::store::{PartitionPolicy, TableFormat};
    use tempfile::TempDir;

    fn vehicles(dir: &TempDir) -> (TableStore, TableManifest) {
        let store = TableStore::open(dir.path(), PartitionPolicy::new(1, 0)).unwrap();
        let mut m = store
            .create_table(
                "vehicles",
                TableFormat::Delimited,
                vec!["Make".into(), "Year".into()],
            )
            .unwrap();
        for (make, year) in [("TESLA", "2020"), ("FORD", "2019"), ("TESLA", "2021")] {
            store
                .append_chunk(&mut m, &[Record::from_pairs([("Make", make), ("Year", year)])])
                .unwrap();
        }
        store.commit_manifest(&m).unwrap();
        (store, m)
    }

    fn column(records: &[Record], name: &str) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get(name).unwrap().raw_text().into_owned())
            .collect()
    }

    #[test]
    fn test_filter_order_project() {
        let dir = TempDir::new().unwrap();
        let (store, m) = vehicles(&dir);
        let spec = QuerySpec::new()
            .filter(Conjunction::new(vec![Condition::eq("Make", "TESLA")]))
            .order(SortKey::descending("Year"))
            .project(vec!["Year".into()]);

        let out = QueryPipeline::default().execute(&store, &m, &spec).unwrap();
        assert_eq!(column(&out, "Year"), vec!["2021", "2020"]);
        assert_eq!(out[0].len(), 1);
    }

    #[test]
    fn test_group_having_order() {
        let dir = TempDir::new().unwrap();
        let (store, m) = vehicles(&dir);
        let spec = QuerySpec::new()
            .group_by("Make", AggregateFn::Count)
            .having(Conjunction::new(vec![Condition::gt("Year", Value::integer(1))]))
            .order(SortKey::ascending("Group"));

        let out = QueryPipeline::default().execute(&store, &m, &spec).unwrap();
        assert_eq!(column(&out, "Group"), vec!["TESLA"]);
        assert_eq!(out[0].get("Year"), Some(&Value::integer(2)));
    }

    #[test]
    fn test_having_ignored_without_grouping() {
        let dir = TempDir::new().unwrap();
        let (store, m) = vehicles(&dir);
        let spec = QuerySpec::new().having(Conjunction::new(vec![Condition::eq("Make", "nobody")]));
        let out = QueryPipeline::default().execute(&store, &m, &spec).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_stage_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let (store, m) = vehicles(&dir);
        let spec = QuerySpec::new().order(SortKey::ascending("Color"));
        let err = QueryPipeline::default().execute(&store, &m, &spec).unwrap_err();
        assert_eq!(err.code(), "SQ_SCHEMA_MISMATCH");

        let spec = QuerySpec::new().project(vec!["Color".into()]);
        assert!(QueryPipeline::default().execute(&store, &m, &spec).is_err());
    }

    #[test]
    fn test_projection_is_idempotent() {
        let rows = vec![Record::from_pairs([("a", "1"), ("b", "2"), ("c", "3")])];
        let cols = vec!["c".to_string(), "a".to_string()];
        let once = project_records(&rows, &cols).unwrap();
        let twice = project_records(&once, &cols).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once[0].columns().collect::<Vec<_>>(), vec!["c", "a"]);
    }
}
