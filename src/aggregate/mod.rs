//! Group-by aggregation engine
//!
//! Three phases, map-reduce style:
//! 1. Partial: each chunk is folded into a `PartialAggregate` (on the rayon
//!    pool when `parallel` is set).
//! 2. Merge: partials are combined single-threaded, in chunk order.
//! 3. Finalize: buckets become sum / mean / min / max / count values.
//!
//! Sums are exact, so the result is identical for any chunking of the table.
//!
//! Without an aggregate function, `group_records` returns the grouped
//! records themselves.

mod accumulator;
mod function;
mod grouping;
mod partial;

pub use accumulator::{ColumnBucket, ExactSum};
pub use function::AggregateFn;
pub use grouping::{group_records, RecordGroup};
pub use partial::{GroupedAggregate, PartialAggregate, GROUP_COLUMN};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::record::Record;
use crate::store::{ChunkId, TableManifest, TableStore};

/// Aggregate function plus optional target columns (all columns when absent)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFn,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

impl AggregateSpec {
    pub fn new(function: AggregateFn) -> Self {
        Self {
            function,
            columns: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }
}

/// Aggregates a stored table chunk by chunk
pub fn group_by_table(
    store: &TableStore,
    manifest: &TableManifest,
    group_column: &str,
    spec: &AggregateSpec,
    parallel: bool,
) -> EngineResult<GroupedAggregate> {
    let scope = ObservationScope::with_fields(
        "GROUP_BY",
        &[
            ("table", manifest.table.as_str()),
            ("column", group_column),
            ("function", spec.function.name()),
        ],
    );
    let result = aggregate_chunks(store, manifest, group_column, spec, parallel);
    finish(scope, &manifest.table, result)
}

fn aggregate_chunks(
    store: &TableStore,
    manifest: &TableManifest,
    group_column: &str,
    spec: &AggregateSpec,
    parallel: bool,
) -> EngineResult<GroupedAggregate> {
    if !manifest.has_column(group_column) {
        return Err(EngineError::schema_mismatch(
            group_column,
            "Table has no such group-by column",
        ));
    }
    let targets = match &spec.columns {
        Some(columns) => {
            if let Some(missing) = columns.iter().find(|c| !manifest.has_column(c)) {
                return Err(EngineError::schema_mismatch(
                    missing,
                    "Table has no such aggregate column",
                ));
            }
            columns.clone()
        }
        None => manifest.columns.clone(),
    };

    let ids = manifest.chunk_ids();
    let partial_for = |id: &ChunkId| -> EngineResult<PartialAggregate> {
        let mut partial = PartialAggregate::new();
        for record in store.read_chunk(manifest, *id)? {
            partial.accumulate(&record?, group_column, &targets)?;
        }
        Ok(partial)
    };

    let partials: Vec<EngineResult<PartialAggregate>> = if parallel {
        ids.par_iter().map(partial_for).collect()
    } else {
        ids.iter().map(partial_for).collect()
    };

    let mut merged = PartialAggregate::new();
    for partial in partials {
        merged.merge(partial?);
    }
    Ok(merged.finalize(spec.function, targets))
}

/// Aggregates an in-memory record sequence (pipeline input)
pub fn group_by_records(
    records: &[Record],
    group_column: &str,
    spec: &AggregateSpec,
) -> EngineResult<GroupedAggregate> {
    let scope = ObservationScope::with_fields(
        "GROUP_BY",
        &[("column", group_column), ("function", spec.function.name())],
    );
    let result = (|| -> EngineResult<GroupedAggregate> {
        let targets = match &spec.columns {
            Some(columns) => columns.clone(),
            None => {
                let mut seen: Vec<String> = Vec::new();
                for record in records {
                    for column in record.columns() {
                        if !seen.iter().any(|s| s == column) {
                            seen.push(column.to_string());
                        }
                    }
                }
                seen
            }
        };
        let mut partial = PartialAggregate::new();
        for record in records {
            partial.accumulate(record, group_column, &targets)?;
        }
        Ok(partial.finalize(spec.function, targets))
    })();
    finish(scope, "", result)
}

fn finish(
    scope: ObservationScope<'_>,
    table: &str,
    result: EngineResult<GroupedAggregate>,
) -> EngineResult<GroupedAggregate> {
    match result {
        Ok(grouped) => {
            let skipped = grouped.skipped_values();
            if skipped > 0 {
                let skipped = skipped.to_string();
                log_event_with_fields(
                    Event::AggregateValuesSkipped,
                    &[("table", table), ("values", skipped.as_str())],
                );
            }
            let groups = grouped.group_count().to_string();
            scope.complete_with_fields(&[("groups", groups.as_str())]);
            Ok(grouped)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}
