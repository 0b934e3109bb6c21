//! Partial aggregation, merge and finalization

use std::collections::BTreeMap;

use super::accumulator::ColumnBucket;
use super::function::AggregateFn;
use crate::errors::EngineResult;
use crate::record::{try_coerce_number, Record, Value};

/// Column name of the group key in rendered rows
pub const GROUP_COLUMN: &str = "Group";

/// Buckets for one slice of input (typically one chunk).
///
/// Buckets are indexed by the position of their column in `targets`, which
/// is fixed for a whole aggregation so partials can be merged by position.
#[derive(Debug, Clone, Default)]
pub struct PartialAggregate {
    groups: BTreeMap<String, Vec<ColumnBucket>>,
}

impl PartialAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record. A missing group column is `SchemaMismatch`; a missing
    /// target cell is ignored; a non-numeric target cell is skipped.
    pub fn accumulate(
        &mut self,
        record: &Record,
        group_column: &str,
        targets: &[String],
    ) -> EngineResult<()> {
        let group = record
            .require(group_column, "Record is missing the group-by column")?
            .raw_text()
            .into_owned();
        let buckets = self
            .groups
            .entry(group)
            .or_insert_with(|| vec![ColumnBucket::default(); targets.len()]);

        for (bucket, column) in buckets.iter_mut().zip(targets) {
            if let Some(value) = record.get(column) {
                match try_coerce_number(value) {
                    Some(n) => bucket.accumulate(n),
                    None => bucket.skip(),
                }
            }
        }
        Ok(())
    }

    /// Folds another partial into this one
    pub fn merge(&mut self, other: PartialAggregate) {
        for (group, buckets) in other.groups {
            match self.groups.get_mut(&group) {
                Some(existing) => {
                    for (mine, theirs) in existing.iter_mut().zip(&buckets) {
                        mine.merge(theirs);
                    }
                }
                None => {
                    self.groups.insert(group, buckets);
                }
            }
        }
    }

    pub fn finalize(self, function: AggregateFn, targets: Vec<String>) -> GroupedAggregate {
        GroupedAggregate {
            function,
            targets,
            groups: self.groups,
        }
    }
}

/// Finalized group-by result, ordered by group key
#[derive(Debug, Clone)]
pub struct GroupedAggregate {
    function: AggregateFn,
    targets: Vec<String>,
    groups: BTreeMap<String, Vec<ColumnBucket>>,
}

impl GroupedAggregate {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Aggregated value for one (group, column), if the column has a result
    pub fn value(&self, group: &str, column: &str) -> Option<f64> {
        let idx = self.targets.iter().position(|t| t == column)?;
        let bucket = self.groups.get(group)?.get(idx)?;
        if bucket.has_result(self.function) {
            Some(bucket.finalize(self.function))
        } else {
            None
        }
    }

    /// Non-numeric cells left out of non-count aggregates
    pub fn skipped_values(&self) -> u64 {
        if self.function == AggregateFn::Count {
            return 0;
        }
        self.groups
            .values()
            .flat_map(|buckets| buckets.iter())
            .map(ColumnBucket::skipped_count)
            .sum()
    }

    /// Renders `{"Group": key, column: value, …}` rows.
    ///
    /// Columns with no numeric input are left out, except for `count`.
    pub fn into_rows(self) -> Vec<Record> {
        let function = self.function;
        self.groups
            .into_iter()
            .map(|(group, buckets)| {
                let mut row = Record::with_capacity(buckets.len() + 1);
                row.insert(GROUP_COLUMN, group);
                for (column, bucket) in self.targets.iter().zip(&buckets) {
                    if !bucket.has_result(function) {
                        continue;
                    }
                    let value = match function {
                        AggregateFn::Count => {
                            Value::integer(bucket.numeric_count() + bucket.skipped_count())
                        }
                        _ => Value::number(bucket.finalize(function)),
                    };
                    row.insert(column.clone(), value);
                }
                row
            })
            .collect()
    }
}
