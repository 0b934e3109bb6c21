//! Sort-merge equi-join
//!
//! Both inputs are sorted by their join columns over the whole logical table
//! (every chunk feeds the same merge), so matching rows that sit in different
//! chunks still meet. Adjacent equal keys are grouped and each matching pair
//! of groups emits its full cross product.
//!
//! Keys compare by raw text. When both sides carry a column of the same name,
//! the right value overwrites the left one in place.
//!
//! A spec without columns is a natural join on every column the two tables
//! share.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::record::Record;
use crate::sort::{sort_table_stream, KeyGroups, SortKey, SortOptions, SortOrder};
use crate::store::{TableManifest, TableStore};

/// Equality join columns, paired by position
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
}

impl JoinSpec {
    pub fn new(left_column: impl Into<String>, right_column: impl Into<String>) -> Self {
        Self {
            left_columns: vec![left_column.into()],
            right_columns: vec![right_column.into()],
        }
    }

    /// Joins on every column both tables share
    pub fn natural() -> Self {
        Self::default()
    }

    /// Joins on several `(left, right)` column pairs
    pub fn on<I, L, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let (left_columns, right_columns) = pairs
            .into_iter()
            .map(|(l, r)| (l.into(), r.into()))
            .unzip();
        Self {
            left_columns,
            right_columns,
        }
    }

    /// Parses `"left,right"`; a single name joins on the same column and an
    /// empty string is a natural join
    pub fn parse(columns: &str) -> Self {
        let columns = columns.trim();
        if columns.is_empty() {
            return Self::natural();
        }
        match columns.split_once(',') {
            Some((l, r)) => Self::new(l.trim(), r.trim()),
            None => Self::new(columns, columns),
        }
    }

    pub fn is_natural(&self) -> bool {
        self.left_columns.is_empty() && self.right_columns.is_empty()
    }

    /// Concrete column pairs for two tables. A natural join takes the shared
    /// columns in left-table order and fails when there are none.
    pub fn resolve(&self, left: &TableManifest, right: &TableManifest) -> EngineResult<JoinSpec> {
        if self.left_columns.len() != self.right_columns.len() {
            return Err(EngineError::invalid_format("Join column lists differ in length")
                .with_details(format!(
                    "left: {:?}, right: {:?}",
                    self.left_columns, self.right_columns
                )));
        }
        if !self.is_natural() {
            return Ok(self.clone());
        }
        let shared: Vec<String> = left
            .columns
            .iter()
            .filter(|c| right.has_column(c))
            .cloned()
            .collect();
        if shared.is_empty() {
            return Err(EngineError::invalid_format("Tables share no columns to join on")
                .with_details(format!("left: {}, right: {}", left.table, right.table)));
        }
        Ok(Self {
            left_columns: shared.clone(),
            right_columns: shared,
        })
    }

    fn describe(columns: &[String]) -> String {
        columns.join(",")
    }
}

fn text_order(columns: &[String]) -> EngineResult<SortOrder> {
    SortOrder::new(columns.iter().map(SortKey::ascending).collect())
}

/// Inner-joins two tables; output is ordered by key, then left order, then
/// right order
pub fn join_tables(
    store: &TableStore,
    left: &TableManifest,
    right: &TableManifest,
    spec: &JoinSpec,
    options: &SortOptions,
) -> EngineResult<Vec<Record>> {
    let spec = spec.resolve(left, right)?;
    let left_columns = JoinSpec::describe(&spec.left_columns);
    let right_columns = JoinSpec::describe(&spec.right_columns);
    let scope = ObservationScope::with_fields(
        "JOIN",
        &[
            ("left", left.table.as_str()),
            ("right", right.table.as_str()),
            ("left_columns", left_columns.as_str()),
            ("right_columns", right_columns.as_str()),
        ],
    );

    let result = (|| -> EngineResult<Vec<Record>> {
        let left_sorted =
            sort_table_stream(store, left, &text_order(&spec.left_columns)?, options)?;
        let right_sorted =
            sort_table_stream(store, right, &text_order(&spec.right_columns)?, options)?;
        merge_join(
            KeyGroups::new(left_sorted, &spec.left_columns),
            KeyGroups::new(right_sorted, &spec.right_columns),
        )
    })();

    match result {
        Ok(records) => {
            let rows = records.len().to_string();
            log_event_with_fields(
                Event::JoinCompleted,
                &[
                    ("left", left.table.as_str()),
                    ("right", right.table.as_str()),
                    ("rows", rows.as_str()),
                ],
            );
            scope.complete_with_fields(&[("rows", rows.as_str())]);
            Ok(records)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}

fn merge_join(mut left: KeyGroups, mut right: KeyGroups) -> EngineResult<Vec<Record>> {
    let mut out = Vec::new();
    let mut left_group = left.next_group()?;
    let mut right_group = right.next_group()?;

    loop {
        let ordering = match (&left_group, &right_group) {
            (Some((lk, _)), Some((rk, _))) => lk.cmp(rk),
            _ => break,
        };
        match ordering {
            Ordering::Less => left_group = left.next_group()?,
            Ordering::Greater => right_group = right.next_group()?,
            Ordering::Equal => {
                if let (Some((_, lrows)), Some((_, rrows))) = (&left_group, &right_group) {
                    out.reserve(lrows.len() * rrows.len());
                    for l in lrows {
                        for r in rrows {
                            let mut merged = l.clone();
                            merged.merge_from(r);
                            out.push(merged);
                        }
                    }
                }
                left_group = left.next_group()?;
                right_group = right.next_group()?;
            }
        }
    }
    Ok(out)
}
