//! External sort engine
//!
//! Two phases:
//! 1. Run generation: every source (a chunk, or a whole record stream) is cut
//!    into `run_size` slices, each stably sorted and spilled to a run file.
//!    Chunks are processed on the rayon pool when `parallel` is set.
//! 2. k-way merge over all runs in source order, in passes of at most
//!    `fan_in` runs.
//!
//! The result is a lazy `SortedStream`. `sort_table` feeds it to
//! `TableStore::rewrite_table`, which re-chunks the output by the partition
//! policy and commits it atomically.

mod groups;
mod key;
mod merge;
mod runs;

pub use groups::KeyGroups;
pub use key::{CompositeKey, KeyPart, SortKey, SortOrder, SortValue};
pub use merge::SortedStream;

use std::path::PathBuf;

use rayon::prelude::*;
use tempfile::TempDir;

use crate::config::Config;
use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::record::Record;
use crate::store::{TableManifest, TableStore};

/// Run sizing, merge fan-in and parallelism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    pub run_size: usize,
    pub fan_in: usize,
    pub parallel: bool,
}

impl SortOptions {
    pub fn new(run_size: usize, parallel: bool) -> Self {
        Self {
            run_size: run_size.max(1),
            fan_in: Config::default().merge_fan_in,
            parallel,
        }
    }

    pub fn with_fan_in(mut self, fan_in: usize) -> Self {
        self.fan_in = fan_in.max(2);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sort_run_size, config.parallel).with_fan_in(config.merge_fan_in)
    }
}

impl Default for SortOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn spill_dir() -> EngineResult<TempDir> {
    tempfile::Builder::new()
        .prefix("synthquery-sort-")
        .tempdir()
        .map_err(|e| EngineError::io_failure("Failed to create sort spill directory", e))
}

/// Sorts an arbitrary record stream
pub fn sort_stream<I>(records: I, order: &SortOrder, options: &SortOptions) -> EngineResult<SortedStream>
where
    I: IntoIterator<Item = EngineResult<Record>>,
{
    let spill = spill_dir()?;
    let runs = runs::generate_runs(records, order, options.run_size, spill.path(), 0)?;
    SortedStream::new(spill, runs, options.fan_in)
}

/// Sorts every chunk of a table into one merged stream.
///
/// Fails with `SchemaMismatch` up front when the table lacks a sort column.
pub fn sort_table_stream(
    store: &TableStore,
    manifest: &TableManifest,
    order: &SortOrder,
    options: &SortOptions,
) -> EngineResult<SortedStream> {
    if let Some(missing) = order.columns().find(|c| !manifest.has_column(c)) {
        return Err(EngineError::schema_mismatch(missing, "Table has no such sort column")
            .with_details(format!("table: {}, column: {}", manifest.table, missing)));
    }

    let spill = spill_dir()?;
    let dir = spill.path();
    let ids = manifest.chunk_ids();
    let chunk_runs = |(source, id): (usize, &crate::store::ChunkId)| -> EngineResult<Vec<PathBuf>> {
        let reader = store.read_chunk(manifest, *id)?;
        runs::generate_runs(reader, order, options.run_size, dir, source)
    };

    let per_chunk: Vec<EngineResult<Vec<PathBuf>>> = if options.parallel {
        ids.par_iter().enumerate().map(chunk_runs).collect()
    } else {
        ids.iter().enumerate().map(chunk_runs).collect()
    };

    let mut runs = Vec::new();
    for chunk in per_chunk {
        runs.extend(chunk?);
    }

    let run_count = runs.len().to_string();
    let chunks = ids.len().to_string();
    log_event_with_fields(
        Event::SortRunsWritten,
        &[
            ("table", manifest.table.as_str()),
            ("chunks", chunks.as_str()),
            ("runs", run_count.as_str()),
        ],
    );
    SortedStream::new(spill, runs, options.fan_in)
}

/// Re-orders a table on disk; returns the committed manifest
pub fn sort_table(
    store: &TableStore,
    table: &str,
    order: &SortOrder,
    options: &SortOptions,
) -> EngineResult<TableManifest> {
    let columns = order.describe();
    let scope = ObservationScope::with_fields("SORT", &[("table", table), ("columns", columns.as_str())]);
    let result = (|| -> EngineResult<TableManifest> {
        let mut manifest = store.load_manifest(table)?;
        let stream = sort_table_stream(store, &manifest, order, options)?;
        store.rewrite_table(&mut manifest, stream)?;
        Ok(manifest)
    })();

    match result {
        Ok(manifest) => {
            let rows = manifest.total_rows().to_string();
            let chunks = manifest.chunks.len().to_string();
            log_event_with_fields(
                Event::SortMerged,
                &[("table", table), ("rows", rows.as_str()), ("chunks", chunks.as_str())],
            );
            scope.complete_with_fields(&[("rows", rows.as_str())]);
            Ok(manifest)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::store::{PartitionPolicy, TableFormat};
    use tempfile::TempDir;

    fn rec(make: &str, range: &str) -> Record {
        Record::from_pairs([("Make", make), ("Range", range)])
    }

    fn makes(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.get("Make").unwrap().raw_text().into_owned())
            .collect()
    }

    fn sorted(records: Vec<Record>, key: &SortKey, run_size: usize) -> Vec<Record> {
        let order = SortOrder::from(key);
        sort_stream(records.into_iter().map(Ok), &order, &SortOptions::new(run_size, false))
            .unwrap()
            .collect::<EngineResult<_>>()
            .unwrap()
    }

    #[test]
    fn test_sort_stream_across_runs() {
        let input: Vec<Record> = ["e", "b", "d", "a", "c", "b"]
            .iter()
            .map(|m| rec(m, "0"))
            .collect();
        let out = sorted(input, &SortKey::ascending("Make"), 2);
        assert_eq!(makes(&out), vec!["a", "b", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_merge_is_stable_for_equal_keys() {
        let input: Vec<Record> = (0..9)
            .map(|i| rec(if i % 2 == 0 { "x" } else { "y" }, &i.to_string()))
            .collect();
        for ascending in [true, false] {
            let key = SortKey::new("Make", ascending, false);
            let out = sorted(input.clone(), &key, 2);
            let xs: Vec<String> = out
                .iter()
                .filter(|r| r.get("Make") == Some(&Value::from("x")))
                .map(|r| r.get("Range").unwrap().raw_text().into_owned())
                .collect();
            assert_eq!(xs, vec!["0", "2", "4", "6", "8"]);
        }
    }

    #[test]
    fn test_numeric_descending() {
        let input: Vec<Record> = ["9", "100", "25"].iter().map(|r| rec("m", r)).collect();
        let out = sorted(input, &SortKey::descending("Range").numeric(), 1);
        let ranges: Vec<_> = out
            .iter()
            .map(|r| r.get("Range").unwrap().raw_text().into_owned())
            .collect();
        assert_eq!(ranges, vec!["100", "25", "9"]);
    }

    #[test]
    fn test_multi_column_order() {
        let input = vec![rec("b", "2"), rec("a", "9"), rec("b", "10"), rec("a", "1")];
        let order = SortOrder::new(vec![
            SortKey::ascending("Make"),
            SortKey::descending("Range").numeric(),
        ])
        .unwrap();
        let out: Vec<Record> = sort_stream(input.into_iter().map(Ok), &order, &SortOptions::new(1, false))
            .unwrap()
            .collect::<EngineResult<_>>()
            .unwrap();
        assert_eq!(out, vec![rec("a", "9"), rec("a", "1"), rec("b", "10"), rec("b", "2")]);
    }

    #[test]
    fn test_small_fan_in_keeps_order() {
        let input: Vec<Record> = (0..30).map(|i| rec(&(i % 4).to_string(), &i.to_string())).collect();
        let order = SortOrder::from(SortKey::ascending("Make"));
        let wide: Vec<Record> = sort_stream(input.clone().into_iter().map(Ok), &order, &SortOptions::new(1, false))
            .unwrap()
            .collect::<EngineResult<_>>()
            .unwrap();
        let narrow: Vec<Record> = sort_stream(
            input.into_iter().map(Ok),
            &order,
            &SortOptions::new(1, false).with_fan_in(2),
        )
        .unwrap()
        .collect::<EngineResult<_>>()
        .unwrap();
        assert_eq!(narrow, wide);
    }

    #[test]
    fn test_sort_table_rechunks_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(dir.path(), PartitionPolicy::new(2, 0)).unwrap();
        let mut m = store
            .create_table("v", TableFormat::Delimited, vec!["Make".into(), "Range".into()])
            .unwrap();
        store.append_chunk(&mut m, &[rec("c", "1"), rec("a", "2"), rec("e", "3")]).unwrap();
        store.append_chunk(&mut m, &[rec("d", "4"), rec("b", "5")]).unwrap();
        store.commit_manifest(&m).unwrap();

        for parallel in [false, true] {
            let order = SortOrder::from(SortKey::new("Make", parallel, false));
            let m = sort_table(&store, "v", &order, &SortOptions::new(2, parallel)).unwrap();
            assert_eq!(m.chunks.iter().map(|c| c.rows).collect::<Vec<_>>(), vec![2, 2, 1]);
            let all: Vec<Record> = store.scan(&m).collect::<EngineResult<_>>().unwrap();
            let expected = if parallel {
                vec!["a", "b", "c", "d", "e"]
            } else {
                vec!["e", "d", "c", "b", "a"]
            };
            assert_eq!(makes(&all), expected);
        }
    }

    #[test]
    fn test_sort_table_missing_column_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(dir.path(), PartitionPolicy::new(2, 0)).unwrap();
        let mut m = store
            .create_table("v", TableFormat::Delimited, vec!["Make".into()])
            .unwrap();
        store.append_chunk(&mut m, &[Record::from_pairs([("Make", "a")])]).unwrap();
        store.commit_manifest(&m).unwrap();

        let order = SortOrder::from(SortKey::ascending("Year"));
        let err = sort_table(&store, "v", &order, &SortOptions::default()).unwrap_err();
        assert_eq!(err.code(), "SQ_SCHEMA_MISMATCH");
        assert_eq!(store.load_manifest("v").unwrap(), m);
    }

    #[test]
    fn test_sort_table_non_numeric_key_aborts() {
        let dir = TempDir::new().unwrap();
        let store = TableStore::open(dir.path(), PartitionPolicy::new(10, 0)).unwrap();
        let mut m = store
            .create_table("v", TableFormat::Delimited, vec!["Make".into(), "Range".into()])
            .unwrap();
        store.append_chunk(&mut m, &[rec("a", "12"), rec("b", "NA")]).unwrap();
        store.commit_manifest(&m).unwrap();

        let order = SortOrder::from(SortKey::ascending("Range").numeric());
        let err = sort_table(&store, "v", &order, &SortOptions::default()).unwrap_err();
        assert_eq!(err.code(), "SQ_TYPE_COERCION");
        assert_eq!(store.load_manifest("v").unwrap(), m);
    }
}
