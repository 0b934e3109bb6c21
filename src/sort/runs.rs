//! Run generation
//!
//! A source is cut into slices of `run_size` records. Each slice is stably
//! sorted in memory and spilled to a JSON-lines run file holding
//! `{"key": […], "record": …}` entries.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::key::{CompositeKey, SortOrder};
use crate::errors::{EngineError, EngineResult};
use crate::record::Record;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RunEntry {
    pub key: CompositeKey,
    pub record: Record,
}

/// Sorts a slice of keyed records in place; equal keys keep their order
pub(crate) fn sort_slice(entries: &mut [RunEntry]) {
    entries.sort_by(|a, b| a.key.cmp(&b.key));
}

/// Cuts `records` into sorted runs under `dir`, named `run_<source>_<n>.jsonl`.
///
/// Keys are extracted while reading, so a missing or non-numeric key fails
/// here, before anything downstream is written.
pub(crate) fn generate_runs<I>(
    records: I,
    order: &SortOrder,
    run_size: usize,
    dir: &Path,
    source: usize,
) -> EngineResult<Vec<PathBuf>>
where
    I: IntoIterator<Item = EngineResult<Record>>,
{
    let run_size = run_size.max(1);
    let mut runs = Vec::new();
    let mut slice: Vec<RunEntry> = Vec::with_capacity(run_size.min(4096));

    for record in records {
        let record = record?;
        let entry = RunEntry {
            key: order.extract(&record)?,
            record,
        };
        slice.push(entry);
        if slice.len() == run_size {
            runs.push(spill(&mut slice, dir, source, runs.len())?);
        }
    }
    if !slice.is_empty() {
        runs.push(spill(&mut slice, dir, source, runs.len())?);
    }
    Ok(runs)
}

fn spill(
    slice: &mut Vec<RunEntry>,
    dir: &Path,
    source: usize,
    index: usize,
) -> EngineResult<PathBuf> {
    sort_slice(slice);
    write_run(
        dir.join(format!("run_{:06}_{:06}.jsonl", source, index)),
        slice.drain(..).map(Ok),
    )
}

/// Writes already-ordered entries as one run file
pub(crate) fn write_run<I>(path: PathBuf, entries: I) -> EngineResult<PathBuf>
where
    I: IntoIterator<Item = EngineResult<RunEntry>>,
{
    let file = File::create(&path).map_err(|e| {
        EngineError::io_failure("Failed to create run file", e)
            .with_details(format!("path: {}", path.display()))
    })?;
    let mut out = BufWriter::new(file);
    for entry in entries {
        let entry = entry?;
        serde_json::to_writer(&mut out, &entry)
            .map_err(|e| EngineError::invalid_format_with("Failed to encode run entry", e))?;
        out.write_all(b"\n")
            .map_err(|e| EngineError::io_failure("Failed to write run file", e))?;
    }
    out.flush()
        .map_err(|e| EngineError::io_failure("Failed to flush run file", e))?;
    Ok(path)
}

/// Sequential reader over one run file
pub(crate) struct RunReader {
    entries: serde_json::StreamDeserializer<
        'static,
        serde_json::de::IoRead<BufReader<File>>,
        RunEntry,
    >,
}

impl RunReader {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| {
            EngineError::io_failure("Failed to open run file", e)
                .with_details(format!("path: {}", path.display()))
        })?;
        Ok(Self {
            entries: serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter(),
        })
    }
}

impl Iterator for RunReader {
    type Item = EngineResult<RunEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next().map(|entry| {
            entry.map_err(|e| EngineError::invalid_format_with("Corrupt run file", e))
        })
    }
}
