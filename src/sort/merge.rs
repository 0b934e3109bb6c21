//! k-way merge of sorted runs
//!
//! One cursor per run sits in a `BinaryHeap` keyed by the composite key, with
//! ties broken by run index so equal keys come out in source order.
//!
//! At most `fan_in` runs are open at once. With more runs than that, adjacent
//! groups of `fan_in` runs are merged into intermediate run files first, pass
//! after pass, until one final merge remains. Grouping adjacent runs keeps
//! the tie order intact across passes.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::key::CompositeKey;
use super::runs::{write_run, RunEntry, RunReader};
use crate::errors::EngineResult;
use crate::observability::{log_event_with_fields, Event};
use crate::record::Record;

struct H {
    key: CompositeKey,
    run: usize,
    record: Record,
}

impl PartialEq for H {
    fn eq(&self, o: &Self) -> bool {
        self.cmp(o) == Ordering::Equal
    }
}

impl Eq for H {}

impl PartialOrd for H {
    fn partial_cmp(&self, o: &Self) -> Option<Ordering> {
        Some(self.cmp(o))
    }
}

// BinaryHeap pops the greatest item: invert the key, and let the lower run
// index win ties.
impl Ord for H {
    fn cmp(&self, o: &Self) -> Ordering {
        o.key.cmp(&self.key).then_with(|| o.run.cmp(&self.run))
    }
}

/// Heap merge over a set of open runs
struct RunMerger {
    heap: BinaryHeap<H>,
    readers: Vec<RunReader>,
    failed: bool,
}

impl RunMerger {
    fn open(runs: &[PathBuf]) -> EngineResult<Self> {
        let mut readers = Vec::with_capacity(runs.len());
        for path in runs {
            readers.push(RunReader::open(path)?);
        }
        let mut merger = Self {
            heap: BinaryHeap::with_capacity(readers.len()),
            readers,
            failed: false,
        };
        for run in 0..merger.readers.len() {
            merger.advance(run)?;
        }
        Ok(merger)
    }

    fn advance(&mut self, run: usize) -> EngineResult<()> {
        if let Some(entry) = self.readers[run].next() {
            let RunEntry { key, record } = entry?;
            self.heap.push(H { key, run, record });
        }
        Ok(())
    }
}

impl Iterator for RunMerger {
    type Item = EngineResult<RunEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let top = self.heap.pop()?;
        if let Err(e) = self.advance(top.run) {
            self.failed = true;
            return Some(Err(e));
        }
        Some(Ok(RunEntry {
            key: top.key,
            record: top.record,
        }))
    }
}

/// Merges adjacent groups of `fan_in` runs until at most `fan_in` remain.
/// Consumed run files are removed as each group finishes.
fn reduce_runs(dir: &Path, mut runs: Vec<PathBuf>, fan_in: usize) -> EngineResult<Vec<PathBuf>> {
    let fan_in = fan_in.max(2);
    let mut pass = 0usize;
    while runs.len() > fan_in {
        let mut next = Vec::with_capacity(runs.len() / fan_in + 1);
        for (index, group) in runs.chunks(fan_in).enumerate() {
            if group.len() == 1 {
                next.push(group[0].clone());
                continue;
            }
            let path = dir.join(format!("merge_{:03}_{:06}.jsonl", pass, index));
            next.push(write_run(path, RunMerger::open(group)?)?);
            for consumed in group {
                let _ = fs::remove_file(consumed);
            }
        }

        let before = runs.len().to_string();
        let after = next.len().to_string();
        let pass_label = pass.to_string();
        log_event_with_fields(
            Event::SortMergePass,
            &[
                ("pass", pass_label.as_str()),
                ("runs_in", before.as_str()),
                ("runs_out", after.as_str()),
            ],
        );
        runs = next;
        pass += 1;
    }
    Ok(runs)
}

/// Lazily merged, sorted record stream.
///
/// Owns the spill directory; run files are removed when the stream is dropped.
pub struct SortedStream {
    merger: RunMerger,
    _spill: TempDir,
}

impl SortedStream {
    pub(crate) fn new(spill: TempDir, runs: Vec<PathBuf>, fan_in: usize) -> EngineResult<Self> {
        let runs = reduce_runs(spill.path(), runs, fan_in)?;
        Ok(Self {
            merger: RunMerger::open(&runs)?,
            _spill: spill,
        })
    }

    #[cfg(test)]
    fn open_runs(&self) -> usize {
        self.merger.readers.len()
    }
}

impl Iterator for SortedStream {
    type Item = EngineResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.merger.next().map(|entry| entry.map(|e| e.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::runs::generate_runs;
    use crate::sort::{SortKey, SortOrder};

    fn numbered(n: usize) -> Vec<EngineResult<Record>> {
        (0..n)
            .map(|i| {
                Ok(Record::from_pairs([
                    ("k", ((i * 7) % 5).to_string()),
                    ("seq", i.to_string()),
                ]))
            })
            .collect()
    }

    fn spill_dir() -> TempDir {
        tempfile::Builder::new().prefix("merge-test-").tempdir().unwrap()
    }

    #[test]
    fn test_fan_in_bounds_open_runs() {
        let spill = spill_dir();
        let order = SortOrder::from(SortKey::ascending("k"));
        let runs = generate_runs(numbered(40), &order, 1, spill.path(), 0).unwrap();
        assert_eq!(runs.len(), 40);

        let stream = SortedStream::new(spill, runs, 3).unwrap();
        assert!(stream.open_runs() <= 3);
    }

    #[test]
    fn test_multi_pass_matches_single_pass() {
        let order = SortOrder::from(SortKey::ascending("k"));
        let collect = |fan_in: usize| -> Vec<String> {
            let spill = spill_dir();
            let runs = generate_runs(numbered(40), &order, 2, spill.path(), 0).unwrap();
            SortedStream::new(spill, runs, fan_in)
                .unwrap()
                .map(|r| r.unwrap().get("seq").unwrap().raw_text().into_owned())
                .collect()
        };
        let wide = collect(64);
        assert_eq!(wide.len(), 40);
        assert_eq!(collect(2), wide);
        assert_eq!(collect(3), wide);
    }

    #[test]
    fn test_consumed_runs_are_removed() {
        let spill = spill_dir();
        let order = SortOrder::from(SortKey::ascending("k"));
        let runs = generate_runs(numbered(9), &order, 1, spill.path(), 0).unwrap();
        let reduced = reduce_runs(spill.path(), runs, 3).unwrap();
        assert_eq!(reduced.len(), 3);
        assert_eq!(fs::read_dir(spill.path()).unwrap().count(), 3);
    }
}
