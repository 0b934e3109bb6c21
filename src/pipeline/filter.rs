//! Filter stage

use rayon::prelude::*;

use crate::condition::{ConditionEvaluator, Conjunction, MatchOutcome};
use crate::errors::EngineResult;
use crate::observability::{log_event_with_fields, Event};
use crate::record::Record;
use crate::store::{ChunkId, TableManifest, TableStore};

/// Matching records plus the number dropped on coercion failure
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub records: Vec<Record>,
    pub coercion_skipped: u64,
}

impl FilterOutcome {
    fn absorb(&mut self, other: FilterOutcome) {
        self.records.extend(other.records);
        self.coercion_skipped += other.coercion_skipped;
    }

    /// Logs a warning when rows were dropped because they could not be compared
    pub fn report(&self, source: &str) {
        if self.coercion_skipped > 0 {
            let skipped = self.coercion_skipped.to_string();
            log_event_with_fields(
                Event::FilterCoercionSkipped,
                &[("source", source), ("rows", skipped.as_str())],
            );
        }
    }
}

/// Filters an in-memory record sequence, preserving order
pub fn filter_records<I>(
    records: I,
    conjunction: &Conjunction,
    evaluator: &ConditionEvaluator,
) -> EngineResult<FilterOutcome>
where
    I: IntoIterator<Item = EngineResult<Record>>,
{
    let mut outcome = FilterOutcome::default();
    for record in records {
        let record = record?;
        match evaluator.check(&record, conjunction)? {
            MatchOutcome::Matched => outcome.records.push(record),
            MatchOutcome::Rejected => {}
            MatchOutcome::CoercionFailed => outcome.coercion_skipped += 1,
        }
    }
    Ok(outcome)
}

/// Filters every chunk of a table; results keep chunk order
pub fn filter_table(
    store: &TableStore,
    manifest: &TableManifest,
    conjunction: &Conjunction,
    evaluator: &ConditionEvaluator,
    parallel: bool,
) -> EngineResult<FilterOutcome> {
    let ids = manifest.chunk_ids();
    let per_chunk = |id: &ChunkId| -> EngineResult<FilterOutcome> {
        filter_records(store.read_chunk(manifest, *id)?, conjunction, evaluator)
    };

    let chunks: Vec<EngineResult<FilterOutcome>> = if parallel {
        ids.par_iter().map(per_chunk).collect()
    } else {
        ids.iter().map(per_chunk).collect()
    };

    let mut outcome = FilterOutcome::default();
    for chunk in chunks {
        outcome.absorb(chunk?);
    }
    Ok(outcome)
}
