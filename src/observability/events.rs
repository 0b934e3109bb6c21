//! Typed engine events

use std::fmt;

/// Observable events emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Table store
    TableCreated,
    TableAdopted,
    ManifestCommitted,
    ChunkAppended,
    ChunkReplaced,
    ChunksRetired,
    StagingDiscarded,

    // Mutations
    RowInserted,
    RowsDeleted,
    RowsUpdated,

    // Operators
    FilterCoercionSkipped,
    SortRunsWritten,
    SortMergePass,
    SortMerged,
    AggregateValuesSkipped,
    RecordsGrouped,
    JoinCompleted,

    // Pipeline
    QueryExecuted,
    QueryRejected,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TableCreated => "TABLE_CREATED",
            Event::TableAdopted => "TABLE_ADOPTED",
            Event::ManifestCommitted => "MANIFEST_COMMITTED",
            Event::ChunkAppended => "CHUNK_APPENDED",
            Event::ChunkReplaced => "CHUNK_REPLACED",
            Event::ChunksRetired => "CHUNKS_RETIRED",
            Event::StagingDiscarded => "STAGING_DISCARDED",
            Event::RowInserted => "ROW_INSERTED",
            Event::RowsDeleted => "ROWS_DELETED",
            Event::RowsUpdated => "ROWS_UPDATED",
            Event::FilterCoercionSkipped => "FILTER_COERCION_SKIPPED",
            Event::SortRunsWritten => "SORT_RUNS_WRITTEN",
            Event::SortMergePass => "SORT_MERGE_PASS",
            Event::SortMerged => "SORT_MERGED",
            Event::AggregateValuesSkipped => "AGGREGATE_VALUES_SKIPPED",
            Event::RecordsGrouped => "RECORDS_GROUPED",
            Event::JoinCompleted => "JOIN_COMPLETED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
        }
    }

    /// Events that signal data was left out of a result
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::FilterCoercionSkipped
                | Event::AggregateValuesSkipped
                | Event::StagingDiscarded
                | Event::QueryRejected
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
