//! Partition policy
//!
//! Decides when the last chunk is full and a new one must be started.

use crate::config::Config;

/// Row and byte thresholds for a single chunk; zero disables a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPolicy {
    pub max_rows: u64,
    pub max_bytes: u64,
}

impl PartitionPolicy {
    pub fn new(max_rows: u64, max_bytes: u64) -> Self {
        Self {
            max_rows,
            max_bytes,
        }
    }

    /// A policy that never splits
    pub fn unbounded() -> Self {
        Self::new(0, 0)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_chunk_rows, config.max_chunk_bytes)
    }

    /// Whether a chunk of this size is over either threshold
    pub fn exceeds(&self, rows: u64, bytes: u64) -> bool {
        (self.max_rows > 0 && rows > self.max_rows) || (self.max_bytes > 0 && bytes > self.max_bytes)
    }

    /// Whether a non-empty chunk must be closed before taking one more record.
    ///
    /// An empty chunk always accepts the record, so a single oversized record
    /// still gets a chunk of its own.
    pub fn should_split(&self, rows: u64, bytes: u64, incoming_bytes: u64) -> bool {
        rows > 0 && self.exceeds(rows + 1, bytes + incoming_bytes)
    }
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
