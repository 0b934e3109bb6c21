//! Re-chunking writer
//!
//! `ChunkBuilder` accepts a stream of records and cuts it into chunk files
//! according to the partition policy. A chunk's column set is the seed column
//! list followed by any further columns its records carry; missing cells are
//! back-filled with the unset marker.
//!
//! Files are written under fresh chunk ids and are not referenced by any
//! manifest until the caller commits one. `discard()` removes them again.

use std::fs;
use std::path::PathBuf;

use super::codec::{size_hint, ChunkWriter};
use super::format::TableFormat;
use super::manifest::{chunk_file_name, ChunkId, ChunkMeta};
use super::policy::PartitionPolicy;
use super::staging::StagedFile;
use crate::errors::EngineResult;
use crate::record::Record;

pub struct ChunkBuilder {
    dir: PathBuf,
    format: TableFormat,
    policy: PartitionPolicy,
    seed_columns: Vec<String>,
    next_chunk_id: u64,
    pending: Vec<Record>,
    pending_bytes: u64,
    written: Vec<ChunkMeta>,
}

impl ChunkBuilder {
    pub fn new(
        dir: PathBuf,
        format: TableFormat,
        policy: PartitionPolicy,
        seed_columns: Vec<String>,
        next_chunk_id: u64,
    ) -> Self {
        Self {
            dir,
            format,
            policy,
            seed_columns,
            next_chunk_id,
            pending: Vec::new(),
            pending_bytes: 0,
            written: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) -> EngineResult<()> {
        let hint = size_hint(&record, self.format);
        if self
            .policy
            .should_split(self.pending.len() as u64, self.pending_bytes, hint)
        {
            self.flush()?;
        }
        self.pending_bytes += hint;
        self.pending.push(record);
        Ok(())
    }

    fn flush(&mut self) -> EngineResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;

        let mut columns = self.seed_columns.clone();
        for record in &records {
            for column in record.columns() {
                if !columns.iter().any(|c| c == column) {
                    columns.push(column.to_string());
                }
            }
        }

        let id = ChunkId(self.next_chunk_id);
        self.next_chunk_id += 1;
        let file = chunk_file_name(id, self.format);
        let (rows, bytes) = write_chunk_file(
            &self.dir.join(&file),
            self.format,
            &columns,
            records.iter(),
        )?;
        self.written.push(ChunkMeta {
            id,
            file,
            rows,
            bytes,
            columns,
        });
        Ok(())
    }

    /// Writes the final partial chunk and returns every chunk written plus the
    /// next free chunk id
    pub fn finish(mut self) -> EngineResult<(Vec<ChunkMeta>, u64)> {
        if let Err(e) = self.flush() {
            self.discard();
            return Err(e);
        }
        Ok((std::mem::take(&mut self.written), self.next_chunk_id))
    }

    /// Deletes every chunk file written so far
    pub fn discard(&mut self) {
        for meta in self.written.drain(..) {
            let _ = fs::remove_file(self.dir.join(&meta.file));
        }
        self.pending.clear();
    }
}

/// Stages and commits one chunk file; returns `(rows, bytes)`
pub fn write_chunk_file<'r>(
    target: &std::path::Path,
    format: TableFormat,
    columns: &[String],
    records: impl Iterator<Item = &'r Record>,
) -> EngineResult<(u64, u64)> {
    let staged = StagedFile::begin(target)?;
    let mut writer = ChunkWriter::new(staged, format, columns)?;
    for record in records {
        writer.write(record)?;
    }
    let (staged, rows) = writer.finish()?;
    let bytes = staged.commit()?;
    Ok((rows, bytes))
}
