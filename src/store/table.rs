//! Chunked table store
//!
//! Layout of a database directory:
//!
//! ```text
//! <db>/
//!   <table>/
//!     manifest.json
//!     chunk_000000.csv
//!     chunk_000001.csv
//!   <legacy>.csv        (single-file table awaiting adoption)
//! ```
//!
//! Chunk files are only ever replaced through a staging file and a rename.
//! Mutating methods update the in-memory manifest; callers persist it with
//! `commit_manifest` once every chunk write has succeeded.
//!
//! Readers see every table column: a chunk written before a column was
//! introduced yields the unset marker for it.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use super::builder::{write_chunk_file, ChunkBuilder};
use super::codec::ChunkReader;
use super::format::TableFormat;
use super::manifest::{ChunkId, ChunkMeta, TableManifest, MANIFEST_FILE};
use super::policy::PartitionPolicy;
use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::record::{try_coerce_number, Record};

/// Handle on a database directory
#[derive(Debug, Clone)]
pub struct TableStore {
    root: PathBuf,
    policy: PartitionPolicy,
}

impl TableStore {
    /// Opens an existing database directory
    pub fn open(root: impl Into<PathBuf>, policy: PartitionPolicy) -> EngineResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(EngineError::not_found("Database does not exist.")
                .with_details(format!("path: {}", root.display())));
        }
        Ok(Self { root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> PartitionPolicy {
        self.policy
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn manifest_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(MANIFEST_FILE)
    }

    pub fn table_exists(&self, table: &str) -> bool {
        validate_table_name(table).is_ok() && self.manifest_path(table).is_file()
    }

    /// Names of every table with a manifest, sorted
    pub fn list_tables(&self) -> EngineResult<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| EngineError::io_failure("Failed to list database directory", e))?;
        let mut tables = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| EngineError::io_failure("Failed to list database directory", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.table_exists(&name) {
                tables.push(name);
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Creates an empty table
    pub fn create_table(
        &self,
        table: &str,
        format: TableFormat,
        columns: Vec<String>,
    ) -> EngineResult<TableManifest> {
        validate_table_name(table)?;
        if self.table_exists(table) {
            return Err(EngineError::invalid_format("Table already exists")
                .with_details(format!("table: {}", table)));
        }
        let mut seen: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if seen.contains(&column) {
                return Err(EngineError::invalid_format("Duplicate column name")
                    .with_details(format!("column: {}", column)));
            }
            seen.push(column);
        }

        fs::create_dir_all(self.table_dir(table)).map_err(|e| {
            EngineError::io_failure("Failed to create table directory", e)
                .with_details(format!("table: {}", table))
        })?;
        let manifest = TableManifest::new(table, format, seen);
        self.commit_manifest(&manifest)?;

        let format_name = format.to_string();
        log_event_with_fields(
            Event::TableCreated,
            &[("table", table), ("format", format_name.as_str())],
        );
        Ok(manifest)
    }

    /// Loads and verifies a table manifest
    pub fn load_manifest(&self, table: &str) -> EngineResult<TableManifest> {
        if !self.table_exists(table) {
            return Err(EngineError::table_not_found(table));
        }
        TableManifest::read_from_file(&self.manifest_path(table))
    }

    /// Persists the manifest by stage and rename
    pub fn commit_manifest(&self, manifest: &TableManifest) -> EngineResult<()> {
        manifest.write_to_file(&self.manifest_path(&manifest.table))?;
        let chunks = manifest.chunks.len().to_string();
        Logger::trace(
            Event::ManifestCommitted.as_str(),
            &[("table", manifest.table.as_str()), ("chunks", chunks.as_str())],
        );
        Ok(())
    }

    /// Chunk ids in manifest order
    pub fn list_chunks(&self, table: &str) -> EngineResult<Vec<ChunkId>> {
        Ok(self.load_manifest(table)?.chunk_ids())
    }

    fn chunk_meta<'m>(&self, manifest: &'m TableManifest, id: ChunkId) -> EngineResult<&'m ChunkMeta> {
        manifest.chunk(id).ok_or_else(|| {
            EngineError::not_found("Chunk does not exist")
                .with_details(format!("table: {}, chunk: {}", manifest.table, id))
        })
    }

    /// Opens a lazy reader over one chunk; call again to restart
    pub fn read_chunk(&self, manifest: &TableManifest, id: ChunkId) -> EngineResult<ChunkReader> {
        let meta = self.chunk_meta(manifest, id)?;
        Ok(ChunkReader::open(
            &self.table_dir(&manifest.table).join(&meta.file),
            manifest.format,
        )?
        .with_backfill(unseen_columns(manifest, meta)))
    }

    /// Lazy reader over every chunk of a table in manifest order
    pub fn scan(&self, manifest: &TableManifest) -> TableScan {
        let dir = self.table_dir(&manifest.table);
        TableScan {
            format: manifest.format,
            pending: manifest
                .chunks
                .iter()
                .map(|c| (dir.join(&c.file), unseen_columns(manifest, c)))
                .collect(),
            current: None,
        }
    }

    /// Rewrites one chunk with `records`.
    ///
    /// The chunk keeps its columns plus any new ones the records carry; absent
    /// cells are back-filled. On failure the original file is untouched.
    pub fn replace_chunk(
        &self,
        manifest: &mut TableManifest,
        id: ChunkId,
        records: &[Record],
    ) -> EngineResult<()> {
        let meta = self.chunk_meta(manifest, id)?;
        let file = meta.file.clone();
        let mut columns = meta.columns.clone();
        extend_with_record_columns(&mut columns, records);

        let target = self.table_dir(&manifest.table).join(&file);
        let (rows, bytes) = write_chunk_file(&target, manifest.format, &columns, records.iter())?;

        manifest.extend_columns(columns.iter().map(String::as_str));
        if let Some(meta) = manifest.chunk_mut(id) {
            meta.rows = rows;
            meta.bytes = bytes;
            meta.columns = columns;
        }

        let chunk = id.to_string();
        let rows = rows.to_string();
        log_event_with_fields(
            Event::ChunkReplaced,
            &[
                ("table", manifest.table.as_str()),
                ("chunk", chunk.as_str()),
                ("rows", rows.as_str()),
            ],
        );
        Ok(())
    }

    /// Creates a new chunk at the end of the table
    pub fn append_chunk(
        &self,
        manifest: &mut TableManifest,
        records: &[Record],
    ) -> EngineResult<ChunkId> {
        let mut columns = manifest.columns.clone();
        extend_with_record_columns(&mut columns, records);

        let (id, file) = manifest.allocate_chunk();
        let target = self.table_dir(&manifest.table).join(&file);
        let (rows, bytes) = write_chunk_file(&target, manifest.format, &columns, records.iter())?;

        manifest.extend_columns(columns.iter().map(String::as_str));
        manifest.chunks.push(ChunkMeta {
            id,
            file,
            rows,
            bytes,
            columns,
        });

        let chunk = id.to_string();
        log_event_with_fields(
            Event::ChunkAppended,
            &[("table", manifest.table.as_str()), ("chunk", chunk.as_str())],
        );
        Ok(id)
    }

    /// Replaces the whole table with `records`, re-chunked by the policy.
    ///
    /// New chunk files get fresh ids, the manifest is committed, and only
    /// then are the old files removed. Any failure before the commit deletes
    /// the new files and leaves the table as it was.
    pub fn rewrite_table<I>(&self, manifest: &mut TableManifest, records: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = EngineResult<Record>>,
    {
        let dir = self.table_dir(&manifest.table);
        let mut builder = ChunkBuilder::new(
            dir.clone(),
            manifest.format,
            self.policy,
            manifest.columns.clone(),
            manifest.next_chunk_id,
        );
        for record in records {
            let pushed = record.and_then(|r| builder.push(r));
            if let Err(e) = pushed {
                builder.discard();
                return Err(e);
            }
        }
        let (new_chunks, next_chunk_id) = builder.finish()?;

        let mut next = manifest.clone();
        next.chunks = new_chunks;
        next.next_chunk_id = next_chunk_id;
        for chunk in &next.chunks {
            let cols: Vec<&str> = chunk.columns.iter().map(String::as_str).collect();
            for c in cols {
                if !next.columns.iter().any(|k| k == c) {
                    next.columns.push(c.to_string());
                }
            }
        }

        if let Err(e) = self.commit_manifest(&next) {
            for chunk in &next.chunks {
                let _ = fs::remove_file(dir.join(&chunk.file));
            }
            return Err(e);
        }

        let retired = std::mem::replace(manifest, next).chunks;
        let mut removed = 0usize;
        for chunk in &retired {
            if fs::remove_file(dir.join(&chunk.file)).is_ok() {
                removed += 1;
            }
        }
        let removed = removed.to_string();
        log_event_with_fields(
            Event::ChunksRetired,
            &[("table", manifest.table.as_str()), ("chunks", removed.as_str())],
        );
        Ok(())
    }

    /// Splits a legacy single-file table (`<db>/<table>.csv` or
    /// `<db>/<table>.json`) into chunks. The legacy file is left in place.
    pub fn adopt_legacy_table(&self, table: &str) -> EngineResult<TableManifest> {
        validate_table_name(table)?;
        if self.table_exists(table) {
            return Err(EngineError::invalid_format("Table already exists")
                .with_details(format!("table: {}", table)));
        }
        let legacy = ["csv", "json"]
            .into_iter()
            .map(|ext| self.root.join(format!("{}.{}", table, ext)))
            .filter(|path| path.is_file())
            .find_map(|path| TableFormat::from_path(&path).map(|f| (f, path)));
        let (format, legacy_path) = match legacy {
            Some(found) => found,
            None => return Err(EngineError::table_not_found(table)),
        };

        let dir = self.table_dir(table);
        let created_dir = !dir.exists();
        fs::create_dir_all(&dir).map_err(|e| {
            EngineError::io_failure("Failed to create table directory", e)
                .with_details(format!("table: {}", table))
        })?;

        let result = self.split_legacy(table, format, &legacy_path, &dir);
        if result.is_err() && created_dir {
            let _ = fs::remove_dir_all(&dir);
        }
        let manifest = result?;

        let chunks = manifest.chunks.len().to_string();
        let rows = manifest.total_rows().to_string();
        log_event_with_fields(
            Event::TableAdopted,
            &[
                ("table", table),
                ("chunks", chunks.as_str()),
                ("rows", rows.as_str()),
            ],
        );
        Ok(manifest)
    }

    fn split_legacy(
        &self,
        table: &str,
        format: TableFormat,
        legacy_path: &Path,
        dir: &Path,
    ) -> EngineResult<TableManifest> {
        let mut manifest = TableManifest::new(table, format, Vec::new());
        let mut builder =
            ChunkBuilder::new(dir.to_path_buf(), format, self.policy, Vec::new(), 0);
        let mut max_id: u64 = 0;

        let reader = ChunkReader::open(legacy_path, format)?;
        for record in reader {
            let pushed = record.and_then(|r| {
                if format.assigns_ids() {
                    if let Some(id) = r.get("id").and_then(try_coerce_number) {
                        if id >= 1.0 && id.fract() == 0.0 {
                            max_id = max_id.max(id as u64);
                        }
                    }
                }
                builder.push(r)
            });
            if let Err(e) = pushed {
                builder.discard();
                return Err(e);
            }
        }
        let (chunks, next_chunk_id) = builder.finish()?;

        for chunk in &chunks {
            manifest.extend_columns(chunk.columns.iter().map(String::as_str));
        }
        manifest.chunks = chunks;
        manifest.next_chunk_id = next_chunk_id;
        manifest.next_record_id = max_id + 1;

        if let Err(e) = self.commit_manifest(&manifest) {
            for chunk in &manifest.chunks {
                let _ = fs::remove_file(dir.join(&chunk.file));
            }
            return Err(e);
        }
        Ok(manifest)
    }
}

/// Table columns introduced after the chunk was last written
fn unseen_columns(manifest: &TableManifest, meta: &ChunkMeta) -> Vec<String> {
    manifest
        .columns
        .iter()
        .filter(|c| !meta.columns.contains(c))
        .cloned()
        .collect()
}

fn extend_with_record_columns(columns: &mut Vec<String>, records: &[Record]) {
    for record in records {
        for column in record.columns() {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
    }
}

/// Table names are single path components
fn validate_table_name(table: &str) -> EngineResult<()> {
    let invalid = table.is_empty()
        || table.starts_with('.')
        || table.contains(|c: char| c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(EngineError::invalid_format("Invalid table name")
            .with_details(format!("table: {:?}", table)));
    }
    Ok(())
}

/// Lazy record iterator over a whole table, opening chunks one at a time
pub struct TableScan {
    format: TableFormat,
    pending: VecDeque<(PathBuf, Vec<String>)>,
    current: Option<ChunkReader>,
}

impl Iterator for TableScan {
    type Item = EngineResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let (path, unseen) = self.pending.pop_front()?;
            match ChunkReader::open(&path, self.format) {
                Ok(reader) => self.current = Some(reader.with_backfill(unseen)),
                Err(e) => {
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
