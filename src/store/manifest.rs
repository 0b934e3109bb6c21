//! Table manifest structure and serialization
//!
//! `manifest.json` is the authoritative description of a table. Chunk order is
//! the order of the `chunks` list, never directory order.
//!
//! Format:
//! ```json
//! {
//!   "checksum": "crc32:1a2b3c4d",
//!   "manifest": {
//!     "format_version": 1,
//!     "table": "vehicles",
//!     "format": "delimited",
//!     "columns": ["Make", "Model", "Electric Range"],
//!     "chunks": [
//!       {"id": 0, "file": "chunk_000000.csv", "rows": 10000, "bytes": 412334,
//!        "columns": ["Make", "Model", "Electric Range"]}
//!     ],
//!     "next_chunk_id": 1,
//!     "next_record_id": 1
//!   }
//! }
//! ```
//!
//! The checksum covers the compact serialization of `manifest`.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::checksum::{compute_checksum, format_checksum, parse_checksum};
use super::format::TableFormat;
use super::staging::write_atomic;
use crate::errors::{EngineError, EngineResult};

pub const MANIFEST_FILE: &str = "manifest.json";

const FORMAT_VERSION: u8 = 1;

/// Stable chunk identifier, allocated from the manifest counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manifest entry for one physical chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: ChunkId,
    pub file: String,
    pub rows: u64,
    pub bytes: u64,
    pub columns: Vec<String>,
}

/// Persisted table descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub format_version: u8,
    pub table: String,
    pub format: TableFormat,
    /// Union of every chunk's columns, in first-seen order
    pub columns: Vec<String>,
    pub chunks: Vec<ChunkMeta>,
    pub next_chunk_id: u64,
    /// Next `id` for record-array inserts; never decreases
    pub next_record_id: u64,
}

#[derive(Serialize, Deserialize)]
struct ManifestEnvelope {
    checksum: String,
    manifest: TableManifest,
}

impl TableManifest {
    pub fn new(table: impl Into<String>, format: TableFormat, columns: Vec<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            table: table.into(),
            format,
            columns,
            chunks: Vec::new(),
            next_chunk_id: 0,
            next_record_id: 1,
        }
    }

    /// Chunk ids in manifest order
    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|c| c.id).collect()
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&ChunkMeta> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub fn chunk_mut(&mut self, id: ChunkId) -> Option<&mut ChunkMeta> {
        self.chunks.iter_mut().find(|c| c.id == id)
    }

    pub fn last_chunk(&self) -> Option<&ChunkMeta> {
        self.chunks.last()
    }

    pub fn total_rows(&self) -> u64 {
        self.chunks.iter().map(|c| c.rows).sum()
    }

    /// Reserves a fresh chunk id and returns it with its file name
    pub fn allocate_chunk(&mut self) -> (ChunkId, String) {
        let id = ChunkId(self.next_chunk_id);
        self.next_chunk_id += 1;
        (id, chunk_file_name(id, self.format))
    }

    /// Reserves the next record id
    pub fn allocate_record_id(&mut self) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        id
    }

    /// Appends columns not yet known to the table
    pub fn extend_columns<'a>(&mut self, columns: impl IntoIterator<Item = &'a str>) {
        for column in columns {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Serializes with a checksum envelope
    pub fn to_json(&self) -> EngineResult<String> {
        let body = serde_json::to_vec(self)
            .map_err(|e| EngineError::invalid_format_with("Failed to serialize manifest", e))?;
        let envelope = ManifestEnvelope {
            checksum: format_checksum(compute_checksum(&body)),
            manifest: self.clone(),
        };
        serde_json::to_string_pretty(&envelope)
            .map_err(|e| EngineError::invalid_format_with("Failed to serialize manifest", e))
    }

    /// Parses and verifies a manifest
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let envelope: ManifestEnvelope = serde_json::from_str(json)
            .map_err(|e| EngineError::invalid_format_with("Failed to parse manifest", e))?;

        let expected = parse_checksum(&envelope.checksum).ok_or_else(|| {
            EngineError::invalid_format("Malformed manifest checksum")
                .with_details(format!("checksum: {}", envelope.checksum))
        })?;
        let body = serde_json::to_vec(&envelope.manifest)
            .map_err(|e| EngineError::invalid_format_with("Failed to serialize manifest", e))?;
        let actual = compute_checksum(&body);
        if actual != expected {
            return Err(EngineError::invalid_format("Manifest checksum mismatch").with_details(
                format!(
                    "table: {}, expected: {}, actual: {}",
                    envelope.manifest.table,
                    format_checksum(expected),
                    format_checksum(actual)
                ),
            ));
        }
        if envelope.manifest.format_version != FORMAT_VERSION {
            return Err(EngineError::invalid_format("Unsupported manifest version")
                .with_details(format!("version: {}", envelope.manifest.format_version)));
        }
        Ok(envelope.manifest)
    }

    /// Commits the manifest atomically (stage, fsync, rename)
    pub fn write_to_file(&self, path: &Path) -> EngineResult<()> {
        let json = self.to_json()?;
        write_atomic(path, |staged| {
            staged
                .write_all(json.as_bytes())
                .map_err(|e| EngineError::io_failure("Failed to write manifest", e))
        })?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::io_failure("Failed to read manifest", e)
                .with_details(format!("path: {}", path.display()))
        })?;
        Self::from_json(&content)
    }
}

/// `chunk_<NNNNNN>.<ext>`
pub fn chunk_file_name(id: ChunkId, format: TableFormat) -> String {
    format!("chunk_{:06}.{}", id.0, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> TableManifest {
        let mut m = TableManifest::new(
            "vehicles",
            TableFormat::Delimited,
            vec!["Make".into(), "Model".into()],
        );
        let (id, file) = m.allocate_chunk();
        m.chunks.push(ChunkMeta {
            id,
            file,
            rows: 3,
            bytes: 42,
            columns: m.columns.clone(),
        });
        m
    }

    #[test]
    fn test_chunk_allocation() {
        let mut m = sample();
        assert_eq!(m.chunks[0].file, "chunk_000000.csv");
        let (id, file) = m.allocate_chunk();
        assert_eq!(id, ChunkId(1));
        assert_eq!(file, "chunk_000001.csv");
        assert_eq!(m.next_chunk_id, 2);
    }

    #[test]
    fn test_record_ids_monotonic() {
        let mut m = TableManifest::new("ev", TableFormat::RecordArray, vec![]);
        assert_eq!(m.allocate_record_id(), 1);
        assert_eq!(m.allocate_record_id(), 2);
        assert_eq!(m.next_record_id, 3);
    }

    #[test]
    fn test_extend_columns_keeps_order() {
        let mut m = sample();
        m.extend_columns(["Model", "Year", "Make", "Color"]);
        assert_eq!(m.columns, vec!["Make", "Model", "Year", "Color"]);
    }

    #[test]
    fn test_json_roundtrip_verifies_checksum() {
        let m = sample();
        let json = m.to_json().unwrap();
        assert!(json.contains("crc32:"));
        assert_eq!(TableManifest::from_json(&json).unwrap(), m);
    }

    #[test]
    fn test_tampered_manifest_rejected() {
        let json = sample().to_json().unwrap();
        let tampered = json.replace("\"rows\": 3", "\"rows\": 4");
        assert_ne!(json, tampered);
        let err = TableManifest::from_json(&tampered).unwrap_err();
        assert_eq!(err.code(), "SQ_INVALID_FORMAT");
        assert!(err.message().contains("checksum"));
    }

    #[test]
    fn test_write_and_read_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let m = sample();
        m.write_to_file(&path).unwrap();
        assert_eq!(TableManifest::read_from_file(&path).unwrap(), m);
    }
}
