//! Chunked table store
//!
//! A table is a directory holding a checksummed manifest and an ordered list
//! of chunk files. Every engine reads and writes tables through `TableStore`;
//! nothing else touches chunk paths.
//!
//! - `format`: delimited (CSV) and record-array (JSON) encodings
//! - `codec`: lazy chunk readers and streaming chunk writers
//! - `manifest`: persisted chunk list, column list and id counters
//! - `staging`: stage-then-rename writes
//! - `policy`: when to start a new chunk
//! - `builder`: re-chunking of a record stream
//! - `table`: the store itself

mod builder;
mod checksum;
mod codec;
mod format;
mod manifest;
mod policy;
mod staging;
mod table;

pub use builder::ChunkBuilder;
pub use codec::{size_hint, ChunkReader, ChunkWriter};
pub use format::TableFormat;
pub use manifest::{chunk_file_name, ChunkId, ChunkMeta, TableManifest, MANIFEST_FILE};
pub use policy::PartitionPolicy;
pub use staging::{is_staging_file, write_atomic, StagedFile};
pub use table::{TableScan, TableStore};
