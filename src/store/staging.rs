//! Staged atomic file writes
//!
//! A `StagedFile` is a temporary file created in the target's directory.
//! `commit()` flushes, fsyncs and renames it over the target. Dropping an
//! uncommitted staged file deletes it, leaving the target untouched.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event};

const STAGING_PREFIX: &str = ".staging-";

/// Temporary file that replaces `target` on commit
pub struct StagedFile {
    target: PathBuf,
    writer: Option<BufWriter<NamedTempFile>>,
}

impl StagedFile {
    /// Creates a staging file next to `target`
    pub fn begin(target: &Path) -> EngineResult<Self> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        let file = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| {
                EngineError::io_failure("Failed to create staging file", e)
                    .with_details(format!("target: {}", target.display()))
            })?;
        Ok(Self {
            target: target.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Flushes, fsyncs and renames over the target; returns the byte size
    pub fn commit(mut self) -> EngineResult<u64> {
        let writer = match self.writer.take() {
            Some(w) => w,
            None => return Err(EngineError::invalid_format("Staging file already consumed")),
        };
        let target = self.target.clone();
        let io_err = |msg: &str, e: io::Error| {
            EngineError::io_failure(msg, e).with_details(format!("target: {}", target.display()))
        };

        let file = writer
            .into_inner()
            .map_err(|e| io_err("Failed to flush staging file", e.into_error()))?;
        file.as_file()
            .sync_all()
            .map_err(|e| io_err("Failed to fsync staging file", e))?;
        let bytes = file
            .as_file()
            .metadata()
            .map_err(|e| io_err("Failed to stat staging file", e))?
            .len();
        file.persist(&target)
            .map_err(|e| io_err("Failed to rename staging file", e.error))?;
        Ok(bytes)
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<NamedTempFile>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staging file already committed"))
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let target = self.target.display().to_string();
            log_event_with_fields(Event::StagingDiscarded, &[("target", target.as_str())]);
        }
    }
}

/// Writes `target` atomically through a staging file
pub fn write_atomic<F>(target: &Path, write: F) -> EngineResult<u64>
where
    F: FnOnce(&mut StagedFile) -> EngineResult<()>,
{
    let mut staged = StagedFile::begin(target)?;
    write(&mut staged)?;
    staged.commit()
}

/// Whether a directory entry is a leftover staging file
pub fn is_staging_file(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_commit_replaces_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("chunk_000000.csv");
        fs::write(&target, "old").unwrap();

        let mut staged = StagedFile::begin(&target).unwrap();
        staged.write_all(b"new contents").unwrap();
        let bytes = staged.commit().unwrap();

        assert_eq!(bytes, 12);
        assert_eq!(fs::read_to_string(&target).unwrap(), "new contents");
    }

    #[test]
    fn test_drop_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("chunk_000000.csv");
        fs::write(&target, "original").unwrap();

        {
            let mut staged = StagedFile::begin(&target).unwrap();
            staged.write_all(b"partial").unwrap();
        }

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_staging_file(&e.file_name().to_string_lossy()))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_error_discards() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("manifest.json");

        let result = write_atomic(&target, |f| {
            f.write_all(b"half").map_err(|e| EngineError::io_failure("write", e))?;
            Err(EngineError::invalid_format("boom"))
        });

        assert!(result.is_err());
        assert!(!target.exists());
    }
}
