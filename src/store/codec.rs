//! Chunk encoding and decoding
//!
//! Delimited chunks are read lazily through the `csv` crate, one record at a
//! time. Record-array chunks are written one object per line inside a JSON
//! array and decoded whole; a chunk is the unit of memory.
//!
//! A reader can be given table columns the chunk predates; decoded records
//! get the unset marker for each of them.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use crate::errors::{EngineError, EngineResult};
use crate::record::{Record, Value, UNSET_MARKER};

use super::format::TableFormat;

/// Lazy record iterator over one chunk file
pub struct ChunkReader {
    source: ChunkSource,
    backfill: Vec<String>,
}

enum ChunkSource {
    Delimited {
        path: PathBuf,
        reader: csv::Reader<BufReader<File>>,
        headers: Vec<String>,
        row: csv::StringRecord,
    },
    Buffered(std::vec::IntoIter<Record>),
}

impl ChunkReader {
    /// Opens a chunk file for reading
    pub fn open(path: &Path, format: TableFormat) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| {
            EngineError::io_failure("Failed to open chunk", e)
                .with_details(format!("path: {}", path.display()))
        })?;

        match format {
            TableFormat::Delimited => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(true)
                    .from_reader(BufReader::new(file));
                let headers: Vec<String> = reader
                    .headers()
                    .map_err(|e| csv_error(path, e))?
                    .iter()
                    .map(String::from)
                    .collect();
                Ok(Self::from_source(ChunkSource::Delimited {
                    path: path.to_path_buf(),
                    reader,
                    headers,
                    row: csv::StringRecord::new(),
                }))
            }
            TableFormat::RecordArray => {
                let len = file.metadata().map(|m| m.len()).unwrap_or(0);
                let records: Vec<Record> = if len == 0 {
                    Vec::new()
                } else {
                    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                        EngineError::invalid_format_with("Malformed record-array chunk", e)
                            .with_details(format!("path: {}", path.display()))
                    })?
                };
                Ok(Self::from_source(ChunkSource::Buffered(records.into_iter())))
            }
        }
    }

    fn from_source(source: ChunkSource) -> Self {
        Self {
            source,
            backfill: Vec::new(),
        }
    }

    /// Appends each of `columns` a record lacks, set to the unset marker
    pub fn with_backfill(mut self, columns: Vec<String>) -> Self {
        self.backfill = columns;
        self
    }

    fn fill(&self, mut record: Record) -> Record {
        for column in &self.backfill {
            if !record.contains(column) {
                record.insert(column.as_str(), Value::unset());
            }
        }
        record
    }

    /// Reads every remaining record
    pub fn collect_all(self) -> EngineResult<Vec<Record>> {
        self.collect()
    }
}

impl Iterator for ChunkReader {
    type Item = EngineResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match &mut self.source {
            ChunkSource::Delimited {
                path,
                reader,
                headers,
                row,
            } => match reader.read_record(row) {
                Ok(true) => headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.clone(), Value::from(v)))
                    .collect(),
                Ok(false) => return None,
                Err(e) => return Some(Err(csv_error(path, e))),
            },
            ChunkSource::Buffered(records) => records.next()?,
        };
        Some(Ok(self.fill(record)))
    }
}

fn csv_error(path: &Path, e: csv::Error) -> EngineError {
    EngineError::invalid_format_with("Malformed delimited chunk", e)
        .with_details(format!("path: {}", path.display()))
}

enum Sink<W: Write> {
    Delimited(csv::Writer<W>),
    RecordArray(W),
}

/// Streaming chunk encoder
///
/// Every record is written against the chunk's column set; a missing cell is
/// written as the unset marker and an extra column is a schema mismatch.
pub struct ChunkWriter<W: Write> {
    sink: Sink<W>,
    columns: Vec<String>,
    rows: u64,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(out: W, format: TableFormat, columns: &[String]) -> EngineResult<Self> {
        let sink = match format {
            TableFormat::Delimited => {
                let mut writer = csv::WriterBuilder::new().from_writer(out);
                if !columns.is_empty() {
                    writer
                        .write_record(columns)
                        .map_err(|e| write_error("Failed to write header", e))?;
                }
                Sink::Delimited(writer)
            }
            TableFormat::RecordArray => {
                let mut out = out;
                out.write_all(b"[")
                    .map_err(|e| EngineError::io_failure("Failed to write chunk", e))?;
                Sink::RecordArray(out)
            }
        };
        Ok(Self {
            sink,
            columns: columns.to_vec(),
            rows: 0,
        })
    }

    pub fn write(&mut self, record: &Record) -> EngineResult<()> {
        if let Some(extra) = record.columns().find(|c| !self.columns.iter().any(|k| k.as_str() == *c)) {
            return Err(EngineError::schema_mismatch(
                extra,
                "Record column is not part of the chunk column set",
            ));
        }

        match &mut self.sink {
            Sink::Delimited(writer) => {
                let cells: Vec<_> = self
                    .columns
                    .iter()
                    .map(|c| match record.get(c) {
                        Some(v) => v.raw_text(),
                        None => UNSET_MARKER.into(),
                    })
                    .collect();
                writer
                    .write_record(cells.iter().map(|c| c.as_bytes()))
                    .map_err(|e| write_error("Failed to write record", e))?;
            }
            Sink::RecordArray(out) => {
                let conformed = record.conform_to(&self.columns);
                let sep: &[u8] = if self.rows == 0 { b"\n    " } else { b",\n    " };
                out.write_all(sep)
                    .map_err(|e| EngineError::io_failure("Failed to write chunk", e))?;
                serde_json::to_writer(&mut *out, &conformed).map_err(|e| {
                    EngineError::invalid_format_with("Failed to encode record", e)
                })?;
            }
        }
        self.rows += 1;
        Ok(())
    }

    /// Flushes encoder state and returns the underlying writer with the row count
    pub fn finish(self) -> EngineResult<(W, u64)> {
        let rows = self.rows;
        let out = match self.sink {
            Sink::Delimited(writer) => writer
                .into_inner()
                .map_err(|e| EngineError::io_failure("Failed to flush chunk", e.into_error()))?,
            Sink::RecordArray(mut out) => {
                let tail: &[u8] = if rows == 0 { b"]\n" } else { b"\n]\n" };
                out.write_all(tail)
                    .map_err(|e| EngineError::io_failure("Failed to write chunk", e))?;
                out
            }
        };
        Ok((out, rows))
    }
}

fn write_error(message: &str, e: csv::Error) -> EngineError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => EngineError::io_failure(message, io),
        other => EngineError::invalid_format(message).with_details(format!("{:?}", other)),
    }
}

/// Approximate encoded size of one record, used by the partition policy
pub fn size_hint(record: &Record, format: TableFormat) -> u64 {
    let cells: usize = record.iter().map(|(_, v)| v.raw_text().len() + 1).sum();
    match format {
        TableFormat::Delimited => cells as u64 + 1,
        TableFormat::RecordArray => {
            let keys: usize = record.columns().map(|c| c.len() + 6).sum();
            (cells + keys + 8) as u64
        }
    }
}
