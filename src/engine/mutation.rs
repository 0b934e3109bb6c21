//! Row mutations: insert, delete, update
//!
//! Every mutation validates its request against the manifest first, then
//! rewrites only the chunks it touches, then commits the manifest once.

use serde::{Deserialize, Serialize};

use super::Database;
use crate::condition::{Conjunction, MatchOutcome};
use crate::errors::{EngineError, EngineResult};
use crate::observability::{log_event_with_fields, Event};
use crate::record::{Record, Value};
use crate::store::{size_hint, ChunkId, TableManifest};

/// Column holding assigned record ids in record-array tables
pub const ID_COLUMN: &str = "id";

/// Result of `insert_row`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    /// Assigned id; only record-array tables assign one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_id: Option<u64>,
    pub status: String,
}

/// Replacement rule for one column in `update_where`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnChange {
    #[serde(alias = "originalvalue")]
    pub from: Value,
    #[serde(alias = "newvalue")]
    pub to: Value,
}

impl ColumnChange {
    pub fn new(from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Parses `{"col": {"from": .., "to": ..}, ...}` keeping column order
    pub fn parse_map(json: &serde_json::Value) -> EngineResult<Vec<(String, ColumnChange)>> {
        let map = json.as_object().ok_or_else(|| {
            EngineError::invalid_format("Update conditions must be a JSON object")
                .with_details(format!("got: {}", json))
        })?;
        map.iter()
            .map(|(column, change)| {
                let change: ColumnChange = serde_json::from_value(change.clone()).map_err(|e| {
                    EngineError::invalid_format_with("Malformed column change", e)
                        .with_details(format!("column: {}", column))
                })?;
                Ok((column.clone(), change))
            })
            .collect()
    }

    fn apply(&self, record: &mut Record, column: &str) -> bool {
        let hit = record
            .get(column)
            .map_or(false, |v| v.raw_text() == self.from.raw_text());
        if hit {
            record.insert(column, self.to.clone());
        }
        hit
    }
}

impl Database {
    /// Inserts one row, appending to the last chunk unless the partition
    /// policy says it is full
    pub fn insert_row(&self, table: &str, values: Record) -> EngineResult<InsertOutcome> {
        let mut manifest = self.store.load_manifest(table)?;
        if values.is_empty() {
            return Err(EngineError::invalid_format("No values to insert")
                .with_details(format!("table: {}", table)));
        }

        let assigned_id = if manifest.format.assigns_ids() {
            Some(manifest.allocate_record_id())
        } else {
            None
        };
        let row = shape_row(&manifest, values, assigned_id);

        let incoming = size_hint(&row, manifest.format);
        let policy = self.store.policy();
        let target = manifest
            .last_chunk()
            .filter(|last| !policy.should_split(last.rows, last.bytes, incoming))
            .map(|last| last.id);

        let chunk = match target {
            Some(id) => {
                let mut rows = self.read_rows(&manifest, id)?;
                rows.push(row);
                self.store.replace_chunk(&mut manifest, id, &rows)?;
                id
            }
            None => self.store.append_chunk(&mut manifest, std::slice::from_ref(&row))?,
        };
        self.store.commit_manifest(&manifest)?;

        let chunk = chunk.to_string();
        let id = assigned_id.map(|id| id.to_string()).unwrap_or_default();
        log_event_with_fields(
            Event::RowInserted,
            &[("table", table), ("chunk", chunk.as_str()), ("id", id.as_str())],
        );
        Ok(InsertOutcome {
            assigned_id,
            status: "Values inserted successfully!".to_string(),
        })
    }

    /// Deletes every row matching the conjunction; returns the count.
    ///
    /// Rows whose values cannot be compared are kept.
    pub fn delete_where(&self, table: &str, conditions: &Conjunction) -> EngineResult<u64> {
        let mut manifest = self.store.load_manifest(table)?;
        let mut deleted = 0u64;

        for id in manifest.chunk_ids() {
            let mut kept = Vec::new();
            let mut removed = 0u64;
            for record in self.store.read_chunk(&manifest, id)? {
                let record = record?;
                match self.evaluator.check(&record, conditions)? {
                    MatchOutcome::Matched => removed += 1,
                    MatchOutcome::Rejected | MatchOutcome::CoercionFailed => kept.push(record),
                }
            }
            if removed > 0 {
                self.store.replace_chunk(&mut manifest, id, &kept)?;
                deleted += removed;
            }
        }

        self.finish_mutation(&manifest, Event::RowsDeleted, deleted)
    }

    /// Rewrites `from` to `to` per column; a row counts once however many of
    /// its columns changed
    pub fn update_where(&self, table: &str, changes: &[(String, ColumnChange)]) -> EngineResult<u64> {
        let mut manifest = self.store.load_manifest(table)?;
        if changes.is_empty() {
            return Err(EngineError::invalid_format("No column changes given")
                .with_details(format!("table: {}", table)));
        }
        if let Some((missing, _)) = changes.iter().find(|(c, _)| !manifest.has_column(c)) {
            return Err(EngineError::schema_mismatch(missing, "Table has no such column to update")
                .with_details(format!("table: {}, column: {}", table, missing)));
        }

        let mut updated = 0u64;
        for id in manifest.chunk_ids() {
            let mut rows = self.read_rows(&manifest, id)?;
            let mut touched = 0u64;
            for row in rows.iter_mut() {
                let mut hit = false;
                for (column, change) in changes {
                    hit |= change.apply(row, column);
                }
                if hit {
                    touched += 1;
                }
            }
            if touched > 0 {
                self.store.replace_chunk(&mut manifest, id, &rows)?;
                updated += touched;
            }
        }

        self.finish_mutation(&manifest, Event::RowsUpdated, updated)
    }

    /// Overwrites fields of the record with the given id. Returns false when
    /// no record carries that id.
    pub fn update_by_id(&self, table: &str, id: u64, values: Record) -> EngineResult<bool> {
        let mut manifest = self.store.load_manifest(table)?;
        if !manifest.format.assigns_ids() {
            return Err(EngineError::invalid_format("Table does not assign record ids")
                .with_details(format!("table: {}, format: {}", table, manifest.format)));
        }
        if values.contains(ID_COLUMN) {
            return Err(EngineError::invalid_format("Record ids cannot be changed")
                .with_details(format!("table: {}", table)));
        }

        let wanted = id.to_string();
        for chunk in manifest.chunk_ids() {
            let mut rows = self.read_rows(&manifest, chunk)?;
            let position = rows
                .iter()
                .position(|r| r.get(ID_COLUMN).map_or(false, |v| v.raw_text() == wanted));
            if let Some(pos) = position {
                rows[pos].merge_from(&values);
                self.store.replace_chunk(&mut manifest, chunk, &rows)?;
                self.finish_mutation(&manifest, Event::RowsUpdated, 1)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn read_rows(&self, manifest: &TableManifest, id: ChunkId) -> EngineResult<Vec<Record>> {
        self.store.read_chunk(manifest, id)?.collect()
    }

    fn finish_mutation(&self, manifest: &TableManifest, event: Event, rows: u64) -> EngineResult<u64> {
        if rows > 0 {
            self.store.commit_manifest(manifest)?;
        }
        let count = rows.to_string();
        log_event_with_fields(
            event,
            &[("table", manifest.table.as_str()), ("rows", count.as_str())],
        );
        Ok(rows)
    }
}

/// Orders the new row: delimited rows follow the table columns (back-filled
/// with the unset marker) and then any new columns; record-array rows keep
/// their own order and get the id last.
fn shape_row(manifest: &TableManifest, values: Record, assigned_id: Option<u64>) -> Record {
    let mut row = match assigned_id {
        Some(_) => values,
        None => {
            let mut row = values.conform_to(&manifest.columns);
            row.merge_from(&values);
            row
        }
    };
    if let Some(id) = assigned_id {
        row.insert(ID_COLUMN, Value::integer(id));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::config::Config;
    use crate::store::TableFormat;
    use serde_json::json;
    use tempfile::TempDir;

    fn db(dir: &TempDir, max_rows: u64) -> Database {
        let mut config = Config::for_dir(dir.path());
        config.max_chunk_rows = max_rows;
        Database::open(&config).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> Record {
        Record::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_insert_backfills_and_extends_columns() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 0);
        db.create_table("t", TableFormat::Delimited, vec!["a".into(), "b".into()])
            .unwrap();

        let out = db.insert_row("t", row(&[("b", "2")])).unwrap();
        assert_eq!(out.assigned_id, None);
        db.insert_row("t", row(&[("c", "3"), ("a", "1")])).unwrap();

        let rows = db.project("t", None).unwrap();
        assert_eq!(rows[0], row(&[("a", "NA"), ("b", "2"), ("c", "NA")]));
        assert_eq!(rows[1], row(&[("a", "1"), ("b", "NA"), ("c", "3")]));
        assert!(db.store().load_manifest("t").unwrap().has_column("c"));
    }

    #[test]
    fn test_insert_splits_by_policy() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 2);
        db.create_table("t", TableFormat::Delimited, vec!["a".into()]).unwrap();
        for n in 0..5 {
            let n = n.to_string();
            db.insert_row("t", row(&[("a", n.as_str())])).unwrap();
        }
        let manifest = db.store().load_manifest("t").unwrap();
        let sizes: Vec<u64> = manifest.chunks.iter().map(|c| c.rows).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_insert_missing_table() {
        let dir = TempDir::new().unwrap();
        let err = db(&dir, 0).insert_row("nope", row(&[("a", "1")])).unwrap_err();
        assert_eq!(err.code(), "SQ_NOT_FOUND");
    }

    #[test]
    fn test_delete_keeps_uncomparable_rows() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 1);
        db.create_table("t", TableFormat::Delimited, vec!["n".into()]).unwrap();
        for n in ["5", "50", "NA", "500"] {
            db.insert_row("t", row(&[("n", n)])).unwrap();
        }
        let gone = db
            .delete_where("t", &Conjunction::new(vec![Condition::gt("n", Value::integer(10))]))
            .unwrap();
        assert_eq!(gone, 2);
        let left: Vec<String> = db
            .project("t", None)
            .unwrap()
            .iter()
            .map(|r| r.get("n").unwrap().raw_text().into_owned())
            .collect();
        assert_eq!(left, vec!["5", "NA"]);
    }

    #[test]
    fn test_update_where_counts_rows_once() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 0);
        db.create_table("t", TableFormat::Delimited, vec!["a".into(), "b".into()])
            .unwrap();
        db.insert_row("t", row(&[("a", "x"), ("b", "x")])).unwrap();
        db.insert_row("t", row(&[("a", "y"), ("b", "x")])).unwrap();

        let changes = ColumnChange::parse_map(&json!({
            "a": {"originalvalue": "x", "newvalue": "z"},
            "b": {"from": "x", "to": "w"}
        }))
        .unwrap();
        assert_eq!(db.update_where("t", &changes).unwrap(), 2);

        let rows = db.project("t", None).unwrap();
        assert_eq!(rows[0], row(&[("a", "z"), ("b", "w")]));
        assert_eq!(rows[1], row(&[("a", "y"), ("b", "w")]));
    }

    #[test]
    fn test_update_where_rejects_unknown_column() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 0);
        db.create_table("t", TableFormat::Delimited, vec!["a".into()]).unwrap();
        let changes = vec![("zz".to_string(), ColumnChange::new("1", "2"))];
        assert_eq!(
            db.update_where("t", &changes).unwrap_err().code(),
            "SQ_SCHEMA_MISMATCH"
        );
    }

    #[test]
    fn test_record_ids_survive_deletes() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 2);
        db.create_table("j", TableFormat::RecordArray, Vec::new()).unwrap();

        let first = db.insert_row("j", row(&[("k", "a")])).unwrap();
        let second = db.insert_row("j", row(&[("k", "b")])).unwrap();
        assert_eq!((first.assigned_id, second.assigned_id), (Some(1), Some(2)));

        db.delete_where("j", &Conjunction::new(vec![Condition::eq("k", "b")]))
            .unwrap();
        let third = db.insert_row("j", row(&[("k", "c")])).unwrap();
        assert_eq!(third.assigned_id, Some(3));
    }

    #[test]
    fn test_update_by_id() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 1);
        db.create_table("j", TableFormat::RecordArray, Vec::new()).unwrap();
        db.insert_row("j", row(&[("k", "a")])).unwrap();
        db.insert_row("j", row(&[("k", "b")])).unwrap();

        assert!(db.update_by_id("j", 2, row(&[("k", "B"), ("extra", "1")])).unwrap());
        assert!(!db.update_by_id("j", 9, row(&[("k", "x")])).unwrap());
        assert!(db.update_by_id("j", 1, row(&[("id", "7")])).is_err());

        let rows = db.project("j", None).unwrap();
        assert_eq!(rows[1].get("k"), Some(&Value::from("B")));
        assert_eq!(rows[1].get("extra"), Some(&Value::from("1")));
    }

    #[test]
    fn test_update_by_id_needs_record_array() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir, 0);
        db.create_table("t", TableFormat::Delimited, vec!["a".into()]).unwrap();
        assert_eq!(
            db.update_by_id("t", 1, row(&[("a", "1")])).unwrap_err().code(),
            "SQ_INVALID_FORMAT"
        );
    }
}
