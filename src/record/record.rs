//! Ordered row representation

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::value::Value;
use crate::errors::{EngineError, EngineResult};

/// An ordered mapping from column name to value.
///
/// Column names are unique. Insertion order is preserved for output;
/// lookup is by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Creates an empty record with room for `n` columns
    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    /// Builds a record from `(column, value)` pairs; later duplicates overwrite
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = Self::new();
        for (k, v) in pairs {
            record.insert(k, v);
        }
        record
    }

    /// Returns the value for a column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Returns the value for a column or `SchemaMismatch`
    pub fn require(&self, column: &str, context: &str) -> EngineResult<&Value> {
        self.get(column)
            .ok_or_else(|| EngineError::schema_mismatch(column, context.to_string()))
    }

    /// Returns true if the column is present
    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// Sets a column, replacing in place if it exists. Returns the old value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((column, value));
                None
            }
        }
    }

    /// Removes a column
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(pos).1)
    }

    /// Column names in insertion order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// `(column, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keeps only the named columns that exist, in the requested order
    pub fn project(&self, columns: &[String]) -> Record {
        let mut out = Record::with_capacity(columns.len());
        for column in columns {
            if let Some(v) = self.get(column) {
                out.insert(column.clone(), v.clone());
            }
        }
        out
    }

    /// Merges `other` into this record. Colliding columns take `other`'s value
    /// and keep their original position.
    pub fn merge_from(&mut self, other: &Record) {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
    }

    /// Re-shapes the record to exactly `columns`, back-filling missing cells
    /// with the unset marker. Columns not listed are dropped.
    pub fn conform_to(&self, columns: &[String]) -> Record {
        let mut out = Record::with_capacity(columns.len());
        for column in columns {
            let value = self.get(column).cloned().unwrap_or_else(Value::unset);
            out.fields.push((column.clone(), value));
        }
        out
    }

    /// Converts a decoded JSON object
    pub fn from_json_object(map: serde_json::Map<String, serde_json::Value>) -> EngineResult<Self> {
        let mut record = Record::with_capacity(map.len());
        for (k, v) in map {
            record.fields.push((k, Value::from_json(v)?));
        }
        Ok(record)
    }

    /// Converts a decoded JSON value that must be an object
    pub fn from_json(value: serde_json::Value) -> EngineResult<Self> {
        match value {
            serde_json::Value::Object(map) => Self::from_json_object(map),
            other => Err(EngineError::invalid_format("Record must be a JSON object")
                .with_details(format!("got: {}", other))),
        }
    }

    /// Converts to a JSON object preserving column order
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len());
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Record::from_json_object(map).map_err(de::Error::custom)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vehicle() -> Record {
        Record::from_pairs([("Make", "TESLA"), ("Year", "2020")])
    }

    #[test]
    fn test_insert_preserves_order_and_replaces_in_place() {
        let mut r = vehicle();
        r.insert("Model", "3");
        r.insert("Make", "FORD");
        let cols: Vec<_> = r.columns().collect();
        assert_eq!(cols, vec!["Make", "Year", "Model"]);
        assert_eq!(r.get("Make"), Some(&Value::from("FORD")));
    }

    #[test]
    fn test_project_skips_missing_columns() {
        let r = vehicle();
        let p = r.project(&["Year".to_string(), "Color".to_string()]);
        assert_eq!(p.len(), 1);
        assert_eq!(p.get("Year"), Some(&Value::from("2020")));
    }

    #[test]
    fn test_merge_right_overwrites() {
        let mut left = Record::from_pairs([("k", "1"), ("name", "left")]);
        let right = Record::from_pairs([("name", "right"), ("extra", "x")]);
        left.merge_from(&right);
        let cols: Vec<_> = left.columns().collect();
        assert_eq!(cols, vec!["k", "name", "extra"]);
        assert_eq!(left.get("name"), Some(&Value::from("right")));
    }

    #[test]
    fn test_conform_backfills_unset() {
        let r = vehicle();
        let c = r.conform_to(&["Make".to_string(), "Color".to_string()]);
        assert_eq!(c.get("Make"), Some(&Value::from("TESLA")));
        assert!(c.get("Color").unwrap().is_unset());
        assert!(!c.contains("Year"));
    }

    #[test]
    fn test_json_roundtrip_keeps_column_order() {
        let r = Record::from_json(json!({"z": 1, "a": "two", "m": true})).unwrap();
        let text = serde_json::to_string(&r).unwrap();
        assert_eq!(text, r#"{"z":1,"a":"two","m":true}"#);
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_require_missing_column() {
        let err = vehicle().require("Color", "test").unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::SchemaMismatch);
    }
}
