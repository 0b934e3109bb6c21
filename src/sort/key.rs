//! Sort keys and key extraction
//!
//! A `SortOrder` is one or more `SortKey`s compared left to right. Extracted
//! keys carry their own direction, so a composite key orders correctly with
//! plain `Ord` in both the run sort and the heap merge.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::record::{coerce_number, Record};

/// Column to order by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
    /// Compare as numbers instead of raw text
    #[serde(default)]
    pub numeric: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortKey {
    pub fn new(column: impl Into<String>, ascending: bool, numeric: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
            numeric,
        }
    }

    pub fn ascending(column: impl Into<String>) -> Self {
        Self::new(column, true, false)
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self::new(column, false, false)
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }

    /// Reads this key from a record.
    ///
    /// A missing column is `SchemaMismatch`; a non-numeric cell in numeric mode
    /// is `TypeCoercion`.
    pub fn extract(&self, record: &Record) -> EngineResult<SortValue> {
        let value = record.require(&self.column, "Record is missing the sort column")?;
        if self.numeric {
            Ok(SortValue::Number(coerce_number(
                value,
                "Sort key is not numeric",
            )?))
        } else {
            Ok(SortValue::Text(value.raw_text().into_owned()))
        }
    }

}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    keys: Vec<SortKey>,
}

impl SortOrder {
    /// At least one key is required
    pub fn new(keys: Vec<SortKey>) -> EngineResult<Self> {
        if keys.is_empty() {
            return Err(EngineError::invalid_format("No sort columns given"));
        }
        Ok(Self { keys })
    }

    /// Parses `"Make, Year"`; every column shares the direction and hint
    pub fn parse(columns: &str, ascending: bool, numeric: bool) -> EngineResult<Self> {
        let keys = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| SortKey::new(c, ascending, numeric))
            .collect::<Vec<_>>();
        Self::new(keys).map_err(|e| e.with_details(format!("columns: {:?}", columns)))
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.column.as_str())
    }

    /// Comma-joined column names, for logging
    pub fn describe(&self) -> String {
        self.columns().collect::<Vec<_>>().join(",")
    }

    /// Extracts every key of the order from one record
    pub fn extract(&self, record: &Record) -> EngineResult<CompositeKey> {
        self.keys
            .iter()
            .map(|key| {
                Ok(KeyPart {
                    value: key.extract(record)?,
                    descending: !key.ascending,
                })
            })
            .collect()
    }
}

impl From<SortKey> for SortOrder {
    fn from(key: SortKey) -> Self {
        Self { keys: vec![key] }
    }
}

impl From<&SortKey> for SortOrder {
    fn from(key: &SortKey) -> Self {
        Self::from(key.clone())
    }
}

/// One component of an extracted key, ordered in its key's direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPart {
    #[serde(rename = "v")]
    pub value: SortValue,
    #[serde(rename = "d", default, skip_serializing_if = "std::ops::Not::not")]
    pub descending: bool,
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        let ord = self.value.cmp(&other.value);
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// Extracted `SortOrder` key; `Vec` ordering is lexicographic
pub type CompositeKey = Vec<KeyPart>;

/// An extracted key: raw text, or a finite number in numeric mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
    Text(String),
    Number(f64),
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue {}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
            (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn rec(range: &str) -> Record {
        Record::from_pairs([("Range", range)])
    }

    fn compare(key: SortKey, a: &str, b: &str) -> Ordering {
        let order = SortOrder::from(key);
        order.extract(&rec(a)).unwrap().cmp(&order.extract(&rec(b)).unwrap())
    }

    #[test]
    fn test_text_order_is_lexicographic() {
        assert_eq!(compare(SortKey::ascending("Range"), "9", "10"), Ordering::Greater);
    }

    #[test]
    fn test_numeric_order() {
        assert_eq!(compare(SortKey::ascending("Range").numeric(), "9", "10"), Ordering::Less);
    }

    #[test]
    fn test_descending_reverses() {
        assert_eq!(compare(SortKey::descending("Range"), "a", "b"), Ordering::Greater);
    }

    #[test]
    fn test_missing_column_and_bad_number() {
        let key = SortKey::ascending("Year");
        assert_eq!(
            key.extract(&rec("1")).unwrap_err().kind(),
            ErrorKind::SchemaMismatch
        );
        let key = SortKey::ascending("Range").numeric();
        assert_eq!(
            key.extract(&rec("NA")).unwrap_err().kind(),
            ErrorKind::TypeCoercion
        );
    }

    #[test]
    fn test_composite_key_mixes_directions() {
        let order = SortOrder::new(vec![
            SortKey::ascending("Make"),
            SortKey::descending("Year").numeric(),
        ])
        .unwrap();
        let key = |make: &str, year: &str| {
            order
                .extract(&Record::from_pairs([("Make", make), ("Year", year)]))
                .unwrap()
        };
        assert!(key("FORD", "2019") < key("TESLA", "2021"));
        assert!(key("TESLA", "2021") < key("TESLA", "2020"));
        assert_eq!(key("KIA", "9"), key("KIA", "9.0"));
    }

    #[test]
    fn test_parse_order() {
        let order = SortOrder::parse("Make, Year", false, false).unwrap();
        assert_eq!(order.describe(), "Make,Year");
        assert!(order.keys().iter().all(|k| !k.ascending));
        assert_eq!(
            SortOrder::parse(" , ", true, false).unwrap_err().code(),
            "SQ_INVALID_FORMAT"
        );
    }

    #[test]
    fn test_sort_value_json_roundtrip() {
        let values = vec![SortValue::Text("10".into()), SortValue::Number(-0.5)];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<SortValue> = serde_json::from_str(&json).unwrap();
        assert!(matches!(back[0], SortValue::Text(ref s) if s == "10"));
        assert!(matches!(back[1], SortValue::Number(n) if n == -0.5));
    }
}
