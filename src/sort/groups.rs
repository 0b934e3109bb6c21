//! Adjacent equal-key grouping over a sorted stream

use std::iter::Peekable;

use super::merge::SortedStream;
use crate::errors::EngineResult;
use crate::record::Record;

/// Sorted stream cut into maximal runs of equal keys.
///
/// The key is the raw text of `columns`, in order. Grouping is only
/// meaningful when the stream was sorted on the same columns.
pub struct KeyGroups {
    inner: Peekable<SortedStream>,
    columns: Vec<String>,
}

impl KeyGroups {
    pub fn new(stream: SortedStream, columns: &[String]) -> Self {
        Self {
            inner: stream.peekable(),
            columns: columns.to_vec(),
        }
    }

    /// Next group with its key, or `None` once the stream is drained
    pub fn next_group(&mut self) -> EngineResult<Option<(Vec<String>, Vec<Record>)>> {
        let first = match self.inner.next() {
            Some(item) => item?,
            None => return Ok(None),
        };
        let key = self.key_of(&first)?;
        let mut group = vec![first];

        loop {
            let same_key = match self.inner.peek() {
                Some(Ok(next)) => key_of(&self.columns, next)? == key,
                // surface the error on the next pull
                Some(Err(_)) => true,
                None => false,
            };
            if !same_key {
                break;
            }
            match self.inner.next() {
                Some(item) => group.push(item?),
                None => break,
            }
        }
        Ok(Some((key, group)))
    }

    fn key_of(&self, record: &Record) -> EngineResult<Vec<String>> {
        key_of(&self.columns, record)
    }
}

fn key_of(columns: &[String], record: &Record) -> EngineResult<Vec<String>> {
    {
        columns
            .iter()
            .map(|column| {
                Ok(record
                    .require(column, "Record is missing a grouping column")?
                    .raw_text()
                    .into_owned())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::{sort_stream, SortKey, SortOptions, SortOrder};

    #[test]
    fn test_groups_follow_sorted_keys() {
        let records = ["b", "a", "b", "c", "a"]
            .iter()
            .enumerate()
            .map(|(i, k)| Ok(Record::from_pairs([("k", k.to_string()), ("n", i.to_string())])));
        let order = SortOrder::from(SortKey::ascending("k"));
        let stream = sort_stream(records, &order, &SortOptions::new(2, false)).unwrap();
        let mut groups = KeyGroups::new(stream, &["k".to_string()]);

        let mut seen = Vec::new();
        while let Some((key, rows)) = groups.next_group().unwrap() {
            seen.push((key[0].clone(), rows.len()));
        }
        assert_eq!(
            seen,
            vec![("a".to_string(), 2), ("b".to_string(), 2), ("c".to_string(), 1)]
        );
    }
}
