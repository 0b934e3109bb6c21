//! Grouped-records mode: group-by without an aggregate function
//!
//! The table is sorted on the group column through the external sort, so
//! only one group is held while the next is read. Groups come out in key
//! order; records inside a group keep table order.

use crate::errors::EngineResult;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::record::Record;
use crate::sort::{sort_table_stream, KeyGroups, SortKey, SortOptions, SortOrder};
use crate::store::{TableManifest, TableStore};

/// Records sharing one group-by value
#[derive(Debug, Clone, PartialEq)]
pub struct RecordGroup {
    pub key: String,
    pub records: Vec<Record>,
}

impl RecordGroup {
    /// `{key: [record, ..], ..}` in group order
    pub fn to_json_map(groups: &[RecordGroup]) -> serde_json::Value {
        let map = groups
            .iter()
            .map(|g| {
                (
                    g.key.clone(),
                    serde_json::Value::Array(g.records.iter().map(Record::to_json).collect()),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Collects every record of a table under its `group_column` value
pub fn group_records(
    store: &TableStore,
    manifest: &TableManifest,
    group_column: &str,
    options: &SortOptions,
) -> EngineResult<Vec<RecordGroup>> {
    let scope = ObservationScope::with_fields(
        "GROUP_RECORDS",
        &[("table", manifest.table.as_str()), ("column", group_column)],
    );
    let result = (|| -> EngineResult<Vec<RecordGroup>> {
        let order = SortOrder::from(SortKey::ascending(group_column));
        let stream = sort_table_stream(store, manifest, &order, options)?;
        let mut groups = KeyGroups::new(stream, &[group_column.to_string()]);

        let mut out = Vec::new();
        while let Some((mut key, records)) = groups.next_group()? {
            out.push(RecordGroup {
                key: key.pop().unwrap_or_default(),
                records,
            });
        }
        Ok(out)
    })();

    match result {
        Ok(groups) => {
            let count = groups.len().to_string();
            log_event_with_fields(
                Event::RecordsGrouped,
                &[
                    ("table", manifest.table.as_str()),
                    ("column", group_column),
                    ("groups", count.as_str()),
                ],
            );
            scope.complete_with_fields(&[("groups", count.as_str())]);
            Ok(groups)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}
