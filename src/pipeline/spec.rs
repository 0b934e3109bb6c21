//! Query request parsing
//!
//! Request JSON:
//!
//! ```json
//! {
//!   "where": {"Make": {"operator": "eq", "value": "TESLA"}},
//!   "groupby": "Model",
//!   "agg": "count",
//!   "having": {"Year": {"operator": "gt", "value": 1}},
//!   "order_col": "Group",
//!   "ascending": "T",
//!   "numeric": false,
//!   "project": ["Group", "Year"]
//! }
//! ```
//!
//! `where` and `having` may also be JSON-encoded strings; `order_col` and
//! `project` may be comma-separated strings; `ascending` accepts booleans or T/True/true/F/False/false.

use serde::Deserialize;

use crate::aggregate::AggregateFn;
use crate::condition::Conjunction;
use crate::errors::{EngineError, EngineResult};
use crate::sort::SortOrder;

/// Parses the ascending flag spellings
pub fn parse_ascending(text: &str) -> EngineResult<bool> {
    match text.trim() {
        "T" | "True" | "true" => Ok(true),
        "F" | "False" | "false" => Ok(false),
        other => Err(EngineError::invalid_format("Invalid ascending flag")
            .with_details(format!("ascending: {:?}", other))),
    }
}

/// Splits `"a, b,c"` into trimmed, non-empty column names
pub fn parse_columns(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

/// Typed query; every stage is optional
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Option<Conjunction>,
    pub group_by: Option<String>,
    pub aggregate: Option<AggregateFn>,
    pub having: Option<Conjunction>,
    pub order: Option<SortOrder>,
    pub project: Option<Vec<String>>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, conjunction: Conjunction) -> Self {
        self.filter = Some(conjunction);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>, function: AggregateFn) -> Self {
        self.group_by = Some(column.into());
        self.aggregate = Some(function);
        self
    }

    pub fn having(mut self, conjunction: Conjunction) -> Self {
        self.having = Some(conjunction);
        self
    }

    pub fn order(mut self, order: impl Into<SortOrder>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn project(mut self, columns: Vec<String>) -> Self {
        self.project = Some(columns);
        self
    }

    /// Group column and function, only when both are present
    pub fn grouping(&self) -> Option<(&str, AggregateFn)> {
        match (&self.group_by, self.aggregate) {
            (Some(column), Some(function)) => Some((column.as_str(), function)),
            _ => None,
        }
    }

    pub fn parse(text: &str) -> EngineResult<Self> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EngineError::invalid_format_with("Invalid JSON string", e))?;
        Self::from_json(json)
    }

    pub fn from_json(json: serde_json::Value) -> EngineResult<Self> {
        let request: QueryRequest = serde_json::from_value(json)
            .map_err(|e| EngineError::invalid_format_with("Malformed query request", e))?;
        request.into_spec()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueryRequest {
    #[serde(default, rename = "where")]
    filter: Option<serde_json::Value>,
    #[serde(default)]
    groupby: Option<String>,
    #[serde(default)]
    agg: Option<String>,
    #[serde(default)]
    having: Option<serde_json::Value>,
    #[serde(default)]
    order_col: Option<String>,
    #[serde(default)]
    ascending: Option<serde_json::Value>,
    #[serde(default)]
    numeric: bool,
    #[serde(default, alias = "project_col")]
    project: Option<serde_json::Value>,
}

impl QueryRequest {
    fn into_spec(self) -> EngineResult<QuerySpec> {
        let ascending = match self.ascending {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::String(s)) => parse_ascending(&s)?,
            Some(other) => {
                return Err(EngineError::invalid_format("Invalid ascending flag")
                    .with_details(format!("ascending: {}", other)))
            }
        };

        Ok(QuerySpec {
            filter: conjunction(self.filter)?,
            group_by: self.groupby.filter(|g| !g.is_empty()),
            aggregate: self
                .agg
                .filter(|a| !a.is_empty())
                .map(|a| a.parse())
                .transpose()?,
            having: conjunction(self.having)?,
            order: self
                .order_col
                .filter(|c| !c.trim().is_empty())
                .map(|c| SortOrder::parse(&c, ascending, self.numeric))
                .transpose()?,
            project: columns(self.project)?,
        })
    }
}

fn conjunction(json: Option<serde_json::Value>) -> EngineResult<Option<Conjunction>> {
    match json {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(text)) => Conjunction::parse(&text).map(Some),
        Some(other) => Conjunction::from_json(&other).map(Some),
    }
}

fn columns(json: Option<serde_json::Value>) -> EngineResult<Option<Vec<String>>> {
    let list = match json {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(text)) => parse_columns(&text),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => Ok(s.trim().to_string()),
                other => Err(EngineError::invalid_format("Project column must be a string")
                    .with_details(format!("got: {}", other))),
            })
            .collect::<EngineResult<Vec<_>>>()?,
        Some(other) => {
            return Err(EngineError::invalid_format("Invalid project list")
                .with_details(format!("got: {}", other)))
        }
    };
    Ok(if list.is_empty() { None } else { Some(list) })
}
