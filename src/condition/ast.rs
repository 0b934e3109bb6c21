//! Condition structures and their JSON request form
//!
//! Accepted JSON shapes for a conjunction:
//!
//! ```text
//! {"Make": {"operator": "eq", "value": "TESLA"}, "Year": {"operator": "ge", "value": 2020}}
//! {"Make": "TESLA"}                  // shorthand for eq
//! {"Make": {"value": "TESLA"}}       // operator defaults to eq
//! ```

use std::fmt;
use std::str::FromStr;

use crate::errors::{EngineError, EngineResult};
use crate::record::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
}

impl ConditionOp {
    /// All operators, in registry order
    pub const ALL: [ConditionOp; 7] = [
        ConditionOp::Eq,
        ConditionOp::Ne,
        ConditionOp::Gt,
        ConditionOp::Lt,
        ConditionOp::Ge,
        ConditionOp::Le,
        ConditionOp::Contains,
    ];

    /// Returns the request name of the operator
    pub fn name(&self) -> &'static str {
        match self {
            ConditionOp::Eq => "eq",
            ConditionOp::Ne => "ne",
            ConditionOp::Gt => "gt",
            ConditionOp::Lt => "lt",
            ConditionOp::Ge => "ge",
            ConditionOp::Le => "le",
            ConditionOp::Contains => "contains",
        }
    }

    /// Returns true for the ordered comparisons that coerce to numbers
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ConditionOp::Gt | ConditionOp::Lt | ConditionOp::Ge | ConditionOp::Le
        )
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConditionOp {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConditionOp::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| {
                EngineError::invalid_format("Unknown condition operator")
                    .with_details(format!("operator: {}", s))
            })
    }
}

/// A single predicate: field, operator, literal
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Gt, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Lt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Ge, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Le, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, ConditionOp::Contains, value)
    }
}

/// A conjunction of conditions; all must hold
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conjunction {
    conditions: Vec<Condition>,
}

impl Conjunction {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    /// An empty conjunction matches every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Fields referenced by the conjunction, in order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.field.as_str())
    }

    /// Parses a JSON request string
    pub fn parse(text: &str) -> EngineResult<Self> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EngineError::invalid_format_with("Invalid JSON string", e))?;
        Self::from_json(&json)
    }

    /// Parses the decoded JSON request form
    pub fn from_json(json: &serde_json::Value) -> EngineResult<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| EngineError::invalid_format("Conditions must be a JSON object"))?;

        let mut conditions = Vec::with_capacity(map.len());
        for (field, spec) in map {
            let condition = match spec {
                serde_json::Value::Object(obj) => {
                    let op = match obj.get("operator") {
                        None => ConditionOp::Eq,
                        Some(serde_json::Value::String(name)) => name.parse()?,
                        Some(other) => {
                            return Err(EngineError::invalid_format("Operator must be a string")
                                .with_details(format!("field: {}, operator: {}", field, other)))
                        }
                    };
                    let value = obj.get("value").cloned().ok_or_else(|| {
                        EngineError::invalid_format("Condition is missing a value")
                            .with_details(format!("field: {}", field))
                    })?;
                    Condition::new(field.clone(), op, Value::from_json(value)?)
                }
                scalar => Condition::eq(field.clone(), Value::from_json(scalar.clone())?),
            };
            conditions.push(condition);
        }

        Ok(Self { conditions })
    }
}

impl From<Vec<Condition>> for Conjunction {
    fn from(conditions: Vec<Condition>) -> Self {
        Self::new(conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        let c = Conjunction::parse(
            r#"{"Make": {"operator": "eq", "value": "TESLA"}, "Year": {"operator": "ge", "value": 2020}}"#,
        )
        .unwrap();
        assert_eq!(c.conditions().len(), 2);
        assert_eq!(c.conditions()[0], Condition::eq("Make", "TESLA"));
        assert_eq!(c.conditions()[1], Condition::ge("Year", 2020i64));
    }

    #[test]
    fn test_parse_shorthand_and_default_operator() {
        let c = Conjunction::parse(r#"{"column3": "value10", "column4": {"value": "x"}}"#).unwrap();
        assert_eq!(c.conditions()[0].op, ConditionOp::Eq);
        assert_eq!(c.conditions()[1].op, ConditionOp::Eq);
    }

    #[test]
    fn test_parse_rejects_unknown_operator() {
        let err = Conjunction::parse(r#"{"a": {"operator": "like", "value": "x"}}"#).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        assert!(Conjunction::parse("{not json").is_err());
        assert!(Conjunction::parse("[1,2]").is_err());
    }

    #[test]
    fn test_operator_names_roundtrip() {
        for op in ConditionOp::ALL {
            assert_eq!(op.name().parse::<ConditionOp>().unwrap(), op);
        }
    }
}
