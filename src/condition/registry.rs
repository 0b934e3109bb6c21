//! Operator registry
//!
//! Maps each operator to its comparison function. Built once and handed to
//! the evaluator; there is no process-wide operator table.

use std::collections::HashMap;

use super::ast::ConditionOp;
use crate::errors::{EngineError, EngineResult};
use crate::record::{coerce_number, Value};

/// Compares a record's field value (left) with a condition literal (right)
pub type Comparator = fn(&Value, &Value) -> EngineResult<bool>;

/// Operator → comparison function table
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    comparators: HashMap<ConditionOp, Comparator>,
}

impl OperatorRegistry {
    /// Registry with the seven standard operators
    pub fn standard() -> Self {
        let comparators: HashMap<ConditionOp, Comparator> = HashMap::from([
            (ConditionOp::Eq, text_eq as Comparator),
            (ConditionOp::Ne, text_ne as Comparator),
            (ConditionOp::Gt, numeric_gt as Comparator),
            (ConditionOp::Lt, numeric_lt as Comparator),
            (ConditionOp::Ge, numeric_ge as Comparator),
            (ConditionOp::Le, numeric_le as Comparator),
            (ConditionOp::Contains, text_contains as Comparator),
        ]);
        Self { comparators }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            comparators: HashMap::new(),
        }
    }

    /// Looks up the comparator for an operator
    pub fn get(&self, op: ConditionOp) -> EngineResult<Comparator> {
        self.comparators.get(&op).copied().ok_or_else(|| {
            EngineError::invalid_format("Operator is not registered")
                .with_details(format!("operator: {}", op))
        })
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn text_eq(field: &Value, literal: &Value) -> EngineResult<bool> {
    Ok(field.raw_text() == literal.raw_text())
}

fn text_ne(field: &Value, literal: &Value) -> EngineResult<bool> {
    Ok(field.raw_text() != literal.raw_text())
}

fn numeric_pair(field: &Value, literal: &Value) -> EngineResult<(f64, f64)> {
    let a = coerce_number(field, "Field value is not numeric")?;
    let b = coerce_number(literal, "Condition literal is not numeric")?;
    Ok((a, b))
}

fn numeric_gt(field: &Value, literal: &Value) -> EngineResult<bool> {
    numeric_pair(field, literal).map(|(a, b)| a > b)
}

fn numeric_lt(field: &Value, literal: &Value) -> EngineResult<bool> {
    numeric_pair(field, literal).map(|(a, b)| a < b)
}

fn numeric_ge(field: &Value, literal: &Value) -> EngineResult<bool> {
    numeric_pair(field, literal).map(|(a, b)| a >= b)
}

fn numeric_le(field: &Value, literal: &Value) -> EngineResult<bool> {
    numeric_pair(field, literal).map(|(a, b)| a <= b)
}

fn text_contains(field: &Value, literal: &Value) -> EngineResult<bool> {
    let haystack = field.as_str().ok_or_else(|| {
        EngineError::type_coercion(&field.raw_text(), "contains requires a string field")
    })?;
    Ok(haystack.contains(literal.raw_text().as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_standard_registry_has_every_operator() {
        let registry = OperatorRegistry::standard();
        for op in ConditionOp::ALL {
            assert!(registry.get(op).is_ok(), "missing {}", op);
        }
    }

    #[test]
    fn test_empty_registry_rejects_lookup() {
        let registry = OperatorRegistry::empty();
        assert_eq!(
            registry.get(ConditionOp::Eq).unwrap_err().kind(),
            ErrorKind::InvalidFormat
        );
    }

    #[test]
    fn test_eq_is_textual() {
        // "2020" and 2020 share raw text; "2020.0" does not
        assert!(text_eq(&Value::from("2020"), &Value::from(2020i64)).unwrap());
        assert!(!text_eq(&Value::from("2020.0"), &Value::from(2020i64)).unwrap());
    }

    #[test]
    fn test_numeric_ops_coerce_both_sides() {
        assert!(numeric_gt(&Value::from("10"), &Value::from("9")).unwrap());
        assert!(numeric_le(&Value::from("9"), &Value::from(9i64)).unwrap());
        let err = numeric_gt(&Value::from("ten"), &Value::from("9")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeCoercion);
    }

    #[test]
    fn test_contains_requires_string_field() {
        assert!(text_contains(&Value::from("Model Y"), &Value::from("Y")).unwrap());
        let err = text_contains(&Value::from(5i64), &Value::from("5")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeCoercion);
    }
}
