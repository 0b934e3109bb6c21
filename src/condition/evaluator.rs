//! Condition evaluation over records
//!
//! A missing field never matches. A coercion failure raised by an operator
//! makes the record non-matching; the batch continues.

use super::ast::{Condition, Conjunction};
use super::registry::OperatorRegistry;
use crate::errors::{EngineResult, ErrorKind};
use crate::record::Record;

/// Outcome of checking one record against a conjunction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Every condition held
    Matched,
    /// Some condition was false or its field was absent
    Rejected,
    /// Some operator could not coerce its operands
    CoercionFailed,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched)
    }
}

/// Evaluates conditions through an operator registry
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    registry: OperatorRegistry,
}

impl ConditionEvaluator {
    pub fn new(registry: OperatorRegistry) -> Self {
        Self { registry }
    }

    /// Evaluates a single condition. Errors are `TypeCoercion` from the
    /// operator or `InvalidFormat` for an unregistered operator.
    pub fn evaluate(&self, record: &Record, condition: &Condition) -> EngineResult<bool> {
        let field_value = match record.get(&condition.field) {
            Some(v) => v,
            None => return Ok(false),
        };
        let comparator = self.registry.get(condition.op)?;
        comparator(field_value, &condition.value)
    }

    /// Checks a record against every condition, stopping at the first
    /// non-match.
    pub fn check(&self, record: &Record, conjunction: &Conjunction) -> EngineResult<MatchOutcome> {
        for condition in conjunction.conditions() {
            match self.evaluate(record, condition) {
                Ok(true) => {}
                Ok(false) => return Ok(MatchOutcome::Rejected),
                Err(e) if e.kind() == ErrorKind::TypeCoercion => {
                    return Ok(MatchOutcome::CoercionFailed)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(MatchOutcome::Matched)
    }

    /// Logical AND of all conditions; coercion failures do not match
    pub fn matches(&self, record: &Record, conjunction: &Conjunction) -> EngineResult<bool> {
        Ok(self.check(record, conjunction)?.is_match())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ast::ConditionOp;

    fn doc() -> Record {
        Record::from_pairs([("Make", "TESLA"), ("Model", "MODEL Y"), ("Year", "2020")])
    }

    #[test]
    fn test_equality_match() {
        let eval = ConditionEvaluator::default();
        assert!(eval.evaluate(&doc(), &Condition::eq("Make", "TESLA")).unwrap());
        assert!(!eval.evaluate(&doc(), &Condition::eq("Make", "FORD")).unwrap());
        assert!(eval.evaluate(&doc(), &Condition::ne("Make", "FORD")).unwrap());
    }

    #[test]
    fn test_missing_field_no_match() {
        let eval = ConditionEvaluator::default();
        assert!(!eval.evaluate(&doc(), &Condition::eq("Color", "red")).unwrap());
        // ne on a missing field is also non-matching
        assert!(!eval.evaluate(&doc(), &Condition::ne("Color", "red")).unwrap());
    }

    #[test]
    fn test_range_on_numeric_text() {
        let eval = ConditionEvaluator::default();
        let conj = Conjunction::new(vec![
            Condition::ge("Year", 2020i64),
            Condition::lt("Year", "2021"),
        ]);
        assert_eq!(eval.check(&doc(), &conj).unwrap(), MatchOutcome::Matched);
    }

    #[test]
    fn test_coercion_failure_is_non_matching() {
        let eval = ConditionEvaluator::default();
        let conj = Conjunction::new(vec![Condition::gt("Make", 10i64)]);
        assert_eq!(
            eval.check(&doc(), &conj).unwrap(),
            MatchOutcome::CoercionFailed
        );
        assert!(!eval.matches(&doc(), &conj).unwrap());
    }

    #[test]
    fn test_contains() {
        let eval = ConditionEvaluator::default();
        assert!(eval
            .evaluate(&doc(), &Condition::contains("Model", "Y"))
            .unwrap());
    }

    #[test]
    fn test_conjunction_and_semantics() {
        let eval = ConditionEvaluator::default();
        let yes = Conjunction::new(vec![
            Condition::eq("Make", "TESLA"),
            Condition::gt("Year", 2019i64),
        ]);
        let no = Conjunction::new(vec![
            Condition::eq("Make", "TESLA"),
            Condition::gt("Year", 2020i64),
        ]);
        assert!(eval.matches(&doc(), &yes).unwrap());
        assert!(!eval.matches(&doc(), &no).unwrap());
        assert!(eval.matches(&doc(), &Conjunction::all()).unwrap());
    }

    #[test]
    fn test_unregistered_operator_is_an_error() {
        let eval = ConditionEvaluator::new(OperatorRegistry::empty());
        let cond = Condition::new("Make", ConditionOp::Eq, "TESLA");
        assert!(eval.evaluate(&doc(), &cond).is_err());
    }
}
