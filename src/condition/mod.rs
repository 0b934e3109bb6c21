//! Condition evaluator for synthquery
//!
//! # Semantics
//!
//! - eq/ne compare raw text, no coercion
//! - gt/lt/ge/le coerce both sides to numbers
//! - contains requires a string field and tests for a substring
//! - a missing field never matches
//! - a conjunction is the AND of its conditions

mod ast;
mod evaluator;
mod registry;

pub use ast::{Condition, ConditionOp, Conjunction};
pub use evaluator::{ConditionEvaluator, MatchOutcome};
pub use registry::{Comparator, OperatorRegistry};
