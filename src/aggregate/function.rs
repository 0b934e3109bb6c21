//! Aggregate function names

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Aggregate operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Sum,
    Mean,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    pub const ALL: [AggregateFn; 5] = [
        AggregateFn::Sum,
        AggregateFn::Mean,
        AggregateFn::Min,
        AggregateFn::Max,
        AggregateFn::Count,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Mean => "mean",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Count => "count",
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFn {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        AggregateFn::ALL
            .into_iter()
            .find(|f| f.name() == lowered)
            .ok_or_else(|| {
                EngineError::invalid_format("Unknown aggregate function")
                    .with_details(format!("function: {}", s))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("count".parse::<AggregateFn>().unwrap(), AggregateFn::Count);
        assert_eq!(" Mean ".parse::<AggregateFn>().unwrap(), AggregateFn::Mean);
        assert_eq!("avg".parse::<AggregateFn>().unwrap_err().code(), "SQ_INVALID_FORMAT");
    }
}
