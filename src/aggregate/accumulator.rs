//! Per-(group, column) accumulators

use std::cmp::Ordering;

use super::function::AggregateFn;

/// Exact floating-point sum.
///
/// Keeps a list of non-overlapping partials so the rounded result is the
/// correctly rounded sum of every input, whatever the order of additions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExactSum {
    partials: Vec<f64>,
}

impl ExactSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        let mut x = value;
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.partials.truncate(kept);
        self.partials.push(x);
    }

    pub fn merge(&mut self, other: &ExactSum) {
        for p in &other.partials {
            self.add(*p);
        }
    }

    /// Correctly rounded total
    pub fn value(&self) -> f64 {
        let p = &self.partials;
        let mut n = p.len();
        if n == 0 {
            return 0.0;
        }
        n -= 1;
        let mut hi = p[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = p[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // round-half-even correction when the remaining partials push past a tie
        if n > 0 && ((lo < 0.0 && p[n - 1] < 0.0) || (lo > 0.0 && p[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }
}

/// Accumulated state for one (group, column) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnBucket {
    sum: ExactSum,
    numeric: u64,
    /// Cells that failed coercion; only `count` includes them
    skipped: u64,
    min: Option<f64>,
    max: Option<f64>,
}

impl ColumnBucket {
    pub fn accumulate(&mut self, value: f64) {
        self.sum.add(value);
        self.numeric += 1;
        self.min = Some(match self.min {
            Some(m) if m.total_cmp(&value) != Ordering::Greater => m,
            _ => value,
        });
        self.max = Some(match self.max {
            Some(m) if m.total_cmp(&value) != Ordering::Less => m,
            _ => value,
        });
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn merge(&mut self, other: &ColumnBucket) {
        self.sum.merge(&other.sum);
        self.numeric += other.numeric;
        self.skipped += other.skipped;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(if b.total_cmp(&a) == Ordering::Less { b } else { a }),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(if b.total_cmp(&a) == Ordering::Greater { b } else { a }),
            (a, b) => a.or(b),
        };
    }

    pub fn numeric_count(&self) -> u64 {
        self.numeric
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped
    }

    /// Whether the function has anything to report for this bucket
    pub fn has_result(&self, function: AggregateFn) -> bool {
        match function {
            AggregateFn::Count => self.numeric + self.skipped > 0,
            _ => self.numeric > 0,
        }
    }

    /// Final value; empty buckets yield 0
    pub fn finalize(&self, function: AggregateFn) -> f64 {
        match function {
            AggregateFn::Sum => self.sum.value(),
            AggregateFn::Mean => {
                if self.numeric == 0 {
                    0.0
                } else {
                    self.sum.value() / self.numeric as f64
                }
            }
            AggregateFn::Min => self.min.unwrap_or(0.0),
            AggregateFn::Max => self.max.unwrap_or(0.0),
            AggregateFn::Count => (self.numeric + self.skipped) as f64,
        }
    }
}
