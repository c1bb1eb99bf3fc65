//! ESDR Time Series Aggregation
//!
//! Summary statistics for tile points. A bin summary keeps the count, the
//! mean, and the sum of squared deviations from the mean, which is enough to
//! merge summaries exactly: combining child bins with the pooled-variance
//! formula gives the same result as summarising their raw samples directly.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};

// =============================================================================
// Bin Statistics
// =============================================================================

/// Aggregate of the raw samples falling in one bin.
///
/// Never constructed with `count == 0`; an empty bin is `None` at the call
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinStats {
    pub count: u64,
    pub mean: f64,
    /// Sum of squared deviations from `mean`.
    pub m2: f64,
}

impl BinStats {
    /// Summary of a single value.
    pub fn single(value: f64) -> Self {
        Self {
            count: 1,
            mean: value,
            m2: 0.0,
        }
    }

    /// Summarise raw values. Returns `None` when there are none.
    pub fn from_values<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut acc = StatsAccumulator::new();
        for value in values {
            acc.push(value);
        }
        acc.finish()
    }

    /// Merge child summaries with the pooled (parallel) variance formula.
    /// Empty children contribute nothing; all-empty input yields `None`.
    pub fn combine<'a, I>(children: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a BinStats>,
    {
        let children: Vec<&BinStats> = children.into_iter().filter(|c| c.count > 0).collect();

        let count: u64 = children.iter().map(|c| c.count).sum();
        if count == 0 {
            return None;
        }

        let total = count as f64;
        let mean = children
            .iter()
            .map(|c| c.mean * c.count as f64)
            .sum::<f64>()
            / total;

        // within-group plus between-group sum of squares
        let m2 = children
            .iter()
            .map(|c| {
                let delta = c.mean - mean;
                c.m2 + c.count as f64 * delta * delta
            })
            .sum::<f64>();

        Some(Self {
            count,
            mean,
            m2: m2.max(0.0),
        })
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.m2 / self.count as f64
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

// =============================================================================
// Streaming Accumulator
// =============================================================================

/// Welford accumulator used to summarise raw values in one pass.
#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value to the accumulator.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self) -> Option<BinStats> {
        if self.count == 0 {
            return None;
        }
        Some(BinStats {
            count: self.count,
            mean: self.mean,
            m2: self.m2.max(0.0),
        })
    }

    /// Reset the accumulator.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// Tests
// =============================================================================
