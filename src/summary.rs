// src/summary.rs
//
// Aggregator/Reporter: reduces evaluator output into point estimates,
// nested-uncertainty confidence intervals, and empirical distribution
// functions.
//
// All functions are deterministic and avoid HashMap to ensure stable
// ordering. Quantiles use linear interpolation between order statistics
// on the sorted finite subset; both evaluators are reduced with the same
// code so cross-form equivalence is exact rather than approximate.

use serde::{Deserialize, Serialize};

use crate::error::McError;
use crate::eval::{CutLoopResult, FullMatrixResult};

/// Quantile levels of the nested-uncertainty confidence interval
/// reported by `mean_of_reducer`: [2.5%, 50%, 97.5%].
pub const CI_QUANTILES: [f64; 3] = [0.025, 0.50, 0.975];

// ============================================================================
// Quantile computation
// ============================================================================

/// Compute a single quantile from a sorted slice using linear
/// interpolation. `p` is in [0, 1]. Returns NaN for empty slices.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let p = p.clamp(0.0, 1.0);
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let idx = p * (n.saturating_sub(1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi || lo >= n {
        return sorted[lo.min(n - 1)];
    }
    let w = idx - (lo as f64);
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

/// Compute multiple quantiles at once. Non-finite values are filtered
/// before sorting; results come back in the same order as `ps`.
pub fn compute_quantiles(data: &[f64], ps: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    ps.iter().map(|&p| quantile_sorted(&finite, p)).collect()
}

// ============================================================================
// Reducers and point estimates
// ============================================================================

/// Per-column reducer applied along the variability axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Median,
}

impl Reducer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Mean => "mean",
            Reducer::Median => "median",
        }
    }

    /// Reduce one length-`nsv` sample to a scalar.
    pub fn apply(&self, sample: &[f64]) -> f64 {
        match self {
            Reducer::Mean => {
                if sample.is_empty() {
                    f64::NAN
                } else {
                    sample.iter().sum::<f64>() / sample.len() as f64
                }
            }
            Reducer::Median => compute_quantiles(sample, &[0.5])[0],
        }
    }
}

/// A point estimate with its nested-uncertainty confidence interval:
/// the chosen reducer applied per uncertainty column, then mean and
/// [2.5%, 50%, 97.5%] quantiles taken across the `nsu` reduced values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEstimate {
    pub reducer: Reducer,
    pub mean: f64,
    pub ci_lower: f64,
    pub median: f64,
    pub ci_upper: f64,
    pub nsu: usize,
}

fn point_estimate_from_reduced(reducer: Reducer, reduced: &[f64]) -> PointEstimate {
    let qs = compute_quantiles(reduced, &CI_QUANTILES);
    let finite: Vec<f64> = reduced.iter().copied().filter(|x| x.is_finite()).collect();
    let mean = if finite.is_empty() {
        f64::NAN
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    };
    PointEstimate {
        reducer,
        mean,
        ci_lower: qs[0],
        median: qs[1],
        ci_upper: qs[2],
        nsu: reduced.len(),
    }
}

/// Reduce each uncertainty column of a full-matrix result, then summarize
/// the `nsu` reduced values.
pub fn mean_of_reducer(result: &FullMatrixResult, reducer: Reducer) -> PointEstimate {
    let reduced: Vec<f64> = (0..result.nsu)
        .map(|j| reducer.apply(&result.data.column(j)))
        .collect();
    point_estimate_from_reduced(reducer, &reduced)
}

/// Same reduction over a cut-loop result's retained summaries.
///
/// Mean comes straight from the per-iteration summaries; Median requires
/// the 0.5 level to be part of the result's quantile schema.
pub fn mean_of_reducer_summaries(
    result: &CutLoopResult,
    reducer: Reducer,
) -> Result<PointEstimate, McError> {
    let reduced: Vec<f64> = match reducer {
        Reducer::Mean => result.iterations.iter().map(|it| it.mean).collect(),
        Reducer::Median => {
            let median_idx = result
                .quantile_levels
                .iter()
                .position(|q| (q - 0.5).abs() < 1e-12)
                .ok_or_else(|| McError::InvalidParams {
                    context: "mean_of_reducer_summaries".to_string(),
                    message: "cut-loop result has no 0.5 quantile level".to_string(),
                })?;
            result
                .iterations
                .iter()
                .map(|it| it.quantiles[median_idx])
                .collect()
        }
    };
    Ok(point_estimate_from_reduced(reducer, &reduced))
}

// ============================================================================
// Empirical distribution function
// ============================================================================

/// Empirical CDF: a monotonically non-decreasing step function from 0 to
/// 1 over the sorted unique finite values of the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ecdf {
    /// Sorted unique values (step positions).
    xs: Vec<f64>,
    /// Cumulative probability at and after each step.
    ps: Vec<f64>,
}

impl Ecdf {
    /// Build from any finite sequence. Non-finite inputs are ignored.
    pub fn from_values(values: &[f64]) -> Ecdf {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();

        let mut xs = Vec::new();
        let mut ps = Vec::new();
        let mut count = 0usize;
        let mut i = 0usize;
        while i < n {
            let x = sorted[i];
            while i < n && sorted[i] == x {
                count += 1;
                i += 1;
            }
            xs.push(x);
            ps.push(count as f64 / n as f64);
        }
        Ecdf { xs, ps }
    }

    /// Number of steps (unique values).
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// F(x): fraction of the sample <= x. 0 below the minimum, 1 at and
    /// beyond the maximum; 0 for an empty sample.
    pub fn eval(&self, x: f64) -> f64 {
        match self.xs.partition_point(|&v| v <= x) {
            0 => 0.0,
            k => self.ps[k - 1],
        }
    }

    /// Step positions and their cumulative probabilities, for plotting
    /// collaborators.
    pub fn steps(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ps.iter().copied())
    }
}

// ============================================================================
// Running statistics
// ============================================================================

/// Streaming mean/variance/min/max accumulator (Welford).
#[derive(Debug, Clone, Default)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl OnlineStats {
    pub fn add(&mut self, x: f64) {
        if self.n == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    pub fn stddev_population(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            (self.m2 / self.n as f64).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.max
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let sorted: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        // p=0.05 over 10 elements: index 0.45 -> 1*0.55 + 2*0.45 = 1.45.
        assert!(approx_eq(quantile_sorted(&sorted, 0.05), 1.45, 0.01));
        assert!(approx_eq(quantile_sorted(&sorted, 0.5), 5.5, EPSILON));
        assert!(approx_eq(quantile_sorted(&sorted, 1.0), 10.0, EPSILON));
        assert!(quantile_sorted(&[], 0.5).is_nan());
        assert!(approx_eq(quantile_sorted(&[42.0], 0.9), 42.0, EPSILON));
    }

    #[test]
    fn compute_quantiles_ignores_non_finite() {
        let data = vec![1.0, f64::NAN, 2.0, f64::INFINITY, 3.0];
        let qs = compute_quantiles(&data, &[0.0, 0.5, 1.0]);
        assert_eq!(qs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reducers_on_simple_samples() {
        let sample = vec![1.0, 2.0, 3.0, 4.0];
        assert!(approx_eq(Reducer::Mean.apply(&sample), 2.5, EPSILON));
        assert!(approx_eq(Reducer::Median.apply(&sample), 2.5, EPSILON));
        assert!(Reducer::Mean.apply(&[]).is_nan());
    }

    #[test]
    fn ecdf_is_monotone_and_bounded() {
        let values = vec![3.0, 1.0, 2.0, 2.0, 5.0];
        let ecdf = Ecdf::from_values(&values);

        assert_eq!(ecdf.len(), 4);
        let mut prev = 0.0;
        for (_, p) in ecdf.steps() {
            assert!(p >= prev && (0.0..=1.0).contains(&p));
            prev = p;
        }
        assert!(approx_eq(prev, 1.0, EPSILON));

        assert_eq!(ecdf.eval(0.5), 0.0);
        assert!(approx_eq(ecdf.eval(2.0), 0.6, EPSILON));
        assert!(approx_eq(ecdf.eval(5.0), 1.0, EPSILON));
        assert!(approx_eq(ecdf.eval(100.0), 1.0, EPSILON));
    }

    #[test]
    fn ecdf_of_empty_input_is_zero_everywhere() {
        let ecdf = Ecdf::from_values(&[f64::NAN]);
        assert!(ecdf.is_empty());
        assert_eq!(ecdf.eval(0.0), 0.0);
    }

    #[test]
    fn online_stats_match_direct_computation() {
        let xs = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut stats = OnlineStats::default();
        for &x in &xs {
            stats.add(x);
        }
        assert!(approx_eq(stats.mean(), 5.0, EPSILON));
        assert!(approx_eq(stats.stddev_population(), 2.0, EPSILON));
        assert_eq!(stats.min(), 2.0);
        assert_eq!(stats.max(), 9.0);
        assert_eq!(stats.count(), 8);

        let empty = OnlineStats::default();
        assert!(empty.mean().is_nan());
        assert!(empty.min().is_nan());
    }
}
