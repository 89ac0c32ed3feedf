// src/sampler.rs
//
// Seeded sampler for stochastic node realization.
//
// The reproducibility contract: the sampler resets its backing ChaCha8
// stream to the caller's seed before every draw. It never advances the
// seed as a side effect of previous calls, so `draw` with identical
// arguments yields bit-identical output regardless of how many other
// draws happened in between. This is the property the full-matrix
// evaluator leans on when it re-realizes variability nodes per column.
//
// All sampling is deterministic given a seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::McError;

/// A parametric distribution for a sampled node.
///
/// Parameters are validated before any draw; invalid parameters fail with
/// `McError::DistributionParam` and never produce a partial sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Distribution {
    /// Log-normal: `exp(meanlog + sdlog * z)` with `z ~ N(0, 1)`.
    LogNormal { meanlog: f64, sdlog: f64 },
    /// Normal left-truncated at `lower`, sampled by inverse CDF restricted
    /// to the truncated support.
    TruncNormal { mean: f64, sd: f64, lower: f64 },
    /// Discrete empirical distribution. Weights need not be normalized but
    /// must be non-negative and sum to a positive value.
    Empirical { values: Vec<f64>, weights: Vec<f64> },
}

impl Distribution {
    /// Stable identifier used in error messages and output schemas.
    pub fn name(&self) -> &'static str {
        match self {
            Distribution::LogNormal { .. } => "log_normal",
            Distribution::TruncNormal { .. } => "trunc_normal",
            Distribution::Empirical { .. } => "empirical",
        }
    }

    /// Check parameters against the distribution's valid domain.
    pub fn validate(&self) -> Result<(), McError> {
        let fail = |message: String| {
            Err(McError::DistributionParam {
                distribution: self.name(),
                message,
            })
        };

        match self {
            Distribution::LogNormal { meanlog, sdlog } => {
                if !meanlog.is_finite() || !sdlog.is_finite() {
                    return fail("meanlog and sdlog must be finite".to_string());
                }
                if *sdlog <= 0.0 {
                    return fail(format!("sdlog must be > 0 (got {})", sdlog));
                }
                Ok(())
            }
            Distribution::TruncNormal { mean, sd, lower } => {
                if !mean.is_finite() || !sd.is_finite() || !lower.is_finite() {
                    return fail("mean, sd and lower must be finite".to_string());
                }
                if *sd <= 0.0 {
                    return fail(format!("sd must be > 0 (got {})", sd));
                }
                Ok(())
            }
            Distribution::Empirical { values, weights } => {
                if values.is_empty() {
                    return fail("values must be non-empty".to_string());
                }
                if values.len() != weights.len() {
                    return fail(format!(
                        "values ({}) and weights ({}) must have equal length",
                        values.len(),
                        weights.len()
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return fail("values must be finite".to_string());
                }
                let mut total = 0.0;
                for w in weights {
                    if !w.is_finite() || *w < 0.0 {
                        return fail(format!("weights must be non-negative (got {})", w));
                    }
                    total += w;
                }
                if total <= 0.0 {
                    return fail("weights must sum to a positive value".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Deterministic sampler context.
///
/// Holds the RNG explicitly rather than relying on any process-wide state;
/// the stream is reseeded from the caller's seed on every `draw`.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: ChaCha8Rng,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        // The stream is reseeded on every draw, so the initial seed is
        // irrelevant to outputs.
        Self {
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// Draw `count` values from `dist`, resetting the stream to `seed`
    /// first. Identical arguments yield bit-identical sequences.
    pub fn draw(
        &mut self,
        dist: &Distribution,
        count: usize,
        seed: u64,
    ) -> Result<Vec<f64>, McError> {
        dist.validate()?;
        self.rng = ChaCha8Rng::seed_from_u64(seed);

        let mut out = Vec::with_capacity(count);
        match dist {
            Distribution::LogNormal { meanlog, sdlog } => {
                for _ in 0..count {
                    let z = normal_quantile(self.uniform_open01());
                    out.push((meanlog + sdlog * z).exp());
                }
            }
            Distribution::TruncNormal { mean, sd, lower } => {
                let f_lower = normal_cdf((lower - mean) / sd);
                for _ in 0..count {
                    // u ~ U(F(lower), 1), mapped through the probit.
                    let u = f_lower + self.uniform_open01() * (1.0 - f_lower);
                    let x = mean + sd * normal_quantile(u.min(1.0 - f64::EPSILON));
                    out.push(x.max(*lower));
                }
            }
            Distribution::Empirical { values, weights } => {
                let total: f64 = weights.iter().sum();
                for _ in 0..count {
                    let target = self.rng.gen::<f64>() * total;
                    let mut acc = 0.0;
                    let mut picked = values[values.len() - 1];
                    for (v, w) in values.iter().zip(weights.iter()) {
                        acc += w;
                        if target < acc {
                            picked = *v;
                            break;
                        }
                    }
                    out.push(picked);
                }
            }
        }
        Ok(out)
    }

    /// Uniform draw in the open interval (0, 1).
    ///
    /// `gen::<f64>()` yields [0, 1); zero is rejected so the probit never
    /// sees the endpoints.
    fn uniform_open01(&mut self) -> f64 {
        loop {
            let u = self.rng.gen::<f64>();
            if u > 0.0 {
                return u;
            }
        }
    }
}

// ============================================================================
// Normal CDF and quantile
// ============================================================================

/// Standard normal CDF via the Abramowitz-Stegun 26.2.17 polynomial.
/// Absolute error below 7.5e-8.
pub fn normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x > 8.0 {
        return 1.0;
    }
    if x < -8.0 {
        return 0.0;
    }

    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let pdf = (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let tail = pdf * poly;

    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Inverse standard normal CDF (probit).
///
/// Acklam's rational approximation, tightened by one Halley step against
/// `normal_cdf` so truncated-normal sampling stays accurate in the tails.
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    // One Halley refinement step.
    let e = normal_cdf(x) - p;
    let u = e * (2.0 * std::f64::consts::PI).sqrt() * (0.5 * x * x).exp();
    x - u / (1.0 + 0.5 * x * u)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn normal_cdf_known_values() {
        assert!(approx_eq(normal_cdf(0.0), 0.5, 1e-7));
        assert!(approx_eq(normal_cdf(1.96), 0.975, 1e-4));
        assert!(approx_eq(normal_cdf(-1.96), 0.025, 1e-4));
        assert!(approx_eq(normal_cdf(10.0), 1.0, 1e-12));
        assert!(approx_eq(normal_cdf(-10.0), 0.0, 1e-12));
    }

    #[test]
    fn normal_quantile_inverts_cdf() {
        for &p in &[0.001, 0.025, 0.1, 0.5, 0.9, 0.975, 0.999] {
            let x = normal_quantile(p);
            assert!(
                approx_eq(normal_cdf(x), p, 1e-6),
                "round-trip failed at p={}: x={} cdf={}",
                p,
                x,
                normal_cdf(x)
            );
        }
        assert_eq!(normal_quantile(0.0), f64::NEG_INFINITY);
        assert_eq!(normal_quantile(1.0), f64::INFINITY);
    }

    #[test]
    fn draw_is_reproducible() {
        let dist = Distribution::LogNormal {
            meanlog: 0.0,
            sdlog: 1.0,
        };
        let mut sampler = Sampler::new();
        let a = sampler.draw(&dist, 100, 7).unwrap();
        let b = sampler.draw(&dist, 100, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn interleaved_draws_do_not_perturb_stream() {
        let lognorm = Distribution::LogNormal {
            meanlog: -1.0,
            sdlog: 0.5,
        };
        let other = Distribution::TruncNormal {
            mean: 2.0,
            sd: 1.0,
            lower: 0.0,
        };
        let mut sampler = Sampler::new();
        let first = sampler.draw(&lognorm, 50, 3).unwrap();
        for k in 0..5 {
            sampler.draw(&other, 17, 1000 + k).unwrap();
        }
        let second = sampler.draw(&lognorm, 50, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trunc_normal_respects_lower_bound() {
        let dist = Distribution::TruncNormal {
            mean: 0.0,
            sd: 1.0,
            lower: 1.5,
        };
        let mut sampler = Sampler::new();
        let xs = sampler.draw(&dist, 500, 11).unwrap();
        assert!(xs.iter().all(|&x| x >= 1.5));
        // With the support cut at +1.5 sigma, the sample mean must sit
        // above the bound but well below mean + 4 sd.
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        assert!(mean > 1.5 && mean < 4.0, "suspicious mean {}", mean);
    }

    #[test]
    fn empirical_draws_only_listed_values() {
        let dist = Distribution::Empirical {
            values: vec![1.0, 5.0, 9.0],
            weights: vec![2.0, 1.0, 1.0],
        };
        let mut sampler = Sampler::new();
        let xs = sampler.draw(&dist, 200, 5).unwrap();
        assert!(xs.iter().all(|x| [1.0, 5.0, 9.0].contains(x)));
        // Weight 2.0 on value 1.0 should make it the most common draw.
        let ones = xs.iter().filter(|&&x| x == 1.0).count();
        assert!(ones > 50, "expected value 1.0 to dominate, got {}", ones);
    }

    #[test]
    fn invalid_params_are_rejected_before_drawing() {
        let mut sampler = Sampler::new();

        let bad_sdlog = Distribution::LogNormal {
            meanlog: 0.0,
            sdlog: 0.0,
        };
        assert!(matches!(
            sampler.draw(&bad_sdlog, 10, 1),
            Err(McError::DistributionParam { .. })
        ));

        let bad_sd = Distribution::TruncNormal {
            mean: 0.0,
            sd: -1.0,
            lower: 0.0,
        };
        assert!(matches!(
            sampler.draw(&bad_sd, 10, 1),
            Err(McError::DistributionParam { .. })
        ));

        let empty = Distribution::Empirical {
            values: vec![],
            weights: vec![],
        };
        assert!(matches!(
            sampler.draw(&empty, 10, 1),
            Err(McError::DistributionParam { .. })
        ));

        let negative_weight = Distribution::Empirical {
            values: vec![1.0, 2.0],
            weights: vec![0.5, -0.5],
        };
        assert!(matches!(
            sampler.draw(&negative_weight, 10, 1),
            Err(McError::DistributionParam { .. })
        ));

        let zero_sum = Distribution::Empirical {
            values: vec![1.0, 2.0],
            weights: vec![0.0, 0.0],
        };
        assert!(matches!(
            sampler.draw(&zero_sum, 10, 1),
            Err(McError::DistributionParam { .. })
        ));
    }

    #[test]
    fn unnormalized_weights_are_accepted() {
        let dist = Distribution::Empirical {
            values: vec![10.0, 20.0],
            weights: vec![3.0, 9.0],
        };
        let mut sampler = Sampler::new();
        let xs = sampler.draw(&dist, 100, 2).unwrap();
        assert!(xs.iter().all(|x| [10.0, 20.0].contains(x)));
    }
}
