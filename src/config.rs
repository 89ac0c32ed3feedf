// src/config.rs
//
// Evaluation parameters and precision profiles.
//
// EvalParams carries the knobs both evaluators consume: the two axis
// sizes, the base seed, the quantile schema for cut-loop summaries, and
// the explicit opt-in flag for per-iteration-distinct variability draws.
//
// Precision presets give the CLI harnesses named sample-size tiers with
// the same precedence discipline the rest of the crate uses for
// environment configuration: CLI > EXPOSIM_PRECISION > default.

use serde::{Deserialize, Serialize};

use crate::error::McError;

/// Quantile levels reported per uncertainty iteration by default.
pub const DEFAULT_QUANTILES: [f64; 5] = [0.025, 0.25, 0.50, 0.75, 0.975];

/// Environment variable consulted for the precision preset.
pub const PRECISION_ENV_VAR: &str = "EXPOSIM_PRECISION";

/// Parameters for one evaluator invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalParams {
    /// Variability axis size (samples per uncertainty iteration).
    pub nsv: usize,
    /// Uncertainty axis size (number of iterations).
    pub nsu: usize,
    /// Base seed. Node k draws with seed `seed + k`.
    pub seed: u64,
    /// Quantile levels retained per iteration summary.
    pub quantiles: Vec<f64>,
    /// Derive a distinct variability seed per uncertainty iteration.
    ///
    /// The reference behavior (false) resets to the same seed on every
    /// iteration, which makes variability draws identical across the
    /// uncertainty axis and enables bit-exact cross-evaluator checks.
    /// Switching this on changes the statistical meaning of the result.
    #[serde(default)]
    pub vary_variability_per_iteration: bool,
}

impl Default for EvalParams {
    fn default() -> Self {
        Self {
            nsv: 1000,
            nsu: 100,
            seed: 42,
            quantiles: DEFAULT_QUANTILES.to_vec(),
            vary_variability_per_iteration: false,
        }
    }
}

impl EvalParams {
    /// Sample sizes from a precision preset, defaults elsewhere.
    pub fn for_precision(precision: Precision) -> Self {
        let (nsv, nsu) = precision.sizes();
        Self {
            nsv,
            nsu,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), McError> {
        let fail = |message: String| {
            Err(McError::InvalidParams {
                context: "eval_params".to_string(),
                message,
            })
        };
        if self.nsv == 0 {
            return fail("nsv must be >= 1".to_string());
        }
        if self.nsu == 0 {
            return fail("nsu must be >= 1".to_string());
        }
        if self.quantiles.is_empty() {
            return fail("quantile set must be non-empty".to_string());
        }
        for q in &self.quantiles {
            if !q.is_finite() || !(0.0..=1.0).contains(q) {
                return fail(format!("quantile level {} outside [0, 1]", q));
            }
        }
        Ok(())
    }
}

/// Named sample-size tiers for the CLI harnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Fast smoke-level sizes.
    Coarse,
    /// Everyday analysis sizes.
    Standard,
    /// Publication-grade sizes.
    Fine,
}

impl Precision {
    /// (nsv, nsu) for this tier.
    pub fn sizes(&self) -> (usize, usize) {
        match self {
            Precision::Coarse => (250, 25),
            Precision::Standard => (1000, 100),
            Precision::Fine => (5000, 250),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Coarse => "Coarse",
            Precision::Standard => "Standard",
            Precision::Fine => "Fine",
        }
    }

    /// Case-insensitive parse. "Quick" is accepted as an alias for Coarse.
    pub fn parse(s: &str) -> Option<Precision> {
        match s.to_ascii_lowercase().as_str() {
            "coarse" | "quick" => Some(Precision::Coarse),
            "standard" => Some(Precision::Standard),
            "fine" => Some(Precision::Fine),
            _ => None,
        }
    }
}

/// Where the effective precision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionSource {
    Cli,
    Env,
    Default,
}

impl PrecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrecisionSource::Cli => "cli",
            PrecisionSource::Env => "env",
            PrecisionSource::Default => "default",
        }
    }
}

/// Resolved precision plus its provenance, for the startup log line.
#[derive(Debug, Clone, Copy)]
pub struct EffectivePrecision {
    pub precision: Precision,
    pub source: PrecisionSource,
}

impl EffectivePrecision {
    /// One-line startup log naming the tier, its source, and the sizes.
    pub fn log_startup(&self) {
        let (nsv, nsu) = self.precision.sizes();
        eprintln!(
            "[config] precision={} (source={}) nsv={} nsu={}",
            self.precision.as_str(),
            self.source.as_str(),
            nsv,
            nsu
        );
    }
}

/// Resolve precision with CLI > env > default precedence.
///
/// An unparseable non-empty `EXPOSIM_PRECISION` warns and falls through
/// to the default rather than aborting.
pub fn resolve_effective_precision(cli_precision: Option<Precision>) -> EffectivePrecision {
    if let Some(p) = cli_precision {
        return EffectivePrecision {
            precision: p,
            source: PrecisionSource::Cli,
        };
    }

    if let Ok(env_val) = std::env::var(PRECISION_ENV_VAR) {
        if !env_val.is_empty() {
            if let Some(p) = Precision::parse(&env_val) {
                return EffectivePrecision {
                    precision: p,
                    source: PrecisionSource::Env,
                };
            }
            eprintln!(
                "[config] WARN: invalid {}={:?}; ignoring",
                PRECISION_ENV_VAR, env_val
            );
        }
    }

    EffectivePrecision {
        precision: Precision::Standard,
        source: PrecisionSource::Default,
    }
}
