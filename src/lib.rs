//! Exposim core library.
//!
//! Two-dimensional Monte Carlo engine for population exposure assessment.
//! A dose estimate is assembled from stochastic nodes tagged with a
//! dimensional role: natural between-individual **variability** (axis
//! size `nsv`) and analyst **uncertainty** about model parameters (axis
//! size `nsu`). The binaries (`src/main.rs`, `src/bin/exposure_mc.rs`)
//! are thin harnesses around these components.
//!
//! # Architecture
//!
//! The codebase follows a clean separation between the simulation core
//! and I/O:
//!
//! - **Sampler** (`sampler`): Seeded draws from parametric distributions
//!   with a reset-per-draw reproducibility contract. No global RNG state.
//!
//! - **Nodes & Composition** (`node`, `compose`): Typed containers for
//!   realized values and the broadcasting algebra that combines them
//!   across the two sampling axes (outer product for variability x
//!   uncertainty).
//!
//! - **Model** (`model`, `scenario`): Ordered, validated node
//!   declarations with one designated output, built programmatically or
//!   parsed from a YAML scenario.
//!
//! - **Evaluators** (`eval`): The full-matrix strategy materializes the
//!   nsv x nsu table; the cut-loop strategy retains only per-iteration
//!   summaries in O(nsv) memory. Same model + seed = interchangeable
//!   results, bit-exactly.
//!
//! - **Aggregation & Output** (`summary`, `output`, `logging`): Point
//!   estimates with nested-uncertainty intervals, ECDFs, versioned JSON
//!   schemas with determinism checksums, JSONL iteration sinks.

pub mod compose;
pub mod config;
pub mod error;
pub mod eval;
pub mod logging;
pub mod model;
pub mod node;
pub mod output;
pub mod sampler;
pub mod scenario;
pub mod summary;

// --- Re-exports for ergonomic external use ---------------------------------

pub use compose::{compose, resolve_role, BinaryOp};

pub use config::{
    resolve_effective_precision, EffectivePrecision, EvalParams, Precision, PrecisionSource,
    DEFAULT_QUANTILES, PRECISION_ENV_VAR,
};

pub use error::McError;

pub use eval::{
    evaluate_full_matrix, CutLoopEvaluator, CutLoopResult, FullMatrixResult, IterationSummary,
};

pub use logging::{EventSink, FileSink, NoopSink};

pub use model::{Expr, Model, ModelBuilder, NodeSpec};

pub use node::{Matrix, McNode, NodeValues, Role};

pub use output::{
    atomic_write, hex_encode, result_checksum, McAggregateStats, McConfig, McRunRecord, McSummary,
    SimpleStats, OUTPUT_SCHEMA_VERSION,
};

pub use sampler::{normal_cdf, normal_quantile, Distribution, Sampler};

pub use scenario::{
    NodeDecl, RngSpec, ScenarioError, ScenarioSpec, Sizes, SCENARIO_SCHEMA_VERSION,
};

pub use summary::{
    compute_quantiles, mean_of_reducer, mean_of_reducer_summaries, quantile_sorted, Ecdf,
    OnlineStats, PointEstimate, Reducer, CI_QUANTILES,
};

// --- Cross-evaluator equivalence tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(nsv: usize, nsu: usize, seed: u64) -> EvalParams {
        EvalParams {
            nsv,
            nsu,
            seed,
            ..EvalParams::default()
        }
    }

    /// The engine's defining invariant: for one model, seed, and sizes,
    /// reducing the full matrix per column equals the cut-loop's
    /// per-iteration summaries, exactly.
    #[test]
    fn full_matrix_and_cut_loop_agree() {
        let model = Model::example_drinking_water();
        let p = params(100, 10, 2024);

        let full = evaluate_full_matrix(&model, &p).unwrap();
        let cut = CutLoopEvaluator::new(&model, p.clone()).unwrap().run().unwrap();

        let col_means = full.column_means();
        assert_eq!(col_means.len(), cut.iterations.len());
        for (m, it) in col_means.iter().zip(cut.iterations.iter()) {
            assert_eq!(m.to_bits(), it.mean.to_bits(), "iteration {}", it.index);
        }
    }

    #[test]
    fn point_estimates_agree_across_forms() {
        let model = Model::example_drinking_water();
        let p = params(64, 8, 5);

        let full = evaluate_full_matrix(&model, &p).unwrap();
        let cut = CutLoopEvaluator::new(&model, p).unwrap().run().unwrap();

        let from_full = mean_of_reducer(&full, Reducer::Mean);
        let from_cut = mean_of_reducer_summaries(&cut, Reducer::Mean).unwrap();
        assert_eq!(from_full, from_cut);

        let med_full = mean_of_reducer(&full, Reducer::Median);
        let med_cut = mean_of_reducer_summaries(&cut, Reducer::Median).unwrap();
        assert_eq!(med_full, med_cut);
    }
}
