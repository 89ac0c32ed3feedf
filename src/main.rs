// src/main.rs
//
// Single-run CLI entrypoint for Exposim.
//
// Constraints:
// - Precision precedence: --precision overrides env; if missing use
//   EXPOSIM_PRECISION (default Standard).
// - Deterministic runs via --seed.
// - Prints a concise run header, the nested-uncertainty point estimates,
//   and the cross-evaluator consistency verdict.
// - Exit code 1 if the two evaluators disagree (they never should).

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use exposim::config::{resolve_effective_precision, EvalParams, Precision};
use exposim::eval::{evaluate_full_matrix, CutLoopEvaluator};
use exposim::model::Model;
use exposim::scenario::ScenarioSpec;
use exposim::summary::{mean_of_reducer, mean_of_reducer_summaries, Reducer};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PrecisionArg {
    Coarse,
    Standard,
    Fine,
}

impl From<PrecisionArg> for Precision {
    fn from(p: PrecisionArg) -> Self {
        match p {
            PrecisionArg::Coarse => Precision::Coarse,
            PrecisionArg::Standard => Precision::Standard,
            PrecisionArg::Fine => Precision::Fine,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "exposim",
    about = "Two-dimensional Monte Carlo exposure assessment (single run)",
    version
)]
struct Args {
    /// Scenario YAML; the built-in drinking-water model when omitted.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Precision preset (optional).
    /// If omitted, uses EXPOSIM_PRECISION (default Standard).
    #[arg(long, value_enum)]
    precision: Option<PrecisionArg>,

    /// Deterministic base seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Override the variability axis size.
    #[arg(long)]
    nsv: Option<usize>,

    /// Override the uncertainty axis size.
    #[arg(long)]
    nsu: Option<usize>,

    /// Verbosity: -v prints per-iteration summaries.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let effective = resolve_effective_precision(args.precision.map(Into::into));
    effective.log_startup();

    // A scenario file wins over the precision preset for sizes; CLI
    // overrides win over both.
    let (model, scenario_id, mut params) = match args.scenario.as_ref() {
        Some(path) => match ScenarioSpec::from_file(path) {
            Ok(spec) => {
                let model = spec.to_model().unwrap_or_else(|e| {
                    eprintln!("{e}");
                    std::process::exit(2);
                });
                let params = spec.to_eval_params(args.seed);
                (model, spec.scenario_id, params)
            }
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        },
        None => (
            Model::example_drinking_water(),
            "drinking_water_builtin".to_string(),
            EvalParams::for_precision(effective.precision).with_seed(args.seed),
        ),
    };
    if let Some(nsv) = args.nsv {
        params.nsv = nsv;
    }
    if let Some(nsu) = args.nsu {
        params.nsu = nsu;
    }
    if let Err(e) = params.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    println!(
        "exposim v{} | scenario={} nsv={} nsu={} seed={} output={}",
        env!("CARGO_PKG_VERSION"),
        scenario_id,
        params.nsv,
        params.nsu,
        params.seed,
        model.output_name()
    );

    let full = match evaluate_full_matrix(&model, &params) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("full-matrix evaluation failed: {e}");
            std::process::exit(1);
        }
    };

    let cut = match CutLoopEvaluator::new(&model, params.clone()).and_then(|mut e| e.run()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("cut-loop evaluation failed: {e}");
            std::process::exit(1);
        }
    };

    if args.verbose > 0 {
        for it in &cut.iterations {
            println!(
                "  iter {:>4} mean={:>12.6} q={:?}",
                it.index, it.mean, it.quantiles
            );
        }
    }

    let mean_est = mean_of_reducer(&full, Reducer::Mean);
    let median_est = mean_of_reducer(&full, Reducer::Median);
    println!(
        "mean dose:   {:.6}  [{:.6}, {:.6}, {:.6}] (2.5% / 50% / 97.5% over {} iterations)",
        mean_est.mean, mean_est.ci_lower, mean_est.median, mean_est.ci_upper, mean_est.nsu
    );
    println!(
        "median dose: {:.6}  [{:.6}, {:.6}, {:.6}]",
        median_est.mean, median_est.ci_lower, median_est.median, median_est.ci_upper
    );
    println!("checksum: {}", full.checksum);

    // Cross-evaluator consistency: per-iteration means must be bit-equal.
    let cut_mean = match mean_of_reducer_summaries(&cut, Reducer::Mean) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("cut-loop reduction failed: {e}");
            std::process::exit(1);
        }
    };
    let consistent = full
        .column_means()
        .iter()
        .zip(cut.iterations.iter())
        .all(|(m, it)| m.to_bits() == it.mean.to_bits())
        && cut_mean == mean_est;

    if consistent {
        println!("evaluators: consistent");
    } else {
        eprintln!("evaluators: INCONSISTENT (full-matrix vs cut-loop)");
        std::process::exit(1);
    }
}
