// src/bin/exposure_mc.rs
//
// Batch Monte Carlo harness.
//
// Goals:
// - Deterministic multi-seed evaluation using seed offsets (seed + k).
// - Runs BOTH evaluation strategies per seed and verifies the engine's
//   self-consistency invariants:
//     * two independent full-matrix runs are value-identical
//     * cut-loop per-iteration means equal the full-matrix column means
// - Writes mc_summary.json (versioned schema, atomic) plus an optional
//   per-seed CSV and a YAML echo of the scenario used.
//
// Run examples:
//   cargo run --bin exposure_mc -- --seeds 20 --seed 1 --precision Coarse
//   EXPOSIM_PRECISION=Fine cargo run --bin exposure_mc -- --seeds 50 --quiet
//   cargo run --bin exposure_mc -- --scenario scenarios/shellfish.yaml --csv runs.csv
//
// Default output directory:
//   cargo run --bin exposure_mc -- --output-dir runs/demo

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use exposim::config::{resolve_effective_precision, Precision};
use exposim::eval::{evaluate_full_matrix, CutLoopEvaluator};
use exposim::logging::FileSink;
use exposim::output::{
    atomic_write, McAggregateStats, McConfig, McRunRecord, McSummary, SimpleStats,
    OUTPUT_SCHEMA_VERSION,
};
use exposim::scenario::ScenarioSpec;
use exposim::summary::{mean_of_reducer, mean_of_reducer_summaries, OnlineStats, Reducer};

const DEFAULT_SEEDS: usize = 20;
const DEFAULT_SEED: u64 = 1;
const DEFAULT_PRINT_EVERY: usize = 1;
const DEFAULT_OUTPUT_DIR: &str = "runs/exposure_mc";

#[derive(Debug, Clone)]
struct Args {
    seeds: usize,
    seed: u64,
    nsv: Option<usize>,
    nsu: Option<usize>,
    precision: Option<Precision>,
    scenario: Option<PathBuf>,
    quiet: bool,
    print_every: usize,
    csv_out: Option<PathBuf>,
    jsonl_out: Option<PathBuf>,
    output_dir: PathBuf,
}

impl Args {
    fn usage() -> &'static str {
        "\
exposim batch Monte Carlo harness

USAGE:
  cargo run --bin exposure_mc -- [FLAGS]

PRECISION PRECEDENCE:
  1) --precision overrides environment
  2) else EXPOSIM_PRECISION
  3) else Standard

FLAGS:
  --precision NAME     Coarse | Standard | Fine
  --seeds N            Number of seeds to run (default: 20). Seed k uses seed + k.
  --seed U64           Base seed (default: 1)
  --nsv N              Override variability axis size
  --nsu N              Override uncertainty axis size
  --scenario PATH      Scenario YAML (default: built-in drinking-water model)
  --csv PATH           Write per-seed CSV rows to PATH (relative to output-dir)
  --jsonl PATH         Write the first seed's iteration summaries as JSONL
  --output-dir DIR     Output directory (default: runs/exposure_mc)
  --print-every N      Print every N seeds (default: 1). Ignored with --quiet.
  --quiet              Suppress per-seed lines; only print final summary
  --help               Show this help

OUTPUT:
  The harness writes to <output-dir>/:
    - mc_summary.json     Per-seed records and aggregate summary
    - scenario_echo.yaml  Scenario configuration used for this run
    - <csv>, <jsonl>      If requested
"
    }

    fn parse_or_exit() -> Self {
        match Self::parse() {
            Ok(a) => a,
            Err(e) => {
                eprintln!("{e}\n\n{}", Self::usage());
                std::process::exit(2);
            }
        }
    }

    fn parse() -> Result<Self, String> {
        let mut out = Args {
            seeds: DEFAULT_SEEDS,
            seed: DEFAULT_SEED,
            nsv: None,
            nsu: None,
            precision: None,
            scenario: None,
            quiet: false,
            print_every: DEFAULT_PRINT_EVERY,
            csv_out: None,
            jsonl_out: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        };

        let mut it = env::args().skip(1);

        while let Some(arg) = it.next() {
            // Accept both "--flag value" and "--flag=value" forms.
            let (flag, inline) = match arg.split_once('=') {
                Some((f, v)) => (f.to_string(), Some(v.to_string())),
                None => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String, String> {
                match &inline {
                    Some(v) => Ok(v.clone()),
                    None => it.next().ok_or_else(|| format!("Missing value for {name}")),
                }
            };

            match flag.as_str() {
                "--help" | "-h" => {
                    println!("{}", Self::usage());
                    std::process::exit(0);
                }
                "--quiet" => out.quiet = true,
                "--precision" => {
                    let v = value("--precision")?;
                    out.precision = Some(Precision::parse(&v).ok_or_else(|| {
                        "Invalid --precision. Expected: Coarse | Standard | Fine".to_string()
                    })?);
                }
                "--seeds" => {
                    out.seeds = value("--seeds")?
                        .parse::<usize>()
                        .map_err(|_| "Invalid --seeds (expected integer)".to_string())?;
                    if out.seeds == 0 {
                        return Err("--seeds must be >= 1".to_string());
                    }
                }
                "--seed" => {
                    out.seed = value("--seed")?
                        .parse::<u64>()
                        .map_err(|_| "Invalid --seed (expected u64)".to_string())?;
                }
                "--nsv" => {
                    let v = value("--nsv")?
                        .parse::<usize>()
                        .map_err(|_| "Invalid --nsv (expected integer)".to_string())?;
                    if v == 0 {
                        return Err("--nsv must be >= 1".to_string());
                    }
                    out.nsv = Some(v);
                }
                "--nsu" => {
                    let v = value("--nsu")?
                        .parse::<usize>()
                        .map_err(|_| "Invalid --nsu (expected integer)".to_string())?;
                    if v == 0 {
                        return Err("--nsu must be >= 1".to_string());
                    }
                    out.nsu = Some(v);
                }
                "--scenario" => out.scenario = Some(PathBuf::from(value("--scenario")?)),
                "--csv" => out.csv_out = Some(PathBuf::from(value("--csv")?)),
                "--jsonl" => out.jsonl_out = Some(PathBuf::from(value("--jsonl")?)),
                "--output-dir" => out.output_dir = PathBuf::from(value("--output-dir")?),
                "--print-every" => {
                    out.print_every = value("--print-every")?
                        .parse::<usize>()
                        .map_err(|_| "Invalid --print-every (expected integer)".to_string())?;
                    if out.print_every == 0 {
                        return Err("--print-every must be >= 1".to_string());
                    }
                }
                other => return Err(format!("Unknown argument: {other}")),
            }
        }

        Ok(out)
    }
}

fn in_output_dir(output_dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        output_dir.join(p)
    }
}

fn main() {
    let args = Args::parse_or_exit();

    // Resolve precision with proper precedence: CLI > env > default.
    let effective = resolve_effective_precision(args.precision);
    effective.log_startup();

    // Resolve the scenario: file if given, built-in model otherwise.
    let (nsv_default, nsu_default) = effective.precision.sizes();
    let spec = match args.scenario.as_ref() {
        Some(path) => match ScenarioSpec::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        },
        None => ScenarioSpec::builtin(nsv_default, nsu_default, args.seed, args.seeds as u32),
    };

    let model = match spec.to_model() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = fs::create_dir_all(&args.output_dir) {
        eprintln!(
            "Failed to create output directory {:?}: {e}",
            args.output_dir
        );
        std::process::exit(2);
    }

    let csv_path = args
        .csv_out
        .as_ref()
        .map(|p| in_output_dir(&args.output_dir, p));
    let mut csv: Option<File> = match csv_path.as_ref() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let mut f = File::create(path).unwrap_or_else(|e| {
                eprintln!("Failed to create CSV file {:?}: {e}", path);
                std::process::exit(2);
            });
            writeln!(
                f,
                "run,seed,checksum,full_matrix_identical,cut_loop_consistent,mean_dose,mean_ci_lower,mean_ci_upper,median_dose"
            )
            .unwrap();
            Some(f)
        }
        None => None,
    };

    println!(
        "exposim-mc v{} | scenario={} precision={} ({}) seeds={} base_seed={} nsv={} nsu={} output_dir={}",
        env!("CARGO_PKG_VERSION"),
        spec.scenario_id,
        effective.precision.as_str(),
        effective.source.as_str(),
        args.seeds,
        args.seed,
        args.nsv.unwrap_or(spec.sizes.nsv),
        args.nsu.unwrap_or(spec.sizes.nsu),
        args.output_dir.display()
    );

    let mut mean_stats = OnlineStats::default();
    let mut median_stats = OnlineStats::default();
    let mut consistent_runs: usize = 0;
    let mut run_records: Vec<McRunRecord> = Vec::with_capacity(args.seeds);

    for k in 0..args.seeds {
        let run_seed = args.seed.wrapping_add(k as u64);
        let mut params = spec.to_eval_params(run_seed);
        if let Some(nsv) = args.nsv {
            params.nsv = nsv;
        }
        if let Some(nsu) = args.nsu {
            params.nsu = nsu;
        }

        // Full-matrix, twice: the primary self-consistency check is that
        // two independently produced results are value-identical.
        let full_a = evaluate_full_matrix(&model, &params).unwrap_or_else(|e| {
            eprintln!("run {}: full-matrix evaluation failed: {e}", k + 1);
            std::process::exit(1);
        });
        let full_b = evaluate_full_matrix(&model, &params).unwrap_or_else(|e| {
            eprintln!("run {}: full-matrix evaluation failed: {e}", k + 1);
            std::process::exit(1);
        });
        let full_matrix_identical = full_a.is_identical(&full_b);

        // Cut-loop, optionally streaming iteration summaries to JSONL for
        // the first seed.
        let mut evaluator = CutLoopEvaluator::new(&model, params.clone()).unwrap_or_else(|e| {
            eprintln!("run {}: {e}", k + 1);
            std::process::exit(1);
        });
        let cut = if k == 0 && args.jsonl_out.is_some() {
            let path = in_output_dir(&args.output_dir, args.jsonl_out.as_ref().unwrap());
            let mut sink = FileSink::create(&path).unwrap_or_else(|e| {
                eprintln!("Failed to create JSONL file {:?}: {e}", path);
                std::process::exit(2);
            });
            let result = evaluator.run_with_sink(&mut sink);
            let _ = sink.flush();
            result
        } else {
            evaluator.run()
        }
        .unwrap_or_else(|e| {
            eprintln!("run {}: cut-loop evaluation failed: {e}", k + 1);
            std::process::exit(1);
        });

        let cut_loop_consistent = full_a
            .column_means()
            .iter()
            .zip(cut.iterations.iter())
            .all(|(m, itn)| m.to_bits() == itn.mean.to_bits());

        let mean_dose = mean_of_reducer(&full_a, Reducer::Mean);
        let median_dose = mean_of_reducer_summaries(&cut, Reducer::Median).unwrap_or_else(|e| {
            eprintln!("run {}: {e}", k + 1);
            std::process::exit(1);
        });

        if full_matrix_identical && cut_loop_consistent {
            consistent_runs += 1;
        }
        mean_stats.add(mean_dose.mean);
        median_stats.add(median_dose.mean);

        if let Some(f) = csv.as_mut() {
            writeln!(
                f,
                "{},{},{},{},{},{:.6},{:.6},{:.6},{:.6}",
                k + 1,
                run_seed,
                full_a.checksum,
                full_matrix_identical,
                cut_loop_consistent,
                mean_dose.mean,
                mean_dose.ci_lower,
                mean_dose.ci_upper,
                median_dose.mean
            )
            .unwrap();
        }

        let should_print = !args.quiet
            && (args.print_every == 1
                || ((k + 1) % args.print_every == 0)
                || (k + 1 == args.seeds));
        if should_print {
            println!(
                "run {:>4}/{:<4} seed={:<10} mean={:>12.6} [{:>12.6}, {:>12.6}] median={:>12.6} identical={} consistent={}",
                k + 1,
                args.seeds,
                run_seed,
                mean_dose.mean,
                mean_dose.ci_lower,
                mean_dose.ci_upper,
                median_dose.mean,
                full_matrix_identical,
                cut_loop_consistent
            );
        }

        run_records.push(McRunRecord {
            run: k + 1,
            seed: run_seed,
            checksum: full_a.checksum.clone(),
            full_matrix_identical,
            cut_loop_consistent,
            mean_dose,
            median_dose,
        });
    }

    println!();
    println!("SUMMARY");
    println!("  seeds:           {}", args.seeds);
    println!(
        "  consistent_runs: {} / {}",
        consistent_runs, args.seeds
    );
    println!(
        "  mean_dose:       mean={:.6}  std(pop)={:.6}  min={:.6}  max={:.6}",
        mean_stats.mean(),
        mean_stats.stddev_population(),
        mean_stats.min(),
        mean_stats.max()
    );
    println!(
        "  median_dose:     mean={:.6}  std(pop)={:.6}  min={:.6}  max={:.6}",
        median_stats.mean(),
        median_stats.stddev_population(),
        median_stats.min(),
        median_stats.max()
    );

    // =========================================================================
    // Write output files
    // =========================================================================

    let summary = McSummary {
        schema_version: OUTPUT_SCHEMA_VERSION,
        exposim_version: env!("CARGO_PKG_VERSION").to_string(),
        config: McConfig {
            scenario_id: spec.scenario_id.clone(),
            seeds: args.seeds,
            base_seed: args.seed,
            nsv: args.nsv.unwrap_or(spec.sizes.nsv),
            nsu: args.nsu.unwrap_or(spec.sizes.nsu),
            precision: effective.precision.as_str().to_string(),
        },
        runs: run_records,
        aggregate: McAggregateStats {
            mean_dose: SimpleStats::from_online(&mean_stats),
            median_dose: SimpleStats::from_online(&median_stats),
            consistent_runs,
        },
    };

    let summary_path = args.output_dir.join("mc_summary.json");
    if let Err(e) = summary.write_to(&summary_path) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
    println!();
    println!("Wrote: {}", summary_path.display());

    let echo = spec.to_yaml().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let echo_path = args.output_dir.join("scenario_echo.yaml");
    if let Err(e) = atomic_write(&echo_path, echo.as_bytes()) {
        eprintln!("Failed to write scenario_echo.yaml: {e}");
        std::process::exit(1);
    }
    println!("Wrote: {}", echo_path.display());

    if consistent_runs != args.seeds {
        eprintln!(
            "SELF-CONSISTENCY FAILURE: {} of {} seeds inconsistent",
            args.seeds - consistent_runs,
            args.seeds
        );
        std::process::exit(1);
    }
}
