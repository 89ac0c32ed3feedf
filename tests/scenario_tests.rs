// tests/scenario_tests.rs
//
// Integration tests for YAML scenario loading: file round-trips,
// validation failures surfacing at load time, and end-to-end evaluation
// of a file-defined model.

use std::fs;

use exposim::eval::{evaluate_full_matrix, CutLoopEvaluator};
use exposim::node::Role;
use exposim::scenario::{ScenarioError, ScenarioSpec};
use tempfile::tempdir;

const SCENARIO_YAML: &str = r#"
scenario_id: well_water_v1
scenario_version: 1

rng:
  base_seed: 7
  num_seeds: 2

sizes:
  nsv: 40
  nsu: 6

quantiles: [0.025, 0.5, 0.975]

nodes:
  - name: concentration
    kind: sampled
    role: variability
    distribution:
      kind: log_normal
      meanlog: -2.0
      sdlog: 1.0
  - name: consumption
    kind: sampled
    role: variability
    distribution:
      kind: trunc_normal
      mean: 1.2
      sd: 0.5
      lower: 0.05
  - name: recovery
    kind: sampled
    role: uncertainty
    distribution:
      kind: log_normal
      meanlog: 0.0
      sdlog: 0.25
  - name: dose
    kind: derived
    expr:
      op: mul
      lhs:
        op: mul
        lhs: concentration
        rhs: consumption
      rhs: recovery

output: dose
"#;

#[test]
fn scenario_file_loads_and_evaluates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("well_water.yaml");
    fs::write(&path, SCENARIO_YAML).unwrap();

    let spec = ScenarioSpec::from_file(&path).expect("scenario should load");
    assert_eq!(spec.scenario_id, "well_water_v1");
    assert_eq!(spec.expand_seeds(), vec![(0, 7), (1, 8)]);

    let model = spec.to_model().unwrap();
    assert_eq!(model.output_role(), Role::VariabilityUncertainty);

    for (_, seed) in spec.expand_seeds() {
        let params = spec.to_eval_params(seed);
        let full = evaluate_full_matrix(&model, &params).unwrap();
        assert_eq!((full.nsv, full.nsu), (40, 6));

        let cut = CutLoopEvaluator::new(&model, params).unwrap().run().unwrap();
        assert_eq!(cut.quantile_levels, vec![0.025, 0.5, 0.975]);
        for (j, it) in cut.iterations.iter().enumerate() {
            assert_eq!(
                full.column_means()[j].to_bits(),
                it.mean.to_bits(),
                "seed {} iteration {}",
                seed,
                j
            );
        }
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let err = ScenarioSpec::from_file("no/such/scenario.yaml").unwrap_err();
    assert!(matches!(err, ScenarioError::IoError { .. }));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "scenario_id: [unclosed").unwrap();
    let err = ScenarioSpec::from_file(&path).unwrap_err();
    assert!(matches!(err, ScenarioError::ParseError { .. }));
}

#[test]
fn undefined_reference_fails_at_load_time() {
    // The derived node references a name declared after it; the loader
    // must reject this at construction, before any evaluation.
    let yaml = SCENARIO_YAML.replace("lhs: concentration", "lhs: conc_typo");
    let dir = tempdir().unwrap();
    let path = dir.path().join("typo.yaml");
    fs::write(&path, &yaml).unwrap();

    let err = ScenarioSpec::from_file(&path).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("conc_typo"),
        "error should name the undefined node: {}",
        msg
    );
}

#[test]
fn bad_distribution_params_fail_validation() {
    let yaml = SCENARIO_YAML.replace("sdlog: 1.0", "sdlog: -1.0");
    let spec = ScenarioSpec::from_yaml_str(&yaml).unwrap();
    let err = spec.validate().unwrap_err();
    assert!(matches!(err, ScenarioError::ValidationError { .. }));
}

#[test]
fn out_of_range_quantiles_fail_validation() {
    let yaml = SCENARIO_YAML.replace("[0.025, 0.5, 0.975]", "[0.025, 0.5, 1.5]");
    let spec = ScenarioSpec::from_yaml_str(&yaml).unwrap();
    assert!(spec.validate().is_err());
}
