// src/scenario.rs
//
// Scenario specification parsing and validation.
//
// A scenario fully defines a reproducible evaluation:
// - scenario_id + scenario_version for tracking
// - rng (base seed + number of seeds to expand)
// - sizes (nsv, nsu) and optional quantile schema
// - the node list (constants, sampled nodes, derived nodes)
// - the output designation

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::{EvalParams, DEFAULT_QUANTILES};
use crate::error::McError;
use crate::model::{Model, NodeSpec};

/// Current scenario schema version.
pub const SCENARIO_SCHEMA_VERSION: u32 = 1;

/// RNG configuration for seed expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngSpec {
    /// Base seed for reproducibility.
    pub base_seed: u64,
    /// Number of seeds to run (runner expands as base_seed + k).
    pub num_seeds: u32,
}

impl Default for RngSpec {
    fn default() -> Self {
        Self {
            base_seed: 42,
            num_seeds: 1,
        }
    }
}

/// Axis sizes for the two sampling dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sizes {
    pub nsv: usize,
    pub nsu: usize,
}

/// One named node declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDecl {
    pub name: String,
    #[serde(flatten)]
    pub spec: NodeSpec,
}

/// Versioned, declarative scenario definition (YAML-parsed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub scenario_id: String,
    pub scenario_version: u32,
    #[serde(default)]
    pub rng: RngSpec,
    pub sizes: Sizes,
    /// Quantile levels for cut-loop summaries; defaults when omitted.
    #[serde(default)]
    pub quantiles: Option<Vec<f64>>,
    pub nodes: Vec<NodeDecl>,
    pub output: String,
}

impl ScenarioSpec {
    /// Parse from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScenarioError> {
        serde_yaml::from_str(yaml).map_err(|e| ScenarioError::ParseError {
            source: e.to_string(),
        })
    }

    /// Load and parse a scenario file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::IoError {
            path: path.display().to_string(),
            source: e.to_string(),
        })?;
        let spec = Self::from_yaml_str(&contents)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate scenario-level fields, then the model they define.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.scenario_id.is_empty() {
            return Err(ScenarioError::ValidationError {
                field: "scenario_id".to_string(),
                message: "must be non-empty".to_string(),
            });
        }
        if self.scenario_version != SCENARIO_SCHEMA_VERSION {
            return Err(ScenarioError::ValidationError {
                field: "scenario_version".to_string(),
                message: format!(
                    "unsupported version {} (expected {})",
                    self.scenario_version, SCENARIO_SCHEMA_VERSION
                ),
            });
        }
        if self.rng.num_seeds == 0 {
            return Err(ScenarioError::ValidationError {
                field: "rng.num_seeds".to_string(),
                message: "must be >= 1".to_string(),
            });
        }
        if self.nodes.is_empty() {
            return Err(ScenarioError::ValidationError {
                field: "nodes".to_string(),
                message: "must declare at least one node".to_string(),
            });
        }

        // Model-level validation (duplicates, references, distributions)
        // and parameter validation both funnel into scenario errors.
        self.to_model().map(|_| ())?;
        self.to_eval_params(self.rng.base_seed)
            .validate()
            .map_err(|e| ScenarioError::ValidationError {
                field: "sizes/quantiles".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Expand seeds into a list of (seed_index, actual_seed) pairs.
    pub fn expand_seeds(&self) -> Vec<(u32, u64)> {
        (0..self.rng.num_seeds)
            .map(|k| (k, self.rng.base_seed.wrapping_add(k as u64)))
            .collect()
    }

    /// Build the validated model this scenario declares.
    pub fn to_model(&self) -> Result<Model, ScenarioError> {
        let mut builder = Model::builder();
        for decl in &self.nodes {
            builder = match &decl.spec {
                NodeSpec::Constant { value } => builder.constant(decl.name.clone(), *value),
                NodeSpec::Sampled { role, distribution } => {
                    builder.sampled(decl.name.clone(), *role, distribution.clone())
                }
                NodeSpec::Derived { expr } => builder.derived(decl.name.clone(), expr.clone()),
            };
        }
        builder
            .output(self.output.clone())
            .build()
            .map_err(|e| ScenarioError::ValidationError {
                field: "nodes".to_string(),
                message: e.to_string(),
            })
    }

    /// Evaluation parameters for one expanded seed.
    pub fn to_eval_params(&self, seed: u64) -> EvalParams {
        EvalParams {
            nsv: self.sizes.nsv,
            nsu: self.sizes.nsu,
            seed,
            quantiles: self
                .quantiles
                .clone()
                .unwrap_or_else(|| DEFAULT_QUANTILES.to_vec()),
            vary_variability_per_iteration: false,
        }
    }

    /// The built-in drinking-water scenario used when no file is given.
    pub fn builtin(nsv: usize, nsu: usize, base_seed: u64, num_seeds: u32) -> ScenarioSpec {
        let model = Model::example_drinking_water();
        ScenarioSpec {
            scenario_id: "drinking_water_builtin".to_string(),
            scenario_version: SCENARIO_SCHEMA_VERSION,
            rng: RngSpec {
                base_seed,
                num_seeds,
            },
            sizes: Sizes { nsv, nsu },
            quantiles: None,
            nodes: model
                .nodes()
                .iter()
                .map(|(name, spec)| NodeDecl {
                    name: name.clone(),
                    spec: spec.clone(),
                })
                .collect(),
            output: model.output_name().to_string(),
        }
    }

    /// YAML rendering, for the harness's configuration echo.
    pub fn to_yaml(&self) -> Result<String, ScenarioError> {
        serde_yaml::to_string(self).map_err(|e| ScenarioError::ParseError {
            source: e.to_string(),
        })
    }
}

/// Errors that can occur when working with scenarios.
#[derive(Debug, Clone)]
pub enum ScenarioError {
    IoError { path: String, source: String },
    ParseError { source: String },
    ValidationError { field: String, message: String },
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::IoError { path, source } => {
                write!(f, "Failed to read scenario file '{}': {}", path, source)
            }
            ScenarioError::ParseError { source } => {
                write!(f, "Failed to parse scenario YAML: {}", source)
            }
            ScenarioError::ValidationError { field, message } => {
                write!(f, "Scenario validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ScenarioError {}
