// src/eval/cut_loop.rs
//
// Cut-loop evaluator: same result as the full matrix, computed iteration
// by iteration over the uncertainty axis with O(nsv) retained memory.
//
// Three explicit phases, each with explicit inputs (no closures over
// shared mutable state):
//   1. initialize()            realize constants, variability (once) and
//                              uncertainty (full length-nsu vector)
//   2. compose_iteration(j)    build the length-nsv sample for iteration j
//   3. summarize_iteration()   reduce the sample to a fixed-size summary
// Phases 2-3 repeat nsu times; only the summaries survive. No structure
// of size nsv*nsu is ever allocated on this path.

use serde::{Deserialize, Serialize};

use crate::config::EvalParams;
use crate::error::McError;
use crate::logging::{EventSink, NoopSink};
use crate::model::{Model, NodeSpec};
use crate::node::{McNode, Role};
use crate::sampler::{Distribution, Sampler};
use crate::summary::compute_quantiles;

use super::{check_inputs, eval_expr, extract_column, node_seed};

/// Fixed-size summary retained per uncertainty iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    /// Uncertainty iteration index.
    pub index: usize,
    /// Mean of the iteration's length-nsv sample.
    pub mean: f64,
    /// Quantiles of the sample at the result's `quantile_levels`.
    pub quantiles: Vec<f64>,
}

/// Cut-loop evaluation result: nsu summary records, no raw samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutLoopResult {
    pub nsv: usize,
    pub nsu: usize,
    /// Quantile schema shared by every iteration summary.
    pub quantile_levels: Vec<f64>,
    pub iterations: Vec<IterationSummary>,
}

/// One realized base node, kept across iterations.
#[derive(Debug, Clone)]
enum BaseNode {
    Constant(f64),
    /// Realized once during initialize (reference behavior).
    Variability(Vec<f64>),
    /// Redrawn each iteration when per-iteration variability is on; the
    /// distribution is kept so compose_iteration can sample.
    VariabilityPerIteration(Distribution),
    Uncertainty(Vec<f64>),
    Derived,
}

/// The memory-bounded evaluator. Construct, then either drive the three
/// phases yourself or call `run`.
pub struct CutLoopEvaluator<'m> {
    model: &'m Model,
    params: EvalParams,
    sampler: Sampler,
    base: Option<Vec<BaseNode>>,
}

impl<'m> CutLoopEvaluator<'m> {
    pub fn new(model: &'m Model, params: EvalParams) -> Result<Self, McError> {
        check_inputs(model, &params)?;
        Ok(Self {
            model,
            params,
            sampler: Sampler::new(),
            base: None,
        })
    }

    /// Phase 1: realize all constant, variability, and uncertainty nodes.
    ///
    /// Variability nodes are realized once: by the seed-reset contract
    /// they would be identical on every iteration anyway. Uncertainty
    /// nodes are realized as full length-nsu vectors up front.
    pub fn initialize(&mut self) -> Result<(), McError> {
        let mut base = Vec::with_capacity(self.model.nodes().len());
        for (idx, (_, spec)) in self.model.nodes().iter().enumerate() {
            let node = match spec {
                NodeSpec::Constant { value } => BaseNode::Constant(*value),
                NodeSpec::Sampled {
                    role: Role::Variability,
                    distribution,
                } => {
                    if self.params.vary_variability_per_iteration {
                        distribution.validate()?;
                        BaseNode::VariabilityPerIteration(distribution.clone())
                    } else {
                        let seed = node_seed(self.params.seed, idx, None);
                        BaseNode::Variability(self.sampler.draw(
                            distribution,
                            self.params.nsv,
                            seed,
                        )?)
                    }
                }
                NodeSpec::Sampled { distribution, .. } => {
                    let seed = node_seed(self.params.seed, idx, None);
                    BaseNode::Uncertainty(self.sampler.draw(
                        distribution,
                        self.params.nsu,
                        seed,
                    )?)
                }
                NodeSpec::Derived { .. } => BaseNode::Derived,
            };
            base.push(node);
        }
        self.base = Some(base);
        Ok(())
    }

    /// Phase 2: build the length-nsv output sample for iteration `j`.
    pub fn compose_iteration(&mut self, j: usize) -> Result<Vec<f64>, McError> {
        if self.base.is_none() {
            return Err(McError::UndefinedNode {
                name: self.model.output_name().to_string(),
                context: "compose_iteration before initialize".to_string(),
            });
        }
        if j >= self.params.nsu {
            return Err(McError::InvalidParams {
                context: "compose_iteration".to_string(),
                message: format!("iteration {} out of range (nsu={})", j, self.params.nsu),
            });
        }

        let mut env: Vec<McNode> = Vec::with_capacity(self.model.nodes().len());
        for (idx, (name, spec)) in self.model.nodes().iter().enumerate() {
            let base = &self.base.as_ref().expect("checked above")[idx];
            let node = match (base, spec) {
                (BaseNode::Constant(v), _) => McNode::constant(name.clone(), *v),
                (BaseNode::Variability(xs), _) => {
                    McNode::variability(name.clone(), xs.clone(), self.params.nsv)?
                }
                (BaseNode::VariabilityPerIteration(dist), _) => {
                    let seed = node_seed(self.params.seed, idx, Some(j));
                    let xs = self.sampler.draw(dist, self.params.nsv, seed)?;
                    McNode::variability(name.clone(), xs, self.params.nsv)?
                        .with_provenance(dist.clone(), seed)
                }
                (BaseNode::Uncertainty(us), _) => McNode::constant(name.clone(), us[j]),
                (BaseNode::Derived, NodeSpec::Derived { expr }) => {
                    let mut node = eval_expr(expr, &env)?;
                    node.name = name.clone();
                    node
                }
                (BaseNode::Derived, _) => unreachable!("base mirrors the model's specs"),
            };
            env.push(node);
        }

        let output = env
            .iter()
            .find(|n| n.name == self.model.output_name())
            .ok_or_else(|| McError::UndefinedNode {
                name: self.model.output_name().to_string(),
                context: "iteration composition".to_string(),
            })?;

        extract_column(output, self.params.nsv)
    }

    /// Phase 3: reduce one iteration's sample to its retained summary.
    pub fn summarize_iteration(&self, j: usize, sample: &[f64]) -> IterationSummary {
        let mean = if sample.is_empty() {
            f64::NAN
        } else {
            sample.iter().sum::<f64>() / sample.len() as f64
        };
        IterationSummary {
            index: j,
            mean,
            quantiles: compute_quantiles(sample, &self.params.quantiles),
        }
    }

    /// Drive all three phases over the whole uncertainty axis.
    pub fn run(&mut self) -> Result<CutLoopResult, McError> {
        self.run_with_sink(&mut NoopSink)
    }

    /// As `run`, emitting each iteration summary to `sink` as it is
    /// produced (the raw sample is dropped right after).
    pub fn run_with_sink(&mut self, sink: &mut dyn EventSink) -> Result<CutLoopResult, McError> {
        self.initialize()?;

        let mut iterations = Vec::with_capacity(self.params.nsu);
        for j in 0..self.params.nsu {
            let sample = self.compose_iteration(j)?;
            let summary = self.summarize_iteration(j, &sample);
            sink.log_iteration(&summary);
            iterations.push(summary);
            // `sample` goes out of scope here; only the summary survives.
        }

        Ok(CutLoopResult {
            nsv: self.params.nsv,
            nsu: self.params.nsu,
            quantile_levels: self.params.quantiles.clone(),
            iterations,
        })
    }
}
