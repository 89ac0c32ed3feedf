// src/eval/full_matrix.rs
//
// Full-matrix evaluator: materializes the complete variability x
// uncertainty result table.
//
// Realization order: every uncertainty node is realized once, as a
// single length-nsu draw, before the column loop;
// inside the loop, every variability node is re-realized with the same
// per-node seed, which the sampler's reset contract makes bit-identical
// across columns. The redundant redraw is deliberate: it exercises the
// reproducibility contract on every column and keeps this evaluator
// structurally independent from the cut-loop's realize-once strategy
// while remaining exactly equivalent to it.

use serde::Serialize;

use crate::config::EvalParams;
use crate::error::McError;
use crate::model::{Model, NodeSpec};
use crate::node::{Matrix, McNode, Role};
use crate::output::result_checksum;
use crate::sampler::Sampler;

use super::{check_inputs, eval_expr, extract_column, node_seed};

/// Dense evaluation result: the nsv x nsu table plus its metadata and a
/// determinism checksum over the payload.
#[derive(Debug, Clone, Serialize)]
pub struct FullMatrixResult {
    pub nsv: usize,
    pub nsu: usize,
    /// Dimensional role of the output node, resolved symbolically.
    pub role: Role,
    pub data: Matrix,
    /// sha256 over {nsv, nsu, role} and the bit pattern of every cell.
    pub checksum: String,
}

impl FullMatrixResult {
    /// Exact value identity: metadata AND bit-for-bit payload equality.
    ///
    /// This is the engine's primary self-consistency check between two
    /// independently produced results for the same model and seed.
    pub fn is_identical(&self, other: &FullMatrixResult) -> bool {
        self.nsv == other.nsv
            && self.nsu == other.nsu
            && self.role == other.role
            && self.data.bits_eq(&other.data)
    }

    /// The length-nsv sample for uncertainty iteration `j`.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.data.column(j)
    }

    /// Per-column means, in iteration order.
    pub fn column_means(&self) -> Vec<f64> {
        (0..self.nsu)
            .map(|j| {
                let col = self.data.column(j);
                col.iter().sum::<f64>() / col.len() as f64
            })
            .collect()
    }
}

/// Run the full-matrix evaluation. Memory footprint is O(nsv * nsu).
///
/// Fails fast: any sampling or composition error aborts the evaluation
/// and the half-filled table is discarded, not returned.
pub fn evaluate_full_matrix(model: &Model, params: &EvalParams) -> Result<FullMatrixResult, McError> {
    check_inputs(model, params)?;

    let mut sampler = Sampler::new();

    // Phase 1: realize every uncertainty node once, before the loop.
    let mut uncertainty: Vec<Option<Vec<f64>>> = vec![None; model.nodes().len()];
    for (idx, (_, spec)) in model.nodes().iter().enumerate() {
        if let NodeSpec::Sampled {
            role: Role::Uncertainty,
            distribution,
        } = spec
        {
            let seed = node_seed(params.seed, idx, None);
            uncertainty[idx] = Some(sampler.draw(distribution, params.nsu, seed)?);
        }
    }

    // Phase 2: one column per uncertainty iteration.
    let mut data = Matrix::zeros(params.nsv, params.nsu)?;
    for j in 0..params.nsu {
        let column = compose_column(model, params, &mut sampler, &uncertainty, j)?;
        data.set_column(j, &column);
    }

    let role = model.output_role();
    let checksum = result_checksum(params.nsv, params.nsu, role, &data);
    Ok(FullMatrixResult {
        nsv: params.nsv,
        nsu: params.nsu,
        role,
        data,
        checksum,
    })
}

/// Realize all nodes for uncertainty iteration `j` and evaluate the
/// output expression into a length-nsv column.
fn compose_column(
    model: &Model,
    params: &EvalParams,
    sampler: &mut Sampler,
    uncertainty: &[Option<Vec<f64>>],
    j: usize,
) -> Result<Vec<f64>, McError> {
    let mut env: Vec<McNode> = Vec::with_capacity(model.nodes().len());

    for (idx, (name, spec)) in model.nodes().iter().enumerate() {
        let node = match spec {
            NodeSpec::Constant { value } => McNode::constant(name.clone(), *value),
            NodeSpec::Sampled {
                role: Role::Variability,
                distribution,
            } => {
                let iteration = params.vary_variability_per_iteration.then_some(j);
                let seed = node_seed(params.seed, idx, iteration);
                let xs = sampler.draw(distribution, params.nsv, seed)?;
                McNode::variability(name.clone(), xs, params.nsv)?
                    .with_provenance(distribution.clone(), seed)
            }
            NodeSpec::Sampled { .. } => {
                // Uncertainty node: its j-th value enters the column as a
                // scalar operand.
                let values = uncertainty[idx]
                    .as_ref()
                    .expect("uncertainty nodes realized before the loop");
                McNode::constant(name.clone(), values[j])
            }
            NodeSpec::Derived { expr } => {
                let mut node = eval_expr(expr, &env)?;
                node.name = name.clone();
                node
            }
        };
        env.push(node);
    }

    let output = env
        .iter()
        .find(|n| n.name == model.output_name())
        .ok_or_else(|| McError::UndefinedNode {
            name: model.output_name().to_string(),
            context: "column composition".to_string(),
        })?;

    extract_column(output, params.nsv)
}
