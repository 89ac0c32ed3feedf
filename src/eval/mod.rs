// src/eval/mod.rs
//
// The two evaluation strategies over a declared model:
//
// - full_matrix: materializes the complete nsv x nsu result table,
//   O(nsv*nsu) memory.
// - cut_loop: walks the uncertainty axis iteration by iteration and
//   retains only fixed-size summaries, O(nsv) memory.
//
// Both realize nodes with the same per-node seed derivation, so for the
// same model, seed, and sizes they are interchangeable: the cut-loop's
// per-iteration samples are bit-identical to the full matrix's columns.
//
// Seed discipline: node k of the model draws with `seed + k`. Variability
// nodes use that same seed on every uncertainty iteration (the reference
// behavior; see EvalParams::vary_variability_per_iteration for the
// explicit opt-out, which offsets the seed by a per-iteration stride).

pub mod cut_loop;
pub mod full_matrix;

pub use cut_loop::{CutLoopEvaluator, CutLoopResult, IterationSummary};
pub use full_matrix::{evaluate_full_matrix, FullMatrixResult};

use crate::compose::compose;
use crate::config::EvalParams;
use crate::error::McError;
use crate::model::{Expr, Model};
use crate::node::{McNode, NodeValues, Role};

/// Stride separating per-iteration variability seeds when
/// `vary_variability_per_iteration` is on.
pub(crate) const PER_ITERATION_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed for node `node_index`, optionally offset for iteration `j`.
pub(crate) fn node_seed(base_seed: u64, node_index: usize, iteration: Option<usize>) -> u64 {
    let s = base_seed.wrapping_add(node_index as u64);
    match iteration {
        None => s,
        Some(j) => s.wrapping_add(((j as u64) + 1).wrapping_mul(PER_ITERATION_SEED_STRIDE)),
    }
}

/// Evaluate a derived expression over the realized nodes of one
/// uncertainty iteration. Within an iteration the environment holds only
/// constants and length-nsv vectors, so results never span both axes.
pub(crate) fn eval_expr(expr: &Expr, env: &[McNode]) -> Result<McNode, McError> {
    match expr {
        Expr::Name(n) => env
            .iter()
            .find(|node| node.name == *n)
            .cloned()
            .ok_or_else(|| McError::UndefinedNode {
                name: n.clone(),
                context: "expression evaluation".to_string(),
            }),
        Expr::Const(c) => Ok(McNode::constant("const", *c)),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(lhs, env)?;
            let r = eval_expr(rhs, env)?;
            let name = format!("({} {} {})", l.name, op.symbol(), r.name);
            compose(*op, &l, &r, name)
        }
    }
}

/// Extract the length-nsv column sample from an iteration's output node.
/// A constant output broadcasts over the variability axis.
pub(crate) fn extract_column(node: &McNode, nsv: usize) -> Result<Vec<f64>, McError> {
    match (&node.values, node.role) {
        (NodeValues::Scalar(v), Role::Constant) => Ok(vec![*v; nsv]),
        (NodeValues::Vector(xs), Role::Variability) => {
            if xs.len() != nsv {
                return Err(McError::ShapeMismatch {
                    left: node.name.clone(),
                    left_len: xs.len(),
                    right: "nsv".to_string(),
                    right_len: nsv,
                });
            }
            Ok(xs.clone())
        }
        _ => Err(McError::InvalidParams {
            context: format!("output node '{}'", node.name),
            message: format!(
                "iteration output must be constant or variability (got {})",
                node.role.as_str()
            ),
        }),
    }
}

/// Validate model/params pairing shared by both evaluators.
pub(crate) fn check_inputs(model: &Model, params: &EvalParams) -> Result<(), McError> {
    params.validate()?;
    // The model is validated at build time; re-check the output exists to
    // fail fast on hand-constructed values.
    if model.get(model.output_name()).is_none() {
        return Err(McError::UndefinedNode {
            name: model.output_name().to_string(),
            context: "output designation".to_string(),
        });
    }
    Ok(())
}
