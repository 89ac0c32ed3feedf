// src/compose.rs
//
// Composition engine: binary arithmetic over realized stochastic nodes.
//
// The result role is resolved by a symmetric table over the operand roles;
// values follow broadcast rules across the two sampling axes. Combining a
// Variability node with an Uncertainty node takes the outer product
// `result[i][j] = a[i] op b[j]`, which is where composite (VU) nodes come
// from. The engine is pure: it never samples, and both operands must
// already hold realized values.

use serde::{Deserialize, Serialize};

use crate::error::McError;
use crate::node::{Matrix, McNode, NodeValues, Role};

/// Binary arithmetic operator over nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Apply to a pair of scalars. Division follows IEEE-754; a zero
    /// divisor yields an infinity or NaN that propagates downstream.
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
        }
    }
}

/// Resolve the role of `a op b` per the symmetric role table.
///
/// Constant broadcasts into anything; same-axis pairs stay on their axis;
/// Variability x Uncertainty spans both axes; VU absorbs everything.
pub fn resolve_role(a: Role, b: Role) -> Role {
    use Role::*;
    match (a, b) {
        (Constant, r) | (r, Constant) => r,
        (Variability, Variability) => Variability,
        (Uncertainty, Uncertainty) => Uncertainty,
        (Variability, Uncertainty) | (Uncertainty, Variability) => VariabilityUncertainty,
        (VariabilityUncertainty, _) | (_, VariabilityUncertainty) => VariabilityUncertainty,
    }
}

fn shape_mismatch(a: &McNode, a_len: usize, b: &McNode, b_len: usize) -> McError {
    McError::ShapeMismatch {
        left: a.name.clone(),
        left_len: a_len,
        right: b.name.clone(),
        right_len: b_len,
    }
}

/// Combine two realized nodes with a binary operator.
///
/// Fails with `ShapeMismatch` when two nodes on the same axis have
/// different declared lengths. Never triggers sampling.
pub fn compose(
    op: BinaryOp,
    a: &McNode,
    b: &McNode,
    name: impl Into<String>,
) -> Result<McNode, McError> {
    let name = name.into();
    let role = resolve_role(a.role, b.role);

    let values = match (&a.values, &b.values) {
        // Constant op Constant
        (NodeValues::Scalar(x), NodeValues::Scalar(y)) => NodeValues::Scalar(op.apply(*x, *y)),

        // Constant broadcast over a vector axis (both operand orders; the
        // operator is not symmetric for Sub/Div).
        (NodeValues::Scalar(x), NodeValues::Vector(ys)) => {
            NodeValues::Vector(ys.iter().map(|y| op.apply(*x, *y)).collect())
        }
        (NodeValues::Vector(xs), NodeValues::Scalar(y)) => {
            NodeValues::Vector(xs.iter().map(|x| op.apply(*x, *y)).collect())
        }

        // Constant broadcast over a composite.
        (NodeValues::Scalar(x), NodeValues::Matrix(m)) => {
            let out = Matrix::from_fn(m.nrows(), m.ncols(), |i, j| op.apply(*x, m.get(i, j)))?;
            NodeValues::Matrix(out)
        }
        (NodeValues::Matrix(m), NodeValues::Scalar(y)) => {
            let out = Matrix::from_fn(m.nrows(), m.ncols(), |i, j| op.apply(m.get(i, j), *y))?;
            NodeValues::Matrix(out)
        }

        // Vector op vector: elementwise on a shared axis, or the outer
        // product across axes.
        (NodeValues::Vector(xs), NodeValues::Vector(ys)) => match (a.role, b.role) {
            (Role::Variability, Role::Uncertainty) => {
                let out = Matrix::from_fn(xs.len(), ys.len(), |i, j| op.apply(xs[i], ys[j]))?;
                NodeValues::Matrix(out)
            }
            (Role::Uncertainty, Role::Variability) => {
                let out = Matrix::from_fn(ys.len(), xs.len(), |i, j| op.apply(xs[j], ys[i]))?;
                NodeValues::Matrix(out)
            }
            _ => {
                if xs.len() != ys.len() {
                    return Err(shape_mismatch(a, xs.len(), b, ys.len()));
                }
                NodeValues::Vector(
                    xs.iter()
                        .zip(ys.iter())
                        .map(|(x, y)| op.apply(*x, *y))
                        .collect(),
                )
            }
        },

        // Composite op vector: broadcast the vector across its missing axis.
        (NodeValues::Matrix(m), NodeValues::Vector(ys)) => {
            let out = broadcast_matrix_vector(op, m, ys, b.role, false)
                .map_err(|(ml, vl)| shape_mismatch(a, ml, b, vl))?;
            NodeValues::Matrix(out)
        }
        (NodeValues::Vector(xs), NodeValues::Matrix(m)) => {
            let out = broadcast_matrix_vector(op, m, xs, a.role, true)
                .map_err(|(ml, vl)| shape_mismatch(b, ml, a, vl))?;
            NodeValues::Matrix(out)
        }

        // Composite op composite: elementwise with equal shapes.
        (NodeValues::Matrix(ma), NodeValues::Matrix(mb)) => {
            if ma.nrows() != mb.nrows() || ma.ncols() != mb.ncols() {
                return Err(shape_mismatch(
                    a,
                    ma.nrows() * ma.ncols(),
                    b,
                    mb.nrows() * mb.ncols(),
                ));
            }
            let out =
                Matrix::from_fn(ma.nrows(), ma.ncols(), |i, j| {
                    op.apply(ma.get(i, j), mb.get(i, j))
                })?;
            NodeValues::Matrix(out)
        }
    };

    Ok(McNode {
        name,
        role,
        values,
        distribution: None,
        seed: None,
    })
}

/// Broadcast a 1-D operand across the composite's missing axis, then apply
/// elementwise. `vector_is_lhs` preserves operand order for Sub/Div.
///
/// On a length mismatch returns `(matrix_axis_len, vector_len)`.
fn broadcast_matrix_vector(
    op: BinaryOp,
    m: &Matrix,
    v: &[f64],
    v_role: Role,
    vector_is_lhs: bool,
) -> Result<Matrix, (usize, usize)> {
    let pick = |i: usize, j: usize| match v_role {
        Role::Variability => v[i],
        Role::Uncertainty => v[j],
        // Vector payloads only occur for the two 1-D roles.
        _ => unreachable!("vector payload with role {:?}", v_role),
    };

    match v_role {
        Role::Variability if v.len() != m.nrows() => return Err((m.nrows(), v.len())),
        Role::Uncertainty if v.len() != m.ncols() => return Err((m.ncols(), v.len())),
        _ => {}
    }

    let out = Matrix::from_fn(m.nrows(), m.ncols(), |i, j| {
        if vector_is_lhs {
            op.apply(pick(i, j), m.get(i, j))
        } else {
            op.apply(m.get(i, j), pick(i, j))
        }
    })
    .expect("composite operand has validated non-empty shape");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, values: Vec<f64>) -> McNode {
        let n = values.len();
        McNode::variability(name, values, n).unwrap()
    }

    fn unc(name: &str, values: Vec<f64>) -> McNode {
        let n = values.len();
        McNode::uncertainty(name, values, n).unwrap()
    }

    #[test]
    fn role_table_is_symmetric() {
        use Role::*;
        let roles = [Constant, Variability, Uncertainty, VariabilityUncertainty];
        for &a in &roles {
            for &b in &roles {
                assert_eq!(resolve_role(a, b), resolve_role(b, a));
            }
        }
        assert_eq!(resolve_role(Constant, Constant), Constant);
        assert_eq!(resolve_role(Variability, Uncertainty), VariabilityUncertainty);
        assert_eq!(
            resolve_role(VariabilityUncertainty, Constant),
            VariabilityUncertainty
        );
    }

    #[test]
    fn outer_product_spans_both_axes() {
        // nsv=2 variability [1, 2], nsu=2 uncertainty [10, 20]:
        // result[i][j] = v[i] * u[j] = [[10, 20], [20, 40]].
        let v = var("v", vec![1.0, 2.0]);
        let u = unc("u", vec![10.0, 20.0]);
        let out = compose(BinaryOp::Mul, &v, &u, "v*u").unwrap();
        assert_eq!(out.role, Role::VariabilityUncertainty);
        let m = out.as_matrix().unwrap();
        assert_eq!(m.get(0, 0), 10.0);
        assert_eq!(m.get(0, 1), 20.0);
        assert_eq!(m.get(1, 0), 20.0);
        assert_eq!(m.get(1, 1), 40.0);
    }

    #[test]
    fn outer_product_respects_operand_order() {
        let v = var("v", vec![1.0, 2.0]);
        let u = unc("u", vec![10.0, 20.0]);
        // u - v must be u[j] - v[i], still shaped nsv x nsu.
        let out = compose(BinaryOp::Sub, &u, &v, "u-v").unwrap();
        let m = out.as_matrix().unwrap();
        assert_eq!((m.nrows(), m.ncols()), (2, 2));
        assert_eq!(m.get(0, 0), 9.0);
        assert_eq!(m.get(1, 1), 18.0);
    }

    #[test]
    fn elementwise_requires_equal_lengths() {
        let a = var("a", vec![1.0, 2.0, 3.0]);
        let b = var("b", vec![1.0, 2.0, 3.0, 4.0]);
        let err = compose(BinaryOp::Add, &a, &b, "a+b").unwrap_err();
        match err {
            McError::ShapeMismatch {
                left_len, right_len, ..
            } => {
                assert_eq!((left_len, right_len), (3, 4));
            }
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn constant_broadcast_keeps_operand_order() {
        let c = McNode::constant("c", 10.0);
        let v = var("v", vec![1.0, 2.0]);

        let left = compose(BinaryOp::Sub, &c, &v, "c-v").unwrap();
        assert_eq!(left.as_vector().unwrap(), &[9.0, 8.0]);
        assert_eq!(left.role, Role::Variability);

        let right = compose(BinaryOp::Sub, &v, &c, "v-c").unwrap();
        assert_eq!(right.as_vector().unwrap(), &[-9.0, -8.0]);
    }

    #[test]
    fn constant_broadcast_over_uncertainty() {
        let c = McNode::constant("c", 2.0);
        let u = unc("u", vec![1.0, 2.0, 3.0]);
        let out = compose(BinaryOp::Mul, &c, &u, "c*u").unwrap();
        assert_eq!(out.role, Role::Uncertainty);
        assert_eq!(out.as_vector().unwrap(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn vu_broadcasts_missing_axis() {
        let v = var("v", vec![1.0, 2.0]);
        let u = unc("u", vec![10.0, 20.0, 30.0]);
        let vu = compose(BinaryOp::Mul, &v, &u, "vu").unwrap();

        // VU + Variability: v[i] added down each column.
        let plus_v = compose(BinaryOp::Add, &vu, &v, "vu+v").unwrap();
        let m = plus_v.as_matrix().unwrap();
        assert_eq!(m.get(0, 0), 11.0);
        assert_eq!(m.get(1, 2), 62.0);

        // Uncertainty / VU: u[j] over each row, vector on the left.
        let u_over = compose(BinaryOp::Div, &u, &vu, "u/vu").unwrap();
        let m = u_over.as_matrix().unwrap();
        assert_eq!(m.get(0, 0), 10.0 / 10.0);
        assert_eq!(m.get(1, 1), 20.0 / 40.0);
        assert_eq!(u_over.role, Role::VariabilityUncertainty);
    }

    #[test]
    fn vu_axis_mismatch_is_rejected() {
        let v = var("v", vec![1.0, 2.0]);
        let u = unc("u", vec![10.0, 20.0, 30.0]);
        let vu = compose(BinaryOp::Mul, &v, &u, "vu").unwrap();

        let short_v = var("short_v", vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            compose(BinaryOp::Add, &vu, &short_v, "bad"),
            Err(McError::ShapeMismatch { .. })
        ));

        let short_u = unc("short_u", vec![1.0]);
        assert!(matches!(
            compose(BinaryOp::Add, &vu, &short_u, "bad"),
            Err(McError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn vu_elementwise_requires_equal_shape() {
        let v = var("v", vec![1.0, 2.0]);
        let u2 = unc("u2", vec![1.0, 2.0]);
        let u3 = unc("u3", vec![1.0, 2.0, 3.0]);
        let a = compose(BinaryOp::Mul, &v, &u2, "a").unwrap();
        let b = compose(BinaryOp::Mul, &v, &u3, "b").unwrap();
        assert!(matches!(
            compose(BinaryOp::Add, &a, &b, "a+b"),
            Err(McError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn division_follows_ieee754() {
        let a = var("a", vec![1.0, -1.0]);
        let z = McNode::constant("z", 0.0);
        let out = compose(BinaryOp::Div, &a, &z, "a/z").unwrap();
        let xs = out.as_vector().unwrap();
        assert!(xs[0].is_infinite() && xs[0] > 0.0);
        assert!(xs[1].is_infinite() && xs[1] < 0.0);
    }
}
