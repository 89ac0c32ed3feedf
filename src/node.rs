// src/node.rs
//
// Stochastic nodes: typed containers for sampled or constant values along
// one or both sampling axes.
//
// A node's role decides the shape of its payload:
// - Constant                -> one scalar
// - Variability             -> length-nsv vector (between-individual axis)
// - Uncertainty             -> length-nsu vector (analyst-uncertainty axis)
// - VariabilityUncertainty  -> nsv x nsu matrix (composite)
//
// Shape invariants are enforced at construction, not inferred at use.

use serde::{Deserialize, Serialize};

use crate::error::McError;
use crate::sampler::Distribution;

/// Dimensional role of a stochastic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Constant,
    Variability,
    Uncertainty,
    VariabilityUncertainty,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Constant => "constant",
            Role::Variability => "variability",
            Role::Uncertainty => "uncertainty",
            Role::VariabilityUncertainty => "variability_uncertainty",
        }
    }
}

/// Dense row-major `nrows x ncols` table of f64.
///
/// Rows index the variability axis, columns the uncertainty axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled matrix. Both dimensions must be >= 1.
    pub fn zeros(nrows: usize, ncols: usize) -> Result<Self, McError> {
        if nrows == 0 || ncols == 0 {
            return Err(McError::InvalidParams {
                context: "Matrix::zeros".to_string(),
                message: format!("dimensions must be >= 1 (got {}x{})", nrows, ncols),
            });
        }
        Ok(Self {
            nrows,
            ncols,
            data: vec![0.0; nrows * ncols],
        })
    }

    /// Build elementwise from a function of (row, col).
    pub fn from_fn<F: FnMut(usize, usize) -> f64>(
        nrows: usize,
        ncols: usize,
        mut f: F,
    ) -> Result<Self, McError> {
        let mut m = Self::zeros(nrows, ncols)?;
        for i in 0..nrows {
            for j in 0..ncols {
                m.set(i, j, f(i, j));
            }
        }
        Ok(m)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ncols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.ncols + col] = value;
    }

    /// Copy out column `col` (the per-uncertainty-iteration sample).
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.nrows).map(|i| self.get(i, col)).collect()
    }

    /// Write a length-`nrows` column into position `col`.
    pub fn set_column(&mut self, col: usize, values: &[f64]) {
        debug_assert_eq!(values.len(), self.nrows);
        for (i, v) in values.iter().enumerate() {
            self.set(i, col, *v);
        }
    }

    /// Flat row-major view of the payload.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Bit-exact equality (NaN-safe, unlike `==` on floats).
    pub fn bits_eq(&self, other: &Matrix) -> bool {
        self.nrows == other.nrows
            && self.ncols == other.ncols
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Realized payload of a node, shaped per its role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeValues {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Matrix),
}

/// A named stochastic quantity with a dimensional role and realized values.
///
/// `distribution` and `seed` are retained for reproducibility audits; both
/// are absent for constants and derived nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McNode {
    pub name: String,
    pub role: Role,
    pub values: NodeValues,
    pub distribution: Option<Distribution>,
    pub seed: Option<u64>,
}

impl McNode {
    /// Wrap a constant.
    pub fn constant(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            role: Role::Constant,
            values: NodeValues::Scalar(value),
            distribution: None,
            seed: None,
        }
    }

    /// A realized variability node; `values` must have length exactly `nsv`.
    pub fn variability(
        name: impl Into<String>,
        values: Vec<f64>,
        nsv: usize,
    ) -> Result<Self, McError> {
        let name = name.into();
        if values.len() != nsv {
            return Err(McError::ShapeMismatch {
                left: name,
                left_len: values.len(),
                right: "nsv".to_string(),
                right_len: nsv,
            });
        }
        Ok(Self {
            name,
            role: Role::Variability,
            values: NodeValues::Vector(values),
            distribution: None,
            seed: None,
        })
    }

    /// A realized uncertainty node; `values` must have length exactly `nsu`.
    pub fn uncertainty(
        name: impl Into<String>,
        values: Vec<f64>,
        nsu: usize,
    ) -> Result<Self, McError> {
        let name = name.into();
        if values.len() != nsu {
            return Err(McError::ShapeMismatch {
                left: name,
                left_len: values.len(),
                right: "nsu".to_string(),
                right_len: nsu,
            });
        }
        Ok(Self {
            name,
            role: Role::Uncertainty,
            values: NodeValues::Vector(values),
            distribution: None,
            seed: None,
        })
    }

    /// A realized composite node of shape `nsv x nsu`.
    pub fn composite(
        name: impl Into<String>,
        matrix: Matrix,
        nsv: usize,
        nsu: usize,
    ) -> Result<Self, McError> {
        let name = name.into();
        if matrix.nrows() != nsv || matrix.ncols() != nsu {
            return Err(McError::ShapeMismatch {
                left: name,
                left_len: matrix.nrows() * matrix.ncols(),
                right: "nsv*nsu".to_string(),
                right_len: nsv * nsu,
            });
        }
        Ok(Self {
            name,
            role: Role::VariabilityUncertainty,
            values: NodeValues::Matrix(matrix),
            distribution: None,
            seed: None,
        })
    }

    /// Attach sampling provenance (distribution + seed) for audits.
    pub fn with_provenance(mut self, distribution: Distribution, seed: u64) -> Self {
        self.distribution = Some(distribution);
        self.seed = Some(seed);
        self
    }

    /// The scalar payload, if this is a constant node.
    pub fn as_scalar(&self) -> Option<f64> {
        match &self.values {
            NodeValues::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The 1-D payload, if this is a variability or uncertainty node.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match &self.values {
            NodeValues::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// The 2-D payload, if this is a composite node.
    pub fn as_matrix(&self) -> Option<&Matrix> {
        match &self.values {
            NodeValues::Matrix(m) => Some(m),
            _ => None,
        }
    }
}
