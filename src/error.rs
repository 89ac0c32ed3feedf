// src/error.rs
//
// Error taxonomy for the two-dimensional Monte Carlo engine.
//
// All errors are fatal: draws and compositions are deterministic given
// valid inputs, so nothing is retried. Evaluation aborts at the offending
// node or operation and partial results are discarded, never returned.

/// Errors produced by sampling, composition, and evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum McError {
    /// Sampler parameters outside the distribution's valid domain
    /// (e.g. `sdlog <= 0`, negative weights, empty value list).
    DistributionParam {
        distribution: &'static str,
        message: String,
    },
    /// Two nodes on the same sampling axis have incompatible lengths.
    ShapeMismatch {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },
    /// An expression references a node that is not declared, or not yet
    /// declared at the point of use.
    UndefinedNode { name: String, context: String },
    /// Invalid evaluation or model parameters (e.g. `nsv == 0`,
    /// a quantile level outside `[0, 1]`, a duplicate node name).
    InvalidParams { context: String, message: String },
}

impl std::fmt::Display for McError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McError::DistributionParam {
                distribution,
                message,
            } => {
                write!(f, "Invalid {} parameters: {}", distribution, message)
            }
            McError::ShapeMismatch {
                left,
                left_len,
                right,
                right_len,
            } => {
                write!(
                    f,
                    "Shape mismatch: '{}' has length {} but '{}' has length {}",
                    left, left_len, right, right_len
                )
            }
            McError::UndefinedNode { name, context } => {
                write!(f, "Undefined node '{}' referenced by {}", name, context)
            }
            McError::InvalidParams { context, message } => {
                write!(f, "Invalid parameters in {}: {}", context, message)
            }
        }
    }
}

impl std::error::Error for McError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offending_names() {
        let err = McError::ShapeMismatch {
            left: "consumption".to_string(),
            left_len: 3,
            right: "concentration".to_string(),
            right_len: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("consumption"));
        assert!(msg.contains("concentration"));
        assert!(msg.contains('3'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn display_names_distribution() {
        let err = McError::DistributionParam {
            distribution: "log_normal",
            message: "sdlog must be > 0".to_string(),
        };
        assert!(err.to_string().contains("log_normal"));
    }
}
