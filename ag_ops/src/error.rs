//! Error types for operator construction, evaluation and differentiation.

use ag_tensor::{Shape, TensorError};
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Everything an operation can fail with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Wrong number of inputs for an operation.
    #[error("{op} expects {expected} input(s), got {got}")]
    ArityMismatch {
        op: String,
        expected: usize,
        got: usize,
    },

    /// Operand dtype or kind (scalar vs tensor) is not the one required.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// No kernel or rule exists for this combination.
    #[error("{what} is not implemented for {context}")]
    NotImplemented { what: String, context: String },

    /// Differentiation was requested for an operation that has no derivative.
    #[error("{op} is not differentiable")]
    NotDifferentiable { op: String },

    /// Operand shapes are incompatible.
    #[error("shape mismatch: {lhs} vs {rhs}")]
    ShapeMismatch { lhs: Shape, rhs: Shape },

    /// Reduction axes are outside the input's rank.
    #[error("axes {along:?} are out of range for shape {shape}")]
    AxisOutOfRange { along: Vec<usize>, shape: Shape },

    /// A node has no value bound yet.
    #[error("node {node} has no bound value")]
    Unbound { node: String },

    /// Failure inside a storage or compute kernel.
    #[error("kernel error: {0}")]
    ExternalCompute(#[from] TensorError),
}

impl Error {
    pub(crate) fn type_mismatch(expected: impl ToString, got: impl ToString) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    pub(crate) fn not_implemented(what: impl ToString, context: impl ToString) -> Self {
        Error::NotImplemented {
            what: what.to_string(),
            context: context.to_string(),
        }
    }
}
