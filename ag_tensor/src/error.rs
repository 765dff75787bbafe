//! Error types for tensor storage and kernels.

use thiserror::Error;

use crate::dtype::Dtype;
use crate::shape::Shape;

/// Result type alias using [`TensorError`].
pub type Result<T> = std::result::Result<T, TensorError>;

/// Errors raised by storage construction and the CPU kernels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    /// Two operands that must agree in shape do not.
    #[error("shape mismatch: {lhs} vs {rhs}")]
    ShapeMismatch { lhs: Shape, rhs: Shape },

    /// Flat data length does not fit the requested shape.
    #[error("data length {len} does not match shape {shape} (numel={})", shape.numel())]
    LengthMismatch { len: usize, shape: Shape },

    /// Axis index outside the tensor's rank.
    #[error("axis {axis} is out of range for a tensor of rank {ndim}")]
    InvalidAxis { axis: usize, ndim: usize },

    /// Kernel expected a different number of dimensions.
    #[error("{op} expects a rank-{expected} operand, got shape {got}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        got: Shape,
    },

    /// Storage of one dtype cannot be combined with another.
    #[error("dtype mismatch: {lhs} vs {rhs}")]
    DtypeMismatch { lhs: Dtype, rhs: Dtype },

    /// No kernel for this dtype.
    #[error("{op} is not supported for {dtype}")]
    Unsupported { op: &'static str, dtype: Dtype },
}
