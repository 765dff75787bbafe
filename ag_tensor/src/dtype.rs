//! Element types and the mapping from Rust types to [`Dtype`].

use std::fmt;
use std::ops::AddAssign;

use num_traits::Float;

use crate::dense::Dense;
use crate::value::{Scalar, Tensor};

/// Runtime element type of a [`Value`](crate::Value).
///
/// `Float32` and `Float64` are the numeric element types. `Bool` only ever
/// appears as the result of a comparison that was not asked to return its
/// operands' dtype; no arithmetic kernel accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dtype {
    Float32,
    Float64,
    Bool,
}

impl Dtype {
    /// Whether arithmetic kernels exist for this dtype.
    pub fn is_float(self) -> bool {
        matches!(self, Dtype::Float32 | Dtype::Float64)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Float32 => write!(f, "float32"),
            Dtype::Float64 => write!(f, "float64"),
            Dtype::Bool => write!(f, "bool"),
        }
    }
}

/// Floating-point element stored in a [`Dense`] buffer.
///
/// Connects the generic kernels to the runtime [`Tensor`]/[`Scalar`] unions so
/// dispatch code can be written once and instantiated per dtype.
pub trait Element: Float + AddAssign + Default + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The dtype tag for this Rust type.
    const DTYPE: Dtype;

    /// Wrap typed storage into the runtime tensor union.
    fn wrap_dense(dense: Dense<Self>) -> Tensor;

    /// Borrow typed storage out of the runtime tensor union.
    fn dense(tensor: &Tensor) -> Option<&Dense<Self>>;

    /// Mutably borrow typed storage out of the runtime tensor union.
    fn dense_mut(tensor: &mut Tensor) -> Option<&mut Dense<Self>>;

    /// Take typed storage out of the runtime tensor union, handing it back on mismatch.
    fn into_dense(tensor: Tensor) -> std::result::Result<Dense<Self>, Tensor>;

    /// Wrap a bare number into the runtime scalar union.
    fn wrap_scalar(v: Self) -> Scalar;

    /// Read a bare number out of the runtime scalar union.
    fn scalar(s: &Scalar) -> Option<Self>;

    /// Convert from f64 (used for constants such as `ln 2`).
    fn from_f64(v: f64) -> Self;
}

impl Element for f32 {
    const DTYPE: Dtype = Dtype::Float32;

    fn wrap_dense(dense: Dense<f32>) -> Tensor {
        Tensor::F32(dense)
    }

    fn dense(tensor: &Tensor) -> Option<&Dense<f32>> {
        match tensor {
            Tensor::F32(d) => Some(d),
            _ => None,
        }
    }

    fn dense_mut(tensor: &mut Tensor) -> Option<&mut Dense<f32>> {
        match tensor {
            Tensor::F32(d) => Some(d),
            _ => None,
        }
    }

    fn into_dense(tensor: Tensor) -> std::result::Result<Dense<f32>, Tensor> {
        match tensor {
            Tensor::F32(d) => Ok(d),
            other => Err(other),
        }
    }

    fn wrap_scalar(v: f32) -> Scalar {
        Scalar::F32(v)
    }

    fn scalar(s: &Scalar) -> Option<f32> {
        match s {
            Scalar::F32(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    fn from_f64(v: f64) -> f32 {
        v as f32
    }
}

impl Element for f64 {
    const DTYPE: Dtype = Dtype::Float64;

    fn wrap_dense(dense: Dense<f64>) -> Tensor {
        Tensor::F64(dense)
    }

    fn dense(tensor: &Tensor) -> Option<&Dense<f64>> {
        match tensor {
            Tensor::F64(d) => Some(d),
            _ => None,
        }
    }

    fn dense_mut(tensor: &mut Tensor) -> Option<&mut Dense<f64>> {
        match tensor {
            Tensor::F64(d) => Some(d),
            _ => None,
        }
    }

    fn into_dense(tensor: Tensor) -> std::result::Result<Dense<f64>, Tensor> {
        match tensor {
            Tensor::F64(d) => Ok(d),
            other => Err(other),
        }
    }

    fn wrap_scalar(v: f64) -> Scalar {
        Scalar::F64(v)
    }

    fn scalar(s: &Scalar) -> Option<f64> {
        match s {
            Scalar::F64(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    fn from_f64(v: f64) -> f64 {
        v
    }
}
