//! Runtime values: a closed union over bare scalars and dense tensors.

use std::fmt;

use crate::dense::Dense;
use crate::dtype::{Dtype, Element};
use crate::error::{Result, TensorError};
use crate::kernels;
use crate::shape::Shape;

/// A bare number with no shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F32(f32),
    F64(f64),
    Bool(bool),
}

impl Scalar {
    pub fn dtype(&self) -> Dtype {
        match self {
            Scalar::F32(_) => Dtype::Float32,
            Scalar::F64(_) => Dtype::Float64,
            Scalar::Bool(_) => Dtype::Bool,
        }
    }

    /// Numeric value widened to f64 (`true` is 1).
    pub fn to_f64(&self) -> f64 {
        match *self {
            Scalar::F32(v) => v as f64,
            Scalar::F64(v) => v,
            Scalar::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// A scalar of `dtype` holding `v`.
    pub fn from_f64(dtype: Dtype, v: f64) -> Scalar {
        match dtype {
            Dtype::Float32 => Scalar::F32(v as f32),
            Dtype::Float64 => Scalar::F64(v),
            Dtype::Bool => Scalar::Bool(v != 0.0),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::F32(v) => write!(f, "{}", v),
            Scalar::F64(v) => write!(f, "{}", v),
            Scalar::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Dense storage tagged with its dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    F32(Dense<f32>),
    F64(Dense<f64>),
    Bool(Dense<bool>),
}

impl Tensor {
    pub fn dtype(&self) -> Dtype {
        match self {
            Tensor::F32(_) => Dtype::Float32,
            Tensor::F64(_) => Dtype::Float64,
            Tensor::Bool(_) => Dtype::Bool,
        }
    }

    pub fn shape(&self) -> &Shape {
        match self {
            Tensor::F32(d) => d.shape(),
            Tensor::F64(d) => d.shape(),
            Tensor::Bool(d) => d.shape(),
        }
    }

    pub fn numel(&self) -> usize {
        self.shape().numel()
    }

    /// A tensor of `dtype` and `shape` filled with `v`.
    pub fn full(dtype: Dtype, shape: Shape, v: f64) -> Tensor {
        match dtype {
            Dtype::Float32 => Tensor::F32(Dense::full(shape, v as f32)),
            Dtype::Float64 => Tensor::F64(Dense::full(shape, v)),
            Dtype::Bool => Tensor::Bool(Dense::full(shape, v != 0.0)),
        }
    }

    /// Toggle the transposed view of the storage. No data moves.
    pub fn transpose_in_place(&mut self) {
        match self {
            Tensor::F32(d) => d.transpose_in_place(),
            Tensor::F64(d) => d.transpose_in_place(),
            Tensor::Bool(d) => d.transpose_in_place(),
        }
    }

    /// Same elements under a new shape of identical element count.
    pub fn reshape(self, shape: Shape) -> Result<Tensor> {
        Ok(match self {
            Tensor::F32(d) => Tensor::F32(d.reshape(shape)?),
            Tensor::F64(d) => Tensor::F64(d.reshape(shape)?),
            Tensor::Bool(d) => Tensor::Bool(d.reshape(shape)?),
        })
    }

    /// Copy `src` into this buffer. Element counts must match; the shape is kept.
    pub fn assign(&mut self, src: &Tensor) -> Result<()> {
        match (self, src) {
            (Tensor::F32(d), Tensor::F32(s)) => kernels::assign(d, s),
            (Tensor::F64(d), Tensor::F64(s)) => kernels::assign(d, s),
            (Tensor::Bool(d), Tensor::Bool(s)) => kernels::assign(d, s),
            (d, s) => Err(TensorError::DtypeMismatch {
                lhs: d.dtype(),
                rhs: s.dtype(),
            }),
        }
    }

    /// Add `src` into this buffer. Element counts must match; the shape is kept.
    pub fn accumulate(&mut self, src: &Tensor) -> Result<()> {
        match (self, src) {
            (Tensor::F32(d), Tensor::F32(s)) => kernels::add_assign(d, s),
            (Tensor::F64(d), Tensor::F64(s)) => kernels::add_assign(d, s),
            (Tensor::Bool(_), Tensor::Bool(_)) => Err(TensorError::Unsupported {
                op: "accumulate",
                dtype: Dtype::Bool,
            }),
            (d, s) => Err(TensorError::DtypeMismatch {
                lhs: d.dtype(),
                rhs: s.dtype(),
            }),
        }
    }

    /// Row-major elements widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Tensor::F32(d) => d.materialize().iter().map(|&v| v as f64).collect(),
            Tensor::F64(d) => d.materialize().into_owned(),
            Tensor::Bool(d) => d
                .materialize()
                .iter()
                .map(|&v| if v { 1.0 } else { 0.0 })
                .collect(),
        }
    }
}

/// Either a bare scalar or a tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Tensor(Tensor),
}

impl Value {
    /// Build a tensor value from row-major data.
    pub fn tensor<T: Element>(data: Vec<T>, dims: Vec<usize>) -> Result<Value> {
        Ok(Value::Tensor(T::wrap_dense(Dense::new(data, Shape::new(dims))?)))
    }

    /// A value with the same kind, dtype and shape as `self`, filled with `v`.
    pub fn full_like(&self, v: f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(Scalar::from_f64(s.dtype(), v)),
            Value::Tensor(t) => Value::Tensor(Tensor::full(t.dtype(), t.shape().clone(), v)),
        }
    }

    pub fn zeros_like(&self) -> Value {
        self.full_like(0.0)
    }

    pub fn ones_like(&self) -> Value {
        self.full_like(1.0)
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Value::Scalar(s) => s.dtype(),
            Value::Tensor(t) => t.dtype(),
        }
    }

    /// Shape of the value; bare scalars have the empty shape.
    pub fn shape(&self) -> Shape {
        match self {
            Value::Scalar(_) => Shape::scalar(),
            Value::Tensor(t) => t.shape().clone(),
        }
    }

    /// Whether this is a bare scalar (a 0-d tensor is still a tensor).
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Value::Tensor(_))
    }

    pub fn numel(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Tensor(t) => t.numel(),
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(t) => Some(t),
            Value::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Tensor(_) => None,
        }
    }

    /// The single element of a scalar or one-element tensor, widened to f64.
    pub fn item(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(s.to_f64()),
            Value::Tensor(t) if t.numel() == 1 => t.to_f64_vec().first().copied(),
            Value::Tensor(_) => None,
        }
    }

    /// Row-major elements widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(s) => vec![s.to_f64()],
            Value::Tensor(t) => t.to_f64_vec(),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Scalar(Scalar::F32(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(Scalar::F64(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Scalar(Scalar::Bool(v))
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Value::Tensor(t)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Tensor(t) => write!(f, "{}{}{:?}", t.dtype(), t.shape(), t.to_f64_vec()),
        }
    }
}
