//! Binary operator where at least one operand is a tensor.
//!
//! The operand on the `tensor_left` side must be a tensor; the other may be a
//! tensor of the same shape or a bare scalar, which is broadcast. Kernels come
//! from the registries in [`crate::registry`].

use ag_tensor::kernels::{self, Operand};
use ag_tensor::{Dtype, Tensor, Value};

use crate::catalog::BinaryOpKind;
use crate::error::{Error, Result};
use crate::op::{reroute_sum, Accumulation, Strategy};
use crate::registry::{self, Numeric};

/// Evaluates a binary kind with a tensor on (at least) one known side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorOperator {
    tensor_left: bool,
}

/// Kernel resolved for one `(dtype, kind, ret_same)`.
enum Kernel<T> {
    /// Output has the operand dtype.
    Same(SameKernel<T>),
    /// Plain comparison, output is `Bool`.
    Bool(fn(T, T) -> bool),
}

/// Kernel whose output has the operand dtype.
enum SameKernel<T> {
    Arith(fn(T, T) -> T),
    /// Comparison reported as one or zero.
    Mask(fn(T, T) -> bool),
}

impl<T: Numeric> SameKernel<T> {
    fn call(&self, a: T, b: T) -> T {
        match self {
            SameKernel::Arith(f) => f(a, b),
            SameKernel::Mask(f) if f(a, b) => T::one(),
            SameKernel::Mask(_) => T::zero(),
        }
    }
}

fn kernel<T: Numeric>(kind: BinaryOpKind, ret_same: bool) -> Result<Kernel<T>> {
    if kind.is_arith() {
        return Ok(Kernel::Same(SameKernel::Arith(registry::arith::<T>(kind)?)));
    }
    let f = registry::cmp::<T>(kind)?;
    if ret_same {
        Ok(Kernel::Same(SameKernel::Mask(f)))
    } else {
        Ok(Kernel::Bool(f))
    }
}

fn operand<T: Numeric>(v: &Value) -> Result<Operand<'_, T>> {
    let op = match v {
        Value::Scalar(s) => T::scalar(s).map(Operand::Scalar),
        Value::Tensor(t) => T::dense(t).map(|d| Operand::Tensor(d.view())),
    };
    op.ok_or_else(|| Error::type_mismatch(T::DTYPE, v.dtype()))
}

fn unsupported(kind: BinaryOpKind, context: impl ToString) -> Error {
    Error::not_implemented(format!("{:?}", kind), context)
}

fn forward_typed<T: Numeric>(kind: BinaryOpKind, ret_same: bool, a: &Value, b: &Value) -> Result<Value> {
    let (x, y) = (operand::<T>(a)?, operand::<T>(b)?);
    Ok(match kernel::<T>(kind, ret_same)? {
        Kernel::Same(f) => Value::Tensor(T::wrap_dense(kernels::zip_map(&x, &y, |p, q| f.call(p, q))?)),
        Kernel::Bool(f) => Value::Tensor(Tensor::Bool(kernels::zip_map(&x, &y, f)?)),
    })
}

fn into_dense_dest<T: Numeric>(dest: Value) -> Result<ag_tensor::Dense<T>> {
    match dest {
        Value::Tensor(t) => T::into_dense(t).map_err(|t| Error::type_mismatch(T::DTYPE, t.dtype())),
        Value::Scalar(s) => Err(Error::type_mismatch("tensor", s.dtype())),
    }
}

impl TensorOperator {
    pub fn new(tensor_left: bool) -> Self {
        TensorOperator { tensor_left }
    }

    /// Validate operand kinds and dtypes, returning the shared dtype.
    fn check(&self, a: &Value, b: &Value) -> Result<Dtype> {
        let t = if self.tensor_left { a } else { b };
        if let Value::Scalar(s) = t {
            return Err(Error::type_mismatch("tensor", s.dtype()));
        }
        if a.dtype() != b.dtype() {
            return Err(Error::type_mismatch(a.dtype(), b.dtype()));
        }
        if let (Value::Tensor(x), Value::Tensor(y)) = (a, b) {
            if x.shape() != y.shape() {
                return Err(Error::ShapeMismatch {
                    lhs: x.shape().clone(),
                    rhs: y.shape().clone(),
                });
            }
        }
        Ok(a.dtype())
    }

    /// Fresh allocation.
    pub fn forward(&self, kind: BinaryOpKind, ret_same: bool, a: &Value, b: &Value) -> Result<Value> {
        let _span = tracing::trace_span!("tensor_op", ?kind, strategy = %Strategy::Do).entered();
        match self.check(a, b)? {
            Dtype::Float32 => forward_typed::<f32>(kind, ret_same, a, b),
            Dtype::Float64 => forward_typed::<f64>(kind, ret_same, a, b),
            Dtype::Bool => Err(unsupported(kind, Dtype::Bool)),
        }
    }

    /// Overwrite the tensor operand's buffer with the result.
    ///
    /// Plain comparisons produce `Bool` and cannot reuse a numeric buffer, so
    /// they allocate instead.
    pub fn unsafe_forward(&self, kind: BinaryOpKind, ret_same: bool, a: Value, b: Value) -> Result<Value> {
        let _span = tracing::trace_span!("tensor_op", ?kind, strategy = %Strategy::UnsafeDo).entered();
        match self.check(&a, &b)? {
            Dtype::Float32 => self.unsafe_typed::<f32>(kind, ret_same, a, b),
            Dtype::Float64 => self.unsafe_typed::<f64>(kind, ret_same, a, b),
            Dtype::Bool => Err(unsupported(kind, Dtype::Bool)),
        }
    }

    fn unsafe_typed<T: Numeric>(&self, kind: BinaryOpKind, ret_same: bool, a: Value, b: Value) -> Result<Value> {
        let f = match kernel::<T>(kind, ret_same)? {
            Kernel::Same(f) => f,
            Kernel::Bool(_) => return forward_typed::<T>(kind, ret_same, &a, &b),
        };
        let (dst, other) = if self.tensor_left { (a, b) } else { (b, a) };
        let mut dense = into_dense_dest::<T>(dst)?;
        kernels::zip_overwrite(&mut dense, self.tensor_left, &operand::<T>(&other)?, |p, q| f.call(p, q))?;
        Ok(Value::Tensor(T::wrap_dense(dense)))
    }

    /// Write the result into `dest` and hand it back.
    pub fn preallocated_forward(
        &self,
        kind: BinaryOpKind,
        ret_same: bool,
        dest: Value,
        a: &Value,
        b: &Value,
    ) -> Result<Value> {
        let _span = tracing::trace_span!("tensor_op", ?kind, strategy = %Strategy::UsePreallocDo).entered();
        match self.check(a, b)? {
            Dtype::Float32 => prealloc_typed::<f32>(kind, ret_same, dest, a, b),
            Dtype::Float64 => prealloc_typed::<f64>(kind, ret_same, dest, a, b),
            Dtype::Bool => Err(unsupported(kind, Dtype::Bool)),
        }
    }

    /// `acc += a <kind> b`.
    ///
    /// A tensor accumulator is updated in place. Anything else is left alone
    /// and the sum comes back as [`Accumulation::Rerouted`].
    pub fn accumulating_forward(
        &self,
        kind: BinaryOpKind,
        ret_same: bool,
        acc: &mut Value,
        a: &Value,
        b: &Value,
    ) -> Result<Accumulation> {
        let _span = tracing::trace_span!("tensor_op", ?kind, strategy = %Strategy::IncrDo).entered();
        match self.check(a, b)? {
            Dtype::Float32 => incr_typed::<f32>(kind, ret_same, acc, a, b),
            Dtype::Float64 => incr_typed::<f64>(kind, ret_same, acc, a, b),
            Dtype::Bool => Err(unsupported(kind, Dtype::Bool)),
        }
    }
}

fn prealloc_typed<T: Numeric>(kind: BinaryOpKind, ret_same: bool, dest: Value, a: &Value, b: &Value) -> Result<Value> {
    let mut dense = into_dense_dest::<T>(dest)?;
    let f = match kernel::<T>(kind, ret_same)? {
        Kernel::Same(f) => f,
        Kernel::Bool(_) => return Err(unsupported(kind, Strategy::UsePreallocDo)),
    };
    let (x, y) = (operand::<T>(a)?, operand::<T>(b)?);
    let shape = kernels::result_shape(&x, &y)?;
    if shape.numel() != dense.numel() {
        return Err(Error::ShapeMismatch {
            lhs: dense.shape().clone(),
            rhs: shape,
        });
    }
    kernels::zip_write(&mut dense, &x, &y, |p, q| f.call(p, q))?;
    Ok(Value::Tensor(T::wrap_dense(dense)))
}

fn incr_typed<T: Numeric>(
    kind: BinaryOpKind,
    ret_same: bool,
    acc: &mut Value,
    a: &Value,
    b: &Value,
) -> Result<Accumulation> {
    let f = match kernel::<T>(kind, ret_same)? {
        Kernel::Same(f) => f,
        Kernel::Bool(_) => return Err(unsupported(kind, Strategy::IncrDo)),
    };
    match acc {
        Value::Tensor(t) => {
            let got = t.dtype();
            let dense = T::dense_mut(t).ok_or_else(|| Error::type_mismatch(T::DTYPE, got))?;
            let (x, y) = (operand::<T>(a)?, operand::<T>(b)?);
            let shape = kernels::result_shape(&x, &y)?;
            if shape.numel() != dense.numel() {
                return Err(Error::ShapeMismatch {
                    lhs: dense.shape().clone(),
                    rhs: shape,
                });
            }
            kernels::zip_accumulate(dense, &x, &y, |p, q| f.call(p, q))?;
            Ok(Accumulation::Accumulated)
        }
        Value::Scalar(s) => {
            let current = Value::Scalar(*s);
            let result = forward_typed::<T>(kind, ret_same, a, b)?;
            reroute_sum(&current, result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec3(data: [f64; 3]) -> Value {
        Value::tensor(data.to_vec(), vec![3]).unwrap()
    }

    #[test]
    fn test_tensor_scalar_broadcast() {
        let left = TensorOperator::new(true);
        let out = left
            .forward(BinaryOpKind::Sub, false, &vec3([1.0, 2.0, 3.0]), &Value::from(1.0))
            .unwrap();
        assert_eq!(out, vec3([0.0, 1.0, 2.0]));

        let right = TensorOperator::new(false);
        let out = right
            .forward(BinaryOpKind::Sub, false, &Value::from(1.0), &vec3([1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(out, vec3([0.0, -1.0, -2.0]));
    }

    #[test]
    fn test_tensor_side_must_be_tensor() {
        let left = TensorOperator::new(true);
        let err = left
            .forward(BinaryOpKind::Add, false, &Value::from(1.0), &vec3([1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_comparisons() {
        let op = TensorOperator::new(true);
        let a = vec3([1.0, 2.0, 3.0]);
        let plain = op.forward(BinaryOpKind::Gt, false, &a, &Value::from(1.5)).unwrap();
        assert_eq!(plain.dtype(), Dtype::Bool);
        assert_eq!(plain.to_f64_vec(), vec![0.0, 1.0, 1.0]);

        let same = op.forward(BinaryOpKind::Gt, true, &a, &Value::from(1.5)).unwrap();
        assert_eq!(same, vec3([0.0, 1.0, 1.0]));
    }

    #[test]
    fn test_unsafe_overwrites_tensor_operand() {
        let op = TensorOperator::new(false);
        let out = op
            .unsafe_forward(BinaryOpKind::Div, false, Value::from(6.0), vec3([1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(out, vec3([6.0, 3.0, 2.0]));

        // plain comparison cannot reuse a float buffer
        let out = op
            .unsafe_forward(BinaryOpKind::Lt, false, Value::from(2.0), vec3([1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(out.to_f64_vec(), vec![0.0, 0.0, 1.0]);

        let out = op
            .unsafe_forward(BinaryOpKind::Lt, true, Value::from(2.0), vec3([1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(out, vec3([0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_prealloc() {
        let op = TensorOperator::new(true);
        let a = vec3([1.0, 2.0, 3.0]);
        let out = op
            .preallocated_forward(BinaryOpKind::Mul, false, vec3([0.0; 3]), &a, &a)
            .unwrap();
        assert_eq!(out, vec3([1.0, 4.0, 9.0]));

        let err = op
            .preallocated_forward(BinaryOpKind::Mul, false, Value::from(0.0), &a, &a)
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let small = Value::tensor(vec![0.0; 2], vec![2]).unwrap();
        let err = op
            .preallocated_forward(BinaryOpKind::Mul, false, small, &a, &a)
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let err = op
            .preallocated_forward(BinaryOpKind::Eq, false, vec3([0.0; 3]), &a, &a)
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotImplemented {
                what: "Eq".to_string(),
                context: "UsePreallocDo".to_string()
            }
        );
    }

    #[test]
    fn test_incr_into_tensor_accumulates() {
        let op = TensorOperator::new(true);
        let mut acc = vec3([1.0, 1.0, 1.0]);
        let out = op
            .accumulating_forward(BinaryOpKind::Mul, false, &mut acc, &vec3([1.0, 2.0, 3.0]), &Value::from(2.0))
            .unwrap();
        assert_eq!(out, Accumulation::Accumulated);
        assert_eq!(acc, vec3([3.0, 5.0, 7.0]));
    }

    #[test]
    fn test_incr_into_scalar_reroutes() {
        let op = TensorOperator::new(true);
        let mut acc = Value::from(10.0);
        let out = op
            .accumulating_forward(BinaryOpKind::Add, false, &mut acc, &vec3([1.0, 2.0, 3.0]), &Value::from(1.0))
            .unwrap();
        assert_eq!(out, Accumulation::Rerouted(vec3([12.0, 13.0, 14.0])));
        assert_eq!(acc, Value::from(10.0));
    }

    #[test]
    fn test_shape_and_dtype_checks() {
        let op = TensorOperator::new(true);
        let a = Value::tensor(vec![0.0; 12], vec![3, 4]).unwrap();
        let b = Value::tensor(vec![0.0; 4], vec![2, 2]).unwrap();
        assert!(matches!(
            op.forward(BinaryOpKind::Add, false, &a, &b),
            Err(Error::ShapeMismatch { .. })
        ));

        let c = Value::tensor(vec![0.0f32; 12], vec![3, 4]).unwrap();
        assert!(matches!(
            op.forward(BinaryOpKind::Add, false, &a, &c),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
