//! Binary operator over two bare scalars.

use ag_tensor::{Dtype, Scalar, Value};

use crate::catalog::BinaryOpKind;
use crate::error::{Error, Result};
use crate::registry::{self, Numeric};

/// Evaluates a binary kind on two scalars of one dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarOperator {
    dtype: Dtype,
}

impl ScalarOperator {
    pub fn new(dtype: Dtype) -> Self {
        ScalarOperator { dtype }
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// `a <kind> b`. Comparisons yield `Bool`, or 1/0 in the operand dtype when `ret_same`.
    pub fn evaluate(&self, kind: BinaryOpKind, ret_same: bool, a: &Value, b: &Value) -> Result<Value> {
        let (a, b) = (self.expect_scalar(a)?, self.expect_scalar(b)?);
        match self.dtype {
            Dtype::Float32 => eval_typed::<f32>(kind, ret_same, a, b),
            Dtype::Float64 => eval_typed::<f64>(kind, ret_same, a, b),
            Dtype::Bool => Err(Error::not_implemented(format!("{:?}", kind), Dtype::Bool)),
        }
    }

    fn expect_scalar(&self, v: &Value) -> Result<Scalar> {
        match v {
            Value::Scalar(s) if s.dtype() == self.dtype => Ok(*s),
            Value::Scalar(s) => Err(Error::type_mismatch(self.dtype, s.dtype())),
            Value::Tensor(t) => Err(Error::type_mismatch(
                self.dtype,
                format!("tensor of {}", t.dtype()),
            )),
        }
    }
}

fn eval_typed<T: Numeric>(kind: BinaryOpKind, ret_same: bool, a: Scalar, b: Scalar) -> Result<Value> {
    let (Some(x), Some(y)) = (T::scalar(&a), T::scalar(&b)) else {
        return Err(Error::type_mismatch(T::DTYPE, a.dtype()));
    };

    if kind.is_arith() {
        let f = registry::arith::<T>(kind)?;
        return Ok(Value::Scalar(T::wrap_scalar(f(x, y))));
    }

    let f = registry::cmp::<T>(kind)?;
    let holds = f(x, y);
    if ret_same {
        let v = if holds { T::one() } else { T::zero() };
        Ok(Value::Scalar(T::wrap_scalar(v)))
    } else {
        Ok(Value::Scalar(Scalar::Bool(holds)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_arith() {
        let op = ScalarOperator::new(Dtype::Float64);
        let v = op
            .evaluate(BinaryOpKind::Div, false, &Value::from(3.0), &Value::from(4.0))
            .unwrap();
        assert_eq!(v, Value::from(0.75));

        let op = ScalarOperator::new(Dtype::Float32);
        let v = op
            .evaluate(BinaryOpKind::Sub, false, &Value::from(1.5f32), &Value::from(4.0f32))
            .unwrap();
        assert_eq!(v, Value::from(-2.5f32));
    }

    #[test]
    fn test_scalar_comparison() {
        let op = ScalarOperator::new(Dtype::Float64);
        let (a, b) = (Value::from(2.0), Value::from(3.0));
        assert_eq!(op.evaluate(BinaryOpKind::Lt, false, &a, &b).unwrap(), Value::from(true));
        assert_eq!(op.evaluate(BinaryOpKind::Lt, true, &a, &b).unwrap(), Value::from(1.0));
        assert_eq!(op.evaluate(BinaryOpKind::Gte, true, &a, &b).unwrap(), Value::from(0.0));
    }

    #[test]
    fn test_scalar_dtype_mismatch() {
        let op = ScalarOperator::new(Dtype::Float64);
        let err = op
            .evaluate(BinaryOpKind::Add, false, &Value::from(1.0), &Value::from(1.0f32))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_scalar_rejects_tensor() {
        let op = ScalarOperator::new(Dtype::Float64);
        let t = Value::tensor(vec![1.0, 2.0], vec![2]).unwrap();
        assert!(matches!(
            op.evaluate(BinaryOpKind::Add, false, &t, &Value::from(1.0)),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
