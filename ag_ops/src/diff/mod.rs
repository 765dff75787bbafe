//! Differentiation rules.
//!
//! Each submodule holds, per operation family, a symbolic rule that builds
//! gradient nodes and a numeric rule that pushes an output's bound derivative
//! into its inputs' bound derivatives. The helpers here are shared by the
//! numeric rules: they read one node's state at a time and never hold two node
//! locks at once, so an input may appear twice (`x ⊙ x`).

pub mod binary;
pub mod linalg;
pub mod unary;

use ag_tensor::{Scalar, Value};

use crate::binary::BinaryOperation;
use crate::catalog::{BinaryOpKind, UnaryOpKind};
use crate::error::Result;
use crate::node::Node;
use crate::op::{Accumulation, Op};
use crate::reduction;
use crate::scalar_op::ScalarOperator;
use crate::tensor_op::TensorOperator;
use crate::unary::UnaryOperation;

/// Replace `node`'s derivative, best effort.
///
/// A rejected store is traced and dropped.
pub fn store_gradient(node: &Node, value: Value) {
    if let Err(err) = node.set_derivative(value) {
        tracing::trace!(node = %node, %err, "derivative store rejected");
    }
}

/// `node.d += op(inputs)`, in place when the derivative is a tensor.
///
/// A scalar node takes the total of a tensor-shaped contribution.
pub(crate) fn incr_with(node: &Node, op: &dyn Op, inputs: &[Value]) -> Result<()> {
    if node.is_scalar() {
        return update_derivative(node, BinaryOpKind::Add, op.forward(inputs)?);
    }
    let outcome = node.with_dual(|dual| op.accumulating_forward(dual.derivative_mut(), inputs))??;
    if let Accumulation::Rerouted(v) = outcome {
        store_gradient(node, v);
    }
    Ok(())
}

/// `node.d += a <kind> b`.
pub(crate) fn incr_into(node: &Node, kind: BinaryOpKind, a: &Value, b: &Value) -> Result<()> {
    let op = BinaryOperation::for_values(kind, a, b)?;
    incr_with(node, &op, &[a.clone(), b.clone()])
}

/// `node.d = node.d <kind> delta`, for the additive kinds.
///
/// A tensor `delta` with the right element count but a different shape is
/// reshaped to the derivative's shape first. A scalar derivative takes the
/// total of a tensor `delta`.
pub(crate) fn update_derivative(node: &Node, kind: BinaryOpKind, delta: Value) -> Result<()> {
    let current = node.derivative()?;
    let delta = match (delta, &current) {
        (Value::Tensor(t), Value::Tensor(c)) if t.shape() != c.shape() && t.numel() == c.numel() => {
            Value::Tensor(t.reshape(c.shape().clone())?)
        }
        (d @ Value::Tensor(_), Value::Scalar(_)) => reduction::sum_to_scalar(&d)?,
        (d, _) => d,
    };

    let updated = match current {
        Value::Scalar(_) => ScalarOperator::new(current.dtype()).evaluate(kind, false, &current, &delta)?,
        Value::Tensor(_) => TensorOperator::new(true).unsafe_forward(kind, false, current, delta)?,
    };
    store_gradient(node, updated);
    Ok(())
}

/// A scalar node whose derivative came out tensor-shaped gets the total instead.
pub(crate) fn collapse_scalar_derivative(node: &Node) -> Result<()> {
    if !node.is_scalar() {
        return Ok(());
    }
    let d = node.derivative()?;
    if d.is_tensor() {
        store_gradient(node, reduction::sum_to_scalar(&d)?);
    }
    Ok(())
}

// === Value arithmetic ===

pub(crate) fn binary_value(kind: BinaryOpKind, a: &Value, b: &Value) -> Result<Value> {
    BinaryOperation::for_values(kind, a, b)?.forward(&[a.clone(), b.clone()])
}

pub(crate) fn unary_value(kind: UnaryOpKind, x: &Value) -> Result<Value> {
    UnaryOperation::for_value(kind, x).forward(std::slice::from_ref(x))
}

/// A bare scalar of `like`'s dtype.
pub(crate) fn scalar_like(like: &Value, v: f64) -> Value {
    Value::Scalar(Scalar::from_f64(like.dtype(), v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_derivative_scalar_and_tensor() {
        let s = Node::var("s", Value::from(1.0));
        update_derivative(&s, BinaryOpKind::Add, Value::from(2.0)).unwrap();
        update_derivative(&s, BinaryOpKind::Sub, Value::from(0.5)).unwrap();
        assert_eq!(s.derivative().unwrap(), Value::from(1.5));

        let t = Node::var("t", Value::tensor(vec![0.0, 0.0], vec![2]).unwrap());
        update_derivative(&t, BinaryOpKind::Add, Value::tensor(vec![1.0, 2.0], vec![2, 1]).unwrap()).unwrap();
        update_derivative(&t, BinaryOpKind::Add, Value::from(1.0)).unwrap();
        assert_eq!(t.derivative().unwrap(), Value::tensor(vec![2.0, 3.0], vec![2]).unwrap());
    }

    #[test]
    fn test_scalar_node_collapses_tensor_derivative() {
        let s = Node::var("s", Value::from(0.0));
        store_gradient(&s, Value::tensor(vec![1.0, 2.0, 3.0], vec![3]).unwrap());
        assert!(s.derivative().unwrap().is_tensor());
        collapse_scalar_derivative(&s).unwrap();
        assert_eq!(s.derivative().unwrap(), Value::from(6.0));
    }

    #[test]
    fn test_scalar_derivative_sums_each_tensor_contribution() {
        let s = Node::var("s", Value::from(0.0));
        let delta = Value::tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        update_derivative(&s, BinaryOpKind::Add, delta.clone()).unwrap();
        assert_eq!(s.derivative().unwrap(), Value::from(10.0));

        // an existing total is counted once, not once per element
        update_derivative(&s, BinaryOpKind::Add, delta.clone()).unwrap();
        assert_eq!(s.derivative().unwrap(), Value::from(20.0));
        update_derivative(&s, BinaryOpKind::Sub, delta).unwrap();
        assert_eq!(s.derivative().unwrap(), Value::from(10.0));
    }

    #[test]
    fn test_incr_into_scalar_node_twice() {
        let s = Node::var("s", Value::from(0.5));
        let x = Value::tensor(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let g = x.ones_like();
        incr_into(&s, BinaryOpKind::Mul, &x, &g).unwrap();
        incr_into(&s, BinaryOpKind::Mul, &x, &g).unwrap();
        assert_eq!(s.derivative().unwrap(), Value::from(20.0));
    }

    #[test]
    fn test_incr_into_same_node_twice() {
        let x = Node::var("x", Value::tensor(vec![1.0, 2.0], vec![2]).unwrap());
        let g = Value::tensor(vec![1.0, 1.0], vec![2]).unwrap();
        let xv = x.primal().unwrap();
        incr_into(&x, BinaryOpKind::Mul, &xv, &g).unwrap();
        incr_into(&x, BinaryOpKind::Mul, &xv, &g).unwrap();
        assert_eq!(x.derivative().unwrap(), Value::tensor(vec![2.0, 4.0], vec![2]).unwrap());
    }

    #[test]
    fn test_store_gradient_swallows_errors() {
        let x = Node::var("x", Value::from(1.0));
        store_gradient(&x, Value::from(1.0f32));
        assert_eq!(x.derivative().unwrap(), Value::from(0.0));
    }
}
