//! Expression builders.
//!
//! Thin constructors that pick the right operation for their operands' types
//! and apply it with [`Node::apply`]. Operands that are already bound are
//! evaluated on the spot.

use std::sync::Arc;

use ag_tensor::{Dtype, Scalar, Shape, Value};

use crate::binary::BinaryOperation;
use crate::catalog::{BinaryOpKind, LinAlgKind, ReductionKind, UnaryOpKind};
use crate::error::Result;
use crate::linalg::LinAlgOperation;
use crate::node::Node;
use crate::reduction::{ReductionOperation, RepeatOperation, ReshapeOperation};
use crate::unary::UnaryOperation;

/// A scalar constant of `dtype`.
pub fn scalar(dtype: Dtype, v: f64) -> Node {
    Node::constant(Value::Scalar(Scalar::from_f64(dtype, v)))
}

// === Elementwise binary ===

/// `a <kind> b`.
pub fn binary(kind: BinaryOpKind, a: &Node, b: &Node) -> Result<Node> {
    let op = BinaryOperation::new(kind, a.ty(), b.ty())?;
    Node::apply(Arc::new(op), vec![a.clone(), b.clone()])
}

/// `a <kind> b` for a comparison; with `ret_same` the result is 1/0 in the
/// operands' dtype rather than `Bool`.
pub fn compare(kind: BinaryOpKind, a: &Node, b: &Node, ret_same: bool) -> Result<Node> {
    let op = BinaryOperation::new(kind, a.ty(), b.ty())?.with_ret_same(ret_same);
    Node::apply(Arc::new(op), vec![a.clone(), b.clone()])
}

pub fn add(a: &Node, b: &Node) -> Result<Node> {
    binary(BinaryOpKind::Add, a, b)
}

pub fn sub(a: &Node, b: &Node) -> Result<Node> {
    binary(BinaryOpKind::Sub, a, b)
}

/// Elementwise product.
pub fn hadamard_prod(a: &Node, b: &Node) -> Result<Node> {
    binary(BinaryOpKind::Mul, a, b)
}

/// Elementwise quotient.
pub fn hadamard_div(a: &Node, b: &Node) -> Result<Node> {
    binary(BinaryOpKind::Div, a, b)
}

pub fn pow(a: &Node, b: &Node) -> Result<Node> {
    binary(BinaryOpKind::Pow, a, b)
}

pub fn lt(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Lt, a, b, false)
}

pub fn gt(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Gt, a, b, false)
}

pub fn lte(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Lte, a, b, false)
}

pub fn gte(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Gte, a, b, false)
}

pub fn eq(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Eq, a, b, false)
}

pub fn ne(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Ne, a, b, false)
}

/// Equality mask in the operands' dtype (1 where equal, 0 elsewhere).
pub fn eq_same(a: &Node, b: &Node) -> Result<Node> {
    compare(BinaryOpKind::Eq, a, b, true)
}

// === Elementwise unary ===

/// `kind(x)`.
pub fn unary(kind: UnaryOpKind, x: &Node) -> Result<Node> {
    Node::apply(Arc::new(UnaryOperation::new(kind, x.ty())), vec![x.clone()])
}

macro_rules! unary_builders {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $name(x: &Node) -> Result<Node> {
                unary(UnaryOpKind::$kind, x)
            }
        )*
    };
}

unary_builders! {
    neg => Neg,
    abs => Abs,
    sign => Sign,
    ceil => Ceil,
    floor => Floor,
    sin => Sin,
    cos => Cos,
    exp => Exp,
    ln => Ln,
    log2 => Log2,
    sqrt => Sqrt,
    square => Square,
    cube => Cube,
    inverse => Inverse,
    tanh => Tanh,
    sigmoid => Sigmoid,
}

// === Reductions and shape ===

/// Sum along `along`; empty sums everything down to a scalar.
pub fn sum(x: &Node, along: &[usize]) -> Result<Node> {
    let op = ReductionOperation::new(ReductionKind::Sum, along, x.shape())?;
    Node::apply(Arc::new(op), vec![x.clone()])
}

/// Maximum along `along`. Shape inference and symbolic differentiation work;
/// evaluation is not implemented, so the node stays unbound.
pub fn max(x: &Node, along: &[usize]) -> Result<Node> {
    let op = ReductionOperation::new(ReductionKind::Max, along, x.shape())?;
    Node::apply(Arc::new(op), vec![x.clone()])
}

/// Expand `x` to `target`, repeating along the `along` axes.
pub fn repeat(x: &Node, along: &[usize], target: &Shape) -> Result<Node> {
    Node::apply(Arc::new(RepeatOperation::new(along, target)), vec![x.clone()])
}

pub fn reshape(x: &Node, to: &Shape) -> Result<Node> {
    Node::apply(Arc::new(ReshapeOperation::new(to)), vec![x.clone()])
}

// === Linear algebra ===

/// `op(a) <kind> op(b)` where `op` transposes when the flag is set.
pub fn linalg(kind: LinAlgKind, transpose_a: bool, transpose_b: bool, a: &Node, b: &Node) -> Result<Node> {
    let op = LinAlgOperation::new(kind).transposed(transpose_a, transpose_b);
    Node::apply(Arc::new(op), vec![a.clone(), b.clone()])
}

pub fn matmul(a: &Node, b: &Node) -> Result<Node> {
    linalg(LinAlgKind::MatMul, false, false, a, b)
}

/// Matrix-vector product as an `(m, 1)` column.
pub fn matvec(a: &Node, v: &Node) -> Result<Node> {
    linalg(LinAlgKind::MatVecMul, false, false, a, v)
}

/// Inner product as a scalar.
pub fn vecdot(a: &Node, b: &Node) -> Result<Node> {
    linalg(LinAlgKind::VecDot, false, false, a, b)
}

pub fn outer(a: &Node, b: &Node) -> Result<Node> {
    linalg(LinAlgKind::OuterProd, false, false, a, b)
}
