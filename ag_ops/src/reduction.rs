//! Axis reductions and the shape operations their gradients are built from.
//!
//! Reduced axes are dropped from the result, so summing a `(2, 3)` tensor
//! along axis 1 gives a `(2,)` tensor and summing along every axis gives a
//! bare scalar. [`RepeatOperation`] is the inverse expansion used to route a
//! reduced gradient back to the input extents.

use std::fmt;

use ag_tensor::{kernels, Dense, Dtype, Element, Shape, Tensor, Value};

use crate::catalog::{BinaryOpKind, ReductionKind};
use crate::diff;
use crate::error::{Error, Result};
use crate::expr;
use crate::node::{Group, Node};
use crate::op::{hash32, Op};
use crate::types::{Type, TypeClass};

fn single<'a, T>(op: &dyn fmt::Display, inputs: &'a [T]) -> Result<&'a T> {
    match inputs {
        [x] => Ok(x),
        _ => Err(Error::ArityMismatch {
            op: op.to_string(),
            expected: 1,
            got: inputs.len(),
        }),
    }
}

/// `a → ret`, where both sides are tensors (or scalars) over one element type.
fn shaped_fn_type(input_rank: usize, output_rank: usize) -> Type {
    let a = Type::var("a", Some(TypeClass::Arithable));
    let of_rank = |dims: usize| {
        if dims == 0 {
            a.clone()
        } else {
            Type::Tensor {
                dims,
                of: Box::new(a.clone()),
            }
        }
    };
    Type::Function(vec![of_rank(input_rank), of_rank(output_rank)])
}

// === Value helpers ===

fn sum_typed<T: Element>(t: &Tensor, along: &[usize]) -> Result<Value> {
    let d = T::dense(t).ok_or_else(|| Error::type_mismatch(T::DTYPE, t.dtype()))?;
    let out = kernels::sum_along(&d.view(), along)?;
    match out.scalar_value() {
        Some(v) if out.shape().is_scalar() => Ok(Value::Scalar(T::wrap_scalar(v))),
        _ => Ok(Value::Tensor(T::wrap_dense(out))),
    }
}

/// Sum `v` along `along` (empty sums everything). A bare scalar is returned as is.
pub(crate) fn sum_value(v: &Value, along: &[usize]) -> Result<Value> {
    match v {
        Value::Scalar(_) => Ok(v.clone()),
        Value::Tensor(t) => match t.dtype() {
            Dtype::Float32 => sum_typed::<f32>(t, along),
            Dtype::Float64 => sum_typed::<f64>(t, along),
            Dtype::Bool => Err(Error::not_implemented("Sum", Dtype::Bool)),
        },
    }
}

/// Total of every element as a bare scalar.
pub(crate) fn sum_to_scalar(v: &Value) -> Result<Value> {
    sum_value(v, &[])
}

fn repeat_typed<T: Element>(v: &Value, keep: Shape, along: &[usize], target: &Shape) -> Result<Value> {
    let mismatch = || Error::type_mismatch(T::DTYPE, v.dtype());
    let dense = match v {
        Value::Scalar(s) => Dense::scalar(T::scalar(s).ok_or_else(mismatch)?),
        Value::Tensor(t) => T::dense(t).ok_or_else(mismatch)?.clone(),
    };
    let mut dense = dense.reshape(keep)?;
    for &axis in along {
        let n = target.dim(axis);
        // size-1 axes are already the right extent
        if n != 1 {
            dense = kernels::repeat(&dense, axis, n)?;
        }
    }
    Ok(Value::Tensor(T::wrap_dense(dense)))
}

/// Expand `v` to `target` by re-inserting the `along` axes and repeating
/// along them. Empty `along` means every axis of `target`.
pub(crate) fn repeat_value(v: &Value, along: &[usize], target: &Shape) -> Result<Value> {
    if v.shape() == *target {
        return Ok(v.clone());
    }
    if target.is_scalar() {
        return sum_to_scalar(v);
    }

    let along: Vec<usize> = if along.is_empty() {
        (0..target.ndim()).collect()
    } else {
        along.to_vec()
    };
    if along.iter().any(|&axis| axis >= target.ndim()) {
        return Err(Error::AxisOutOfRange {
            along,
            shape: target.clone(),
        });
    }
    let mut keep = target.dims().to_vec();
    for &axis in &along {
        keep[axis] = 1;
    }
    let keep = Shape::new(keep);
    if keep.numel() != v.numel() {
        return Err(Error::ShapeMismatch {
            lhs: v.shape(),
            rhs: target.clone(),
        });
    }

    match v.dtype() {
        Dtype::Float32 => repeat_typed::<f32>(v, keep, &along, target),
        Dtype::Float64 => repeat_typed::<f64>(v, keep, &along, target),
        Dtype::Bool => Err(Error::not_implemented("Repeat", Dtype::Bool)),
    }
}

/// The same elements under `to`; element counts must agree.
pub(crate) fn reshape_value(v: &Value, to: &Shape) -> Result<Value> {
    if v.numel() != to.numel() {
        return Err(Error::ShapeMismatch {
            lhs: v.shape(),
            rhs: to.clone(),
        });
    }
    match v {
        _ if to.is_scalar() => sum_to_scalar(v),
        Value::Tensor(t) => Ok(Value::Tensor(t.clone().reshape(to.clone())?)),
        Value::Scalar(s) => Ok(Value::Tensor(Tensor::full(s.dtype(), to.clone(), s.to_f64()))),
    }
}

// === Reductions ===

/// Sum or max of a tensor along some of its axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReductionOperation {
    kind: ReductionKind,
    along: Vec<usize>,
    input_rank: usize,
    input_shape: Shape,
}

impl ReductionOperation {
    /// Reduce an input of `input_shape` along `along`.
    ///
    /// `along` must be strictly increasing and inside the input's rank; empty
    /// means every axis.
    pub fn new(kind: ReductionKind, along: &[usize], input_shape: &Shape) -> Result<Self> {
        let input_rank = input_shape.ndim();
        let increasing = along.windows(2).all(|w| w[0] < w[1]);
        if !increasing || along.iter().any(|&a| a >= input_rank) {
            return Err(Error::AxisOutOfRange {
                along: along.to_vec(),
                shape: input_shape.clone(),
            });
        }
        let along = if along.is_empty() {
            (0..input_rank).collect()
        } else {
            along.to_vec()
        };
        Ok(ReductionOperation {
            kind,
            along,
            input_rank,
            input_shape: input_shape.clone(),
        })
    }

    pub fn kind(&self) -> ReductionKind {
        self.kind
    }

    /// Shape of the reduced result.
    pub fn result_shape(&self) -> Shape {
        self.input_shape.without_axes(&self.along)
    }
}

impl fmt::Display for ReductionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.kind, self.along)
    }
}

impl Op for ReductionOperation {
    fn arity(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        shaped_fn_type(self.input_rank, self.result_shape().ndim())
    }

    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape> {
        let s = single(self, inputs)?;
        if s.ndim() != self.input_rank {
            return Err(Error::ShapeMismatch {
                lhs: self.input_shape.clone(),
                rhs: (*s).clone(),
            });
        }
        Ok(s.without_axes(&self.along))
    }

    fn differentiable_inputs(&self, n: usize) -> Vec<bool> {
        assert_eq!(n, 1, "{} takes exactly one input", self);
        vec![true]
    }

    fn symbolic_differentiate(&self, inputs: &[Node], output: &Node, grad: &Node) -> Result<Vec<Node>> {
        let x = single(self, inputs)?;
        let _span = tracing::trace_span!("symbolic_diff", op = %self).entered();
        let gx = match self.kind {
            ReductionKind::Sum => expr::repeat(grad, &self.along, x.shape())?,
            ReductionKind::Max => {
                // gradient flows to the positions that hold the maximum
                let spread = expr::repeat(output, &self.along, x.shape())?;
                let mask = expr::eq_same(&spread, x)?;
                let g = expr::repeat(grad, &self.along, x.shape())?;
                expr::hadamard_prod(&mask, &g)?
            }
        };
        gx.set_group(Group::Gradient);
        Ok(vec![gx])
    }

    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()> {
        let x = single(self, inputs)?;
        let _span = tracing::trace_span!("numeric_diff", op = %self).entered();
        match self.kind {
            ReductionKind::Sum => {
                let gz = output.derivative()?;
                let gx = repeat_value(&gz, &self.along, x.shape())?;
                diff::update_derivative(x, BinaryOpKind::Add, gx)?;
                diff::collapse_scalar_derivative(x)
            }
            ReductionKind::Max => Err(Error::not_implemented("Max", "numeric differentiation")),
        }
    }

    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single(self, inputs)?;
        let _span = tracing::trace_span!("reduction", op = %self).entered();
        match self.kind {
            ReductionKind::Sum => sum_value(x, &self.along),
            ReductionKind::Max => Err(Error::not_implemented("Max", x.dtype())),
        }
    }

    fn returns_owned_buffer(&self) -> bool {
        !self.result_shape().is_scalar()
    }

    fn overwrite_candidate(&self) -> Option<usize> {
        None
    }

    fn calls_external_compute(&self) -> bool {
        false
    }

    fn structural_hash(&self) -> u32 {
        hash32(&("reduction", self.kind, &self.along, &self.input_shape))
    }
}

// === Gradient helpers ===

/// Expands its input to `target` by repeating along the `along` axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepeatOperation {
    along: Vec<usize>,
    target: Shape,
}

impl RepeatOperation {
    /// Empty `along` means every axis of `target`.
    pub fn new(along: &[usize], target: &Shape) -> Self {
        let along = if along.is_empty() {
            (0..target.ndim()).collect()
        } else {
            along.to_vec()
        };
        RepeatOperation {
            along,
            target: target.clone(),
        }
    }
}

impl fmt::Display for RepeatOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repeat{:?}→{}", self.along, self.target)
    }
}

impl Op for RepeatOperation {
    fn arity(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        let reduced = self.target.without_axes(&self.along);
        shaped_fn_type(reduced.ndim(), self.target.ndim())
    }

    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape> {
        let s = single(self, inputs)?;
        let kept: usize = self
            .target
            .dims()
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.along.contains(i))
            .map(|(_, &d)| d)
            .product();
        if s.numel() != kept {
            return Err(Error::ShapeMismatch {
                lhs: (*s).clone(),
                rhs: self.target.clone(),
            });
        }
        Ok(self.target.clone())
    }

    fn differentiable_inputs(&self, n: usize) -> Vec<bool> {
        assert_eq!(n, 1, "{} takes exactly one input", self);
        vec![true]
    }

    fn symbolic_differentiate(&self, inputs: &[Node], _output: &Node, grad: &Node) -> Result<Vec<Node>> {
        let x = single(self, inputs)?;
        let _span = tracing::trace_span!("symbolic_diff", op = %self).entered();
        let mut gx = expr::sum(grad, &self.along)?;
        if gx.shape() != x.shape() {
            gx = expr::reshape(&gx, x.shape())?;
        }
        gx.set_group(Group::Gradient);
        Ok(vec![gx])
    }

    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()> {
        let x = single(self, inputs)?;
        let _span = tracing::trace_span!("numeric_diff", op = %self).entered();
        let gx = sum_value(&output.derivative()?, &self.along)?;
        diff::update_derivative(x, BinaryOpKind::Add, gx)?;
        diff::collapse_scalar_derivative(x)
    }

    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let x = single(self, inputs)?;
        repeat_value(x, &self.along, &self.target)
    }

    fn returns_owned_buffer(&self) -> bool {
        true
    }

    fn overwrite_candidate(&self) -> Option<usize> {
        None
    }

    fn calls_external_compute(&self) -> bool {
        false
    }

    fn structural_hash(&self) -> u32 {
        hash32(&("repeat", &self.along, &self.target))
    }
}

/// The same elements under a new shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReshapeOperation {
    to: Shape,
}

impl ReshapeOperation {
    pub fn new(to: &Shape) -> Self {
        ReshapeOperation { to: to.clone() }
    }
}

impl fmt::Display for ReshapeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reshape→{}", self.to)
    }
}

impl Op for ReshapeOperation {
    fn arity(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        let of = Type::var("a", Some(TypeClass::Arithable));
        let ret = if self.to.is_scalar() {
            of
        } else {
            Type::Tensor {
                dims: self.to.ndim(),
                of: Box::new(of),
            }
        };
        Type::Function(vec![Type::var("b", Some(TypeClass::Arithable)), ret])
    }

    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape> {
        let s = single(self, inputs)?;
        if s.numel() != self.to.numel() {
            return Err(Error::ShapeMismatch {
                lhs: (*s).clone(),
                rhs: self.to.clone(),
            });
        }
        Ok(self.to.clone())
    }

    fn differentiable_inputs(&self, n: usize) -> Vec<bool> {
        assert_eq!(n, 1, "{} takes exactly one input", self);
        vec![true]
    }

    fn symbolic_differentiate(&self, inputs: &[Node], _output: &Node, grad: &Node) -> Result<Vec<Node>> {
        let x = single(self, inputs)?;
        let gx = expr::reshape(grad, x.shape())?;
        gx.set_group(Group::Gradient);
        Ok(vec![gx])
    }

    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()> {
        let x = single(self, inputs)?;
        let gx = reshape_value(&output.derivative()?, x.shape())?;
        diff::update_derivative(x, BinaryOpKind::Add, gx)
    }

    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        reshape_value(single(self, inputs)?, &self.to)
    }

    fn returns_owned_buffer(&self) -> bool {
        !self.to.is_scalar()
    }

    fn overwrite_candidate(&self) -> Option<usize> {
        None
    }

    fn calls_external_compute(&self) -> bool {
        false
    }

    fn structural_hash(&self) -> u32 {
        hash32(&("reshape", &self.to))
    }
}
