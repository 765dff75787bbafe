//! Elementwise binary operation: arithmetic and comparisons over scalars and tensors.

use std::fmt;

use ag_tensor::{Dtype, Shape, Value};

use crate::catalog::BinaryOpKind;
use crate::diff;
use crate::error::{Error, Result};
use crate::expr;
use crate::node::{Group, Node};
use crate::op::{hash32, reroute_sum, Accumulation, Op};
use crate::registry;
use crate::scalar_op::ScalarOperator;
use crate::tensor_op::TensorOperator;
use crate::types::Type;

/// The evaluator picked at construction from the operand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Both operands are bare scalars.
    Scalar(ScalarOperator),
    /// At least one operand is a tensor.
    Tensor(TensorOperator),
}

/// `arg0 <kind> arg1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryOperation {
    kind: BinaryOpKind,
    operator: Operator,
    arg0: Type,
    arg1: Type,
    ret_same: bool,
}

impl BinaryOperation {
    /// Build the operation for operands of the given types.
    ///
    /// Both types must resolve to the same dtype, and a kernel for
    /// `(dtype, kind)` must exist.
    pub fn new(kind: BinaryOpKind, arg0: &Type, arg1: &Type) -> Result<Self> {
        let (arg0, arg1) = (arg0.prune().clone(), arg1.prune().clone());
        let dtype = match (arg0.dtype(), arg1.dtype()) {
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => return Err(Error::type_mismatch(a, b)),
            (None, _) => return Err(Error::type_mismatch("concrete type", &arg0)),
            (_, None) => return Err(Error::type_mismatch("concrete type", &arg1)),
        };
        if !registry::has_binary(dtype, kind) {
            return Err(Error::not_implemented(format!("{:?}", kind), dtype));
        }

        let operator = if arg0.is_tensor() || arg1.is_tensor() {
            Operator::Tensor(TensorOperator::new(arg0.is_tensor()))
        } else {
            Operator::Scalar(ScalarOperator::new(dtype))
        };
        Ok(BinaryOperation {
            kind,
            operator,
            arg0,
            arg1,
            ret_same: false,
        })
    }

    /// Build the operation for two runtime values.
    pub fn for_values(kind: BinaryOpKind, a: &Value, b: &Value) -> Result<Self> {
        Self::new(kind, &Type::of_value(a), &Type::of_value(b))
    }

    /// Make a comparison return 1/0 in the operand dtype instead of `Bool`.
    /// Arithmetic kinds ignore the flag.
    pub fn with_ret_same(mut self, ret_same: bool) -> Self {
        self.ret_same = ret_same && !self.kind.is_arith();
        self
    }

    pub fn kind(&self) -> BinaryOpKind {
        self.kind
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn ret_same(&self) -> bool {
        self.ret_same
    }

    fn pair<'a>(&self, inputs: &'a [Value]) -> Result<(&'a Value, &'a Value)> {
        match inputs {
            [a, b] => Ok((a, b)),
            _ => Err(self.arity_error(inputs.len())),
        }
    }

    fn arity_error(&self, got: usize) -> Error {
        Error::ArityMismatch {
            op: self.to_string(),
            expected: 2,
            got,
        }
    }

    fn tensor_arg(&self) -> Option<&Type> {
        [&self.arg0, &self.arg1].into_iter().find(|t| t.is_tensor())
    }
}

impl fmt::Display for BinaryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ret_same {
            write!(f, "{}·same", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl Op for BinaryOperation {
    fn arity(&self) -> usize {
        2
    }

    fn result_type(&self) -> Type {
        let ret = if self.kind.is_arith() || self.ret_same {
            self.tensor_arg().unwrap_or(&self.arg0).clone()
        } else {
            match self.tensor_arg() {
                Some(Type::Tensor { dims, .. }) => Type::tensor(*dims, Dtype::Bool),
                _ => Type::Dtype(Dtype::Bool),
            }
        };
        Type::Function(vec![self.arg0.clone(), self.arg1.clone(), ret])
    }

    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape> {
        let [a, b] = inputs else {
            return Err(self.arity_error(inputs.len()));
        };
        match (a.is_scalar(), b.is_scalar()) {
            (true, true) => Ok(Shape::scalar()),
            (true, false) => Ok((*b).clone()),
            (false, true) => Ok((*a).clone()),
            (false, false) if a == b => Ok((*a).clone()),
            (false, false) => Err(Error::ShapeMismatch {
                lhs: (*a).clone(),
                rhs: (*b).clone(),
            }),
        }
    }

    fn differentiable_inputs(&self, n: usize) -> Vec<bool> {
        assert_eq!(n, 2, "{} takes exactly two inputs", self);
        let d = self.kind.is_differentiable();
        vec![d, d]
    }

    fn symbolic_differentiate(&self, inputs: &[Node], output: &Node, grad: &Node) -> Result<Vec<Node>> {
        let [x, y] = inputs else {
            return Err(self.arity_error(inputs.len()));
        };
        let _span = tracing::trace_span!("symbolic_diff", op = %self).entered();
        let grads = diff::binary::symbolic(self.kind, x, y, output, grad)?;

        let mut out = Vec::with_capacity(2);
        for (input, g) in [x, y].into_iter().zip(grads) {
            // a scalar input receives the total of a tensor-shaped gradient
            let g = if input.is_scalar() && !g.is_scalar() {
                expr::sum(&g, &[])?
            } else {
                g
            };
            g.set_group(Group::Gradient);
            out.push(g);
        }
        Ok(out)
    }

    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()> {
        let [x, y] = inputs else {
            return Err(self.arity_error(inputs.len()));
        };
        let _span = tracing::trace_span!("numeric_diff", op = %self).entered();
        diff::binary::numeric(self.kind, x, y, output)?;
        diff::collapse_scalar_derivative(x)?;
        diff::collapse_scalar_derivative(y)
    }

    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let (a, b) = self.pair(inputs)?;
        match self.operator {
            Operator::Scalar(op) => op.evaluate(self.kind, self.ret_same, a, b),
            Operator::Tensor(op) => op.forward(self.kind, self.ret_same, a, b),
        }
    }

    fn unsafe_forward(&self, inputs: Vec<Value>) -> Result<Value> {
        let got = inputs.len();
        let Ok([a, b]) = <[Value; 2]>::try_from(inputs) else {
            return Err(self.arity_error(got));
        };
        match self.operator {
            Operator::Scalar(op) => op.evaluate(self.kind, self.ret_same, &a, &b),
            Operator::Tensor(op) => op.unsafe_forward(self.kind, self.ret_same, a, b),
        }
    }

    fn preallocated_forward(&self, dest: Value, inputs: &[Value]) -> Result<Value> {
        let (a, b) = self.pair(inputs)?;
        match self.operator {
            // no buffer to write into
            Operator::Scalar(op) => op.evaluate(self.kind, self.ret_same, a, b),
            Operator::Tensor(op) => op.preallocated_forward(self.kind, self.ret_same, dest, a, b),
        }
    }

    fn accumulating_forward(&self, acc: &mut Value, inputs: &[Value]) -> Result<Accumulation> {
        let (a, b) = self.pair(inputs)?;
        match self.operator {
            Operator::Scalar(op) => {
                let result = op.evaluate(self.kind, self.ret_same, a, b)?;
                reroute_sum(acc, result)
            }
            Operator::Tensor(op) => op.accumulating_forward(self.kind, self.ret_same, acc, a, b),
        }
    }

    fn returns_owned_buffer(&self) -> bool {
        self.arg0.is_tensor() || self.arg1.is_tensor()
    }

    fn overwrite_candidate(&self) -> Option<usize> {
        if self.arg0.is_tensor() {
            Some(0)
        } else if self.arg1.is_tensor() {
            Some(1)
        } else {
            None
        }
    }

    fn calls_external_compute(&self) -> bool {
        false
    }

    fn structural_hash(&self) -> u32 {
        hash32(&("binary", self.kind, &self.arg0, &self.arg1, self.ret_same))
    }
}
