//! The operation trait and its evaluation outcomes.
//!
//! Every node in an expression graph that is not a leaf carries an [`Op`].
//! An op knows its signature, how to infer its output shape, how to evaluate
//! under each [`Strategy`], and how to differentiate itself both symbolically
//! (building gradient nodes) and numerically (writing into bound derivatives).

use std::fmt;
use std::hash::{Hash, Hasher};

use ag_tensor::{Shape, Value};
use rustc_hash::FxHasher;

use crate::catalog::BinaryOpKind;
use crate::error::Result;
use crate::node::Node;
use crate::scalar_op::ScalarOperator;
use crate::tensor_op::TensorOperator;
use crate::types::Type;

/// How an evaluation writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Allocate a fresh result.
    Do,
    /// Overwrite the buffer of an operand the caller gave up.
    UnsafeDo,
    /// Write into a caller-supplied destination.
    UsePreallocDo,
    /// Add the result into a caller-supplied accumulator.
    IncrDo,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of an accumulating evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulation {
    /// The accumulator was updated in place.
    Accumulated,
    /// The accumulator could not hold the result; this is `acc + result`,
    /// and the accumulator is untouched.
    Rerouted(Value),
}

/// An operation in an expression graph.
pub trait Op: fmt::Display + fmt::Debug + Send + Sync {
    /// Number of inputs.
    fn arity(&self) -> usize;

    /// Function type `arg0 → … → ret`.
    fn result_type(&self) -> Type;

    /// Output shape for the given input shapes.
    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape>;

    /// Which of `n` inputs receive a gradient.
    fn differentiable_inputs(&self, n: usize) -> Vec<bool>;

    /// Build gradient nodes for each input given the output node and its gradient.
    fn symbolic_differentiate(&self, inputs: &[Node], output: &Node, grad: &Node) -> Result<Vec<Node>>;

    /// Push the output's bound derivative into the inputs' bound derivatives.
    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()>;

    /// Evaluate into a fresh value.
    fn forward(&self, inputs: &[Value]) -> Result<Value>;

    /// Evaluate, allowed to reuse the buffer of an operand.
    fn unsafe_forward(&self, inputs: Vec<Value>) -> Result<Value> {
        self.forward(&inputs)
    }

    /// Evaluate into `dest`, returning it.
    fn preallocated_forward(&self, dest: Value, inputs: &[Value]) -> Result<Value> {
        let _ = dest;
        self.forward(inputs)
    }

    /// Evaluate and add the result into `acc`.
    fn accumulating_forward(&self, acc: &mut Value, inputs: &[Value]) -> Result<Accumulation> {
        let result = self.forward(inputs)?;
        reroute_sum(acc, result)
    }

    /// Whether evaluation produces a heap buffer.
    fn returns_owned_buffer(&self) -> bool;

    /// Index of the input whose buffer an unsafe evaluation overwrites.
    fn overwrite_candidate(&self) -> Option<usize>;

    /// Whether evaluation goes through an external dense kernel.
    fn calls_external_compute(&self) -> bool;

    /// Digest of the op's structural identity.
    fn structural_hash(&self) -> u32;
}

/// Fold a value's hash into 32 bits.
pub(crate) fn hash32(value: &impl Hash) -> u32 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

/// `acc + result` without touching `acc`.
pub(crate) fn reroute_sum(acc: &Value, result: Value) -> Result<Accumulation> {
    tracing::trace!(acc = %acc.shape(), result = %result.shape(), "rerouting accumulation");
    let sum = match (acc, result) {
        (Value::Scalar(_), result @ Value::Scalar(_)) => {
            ScalarOperator::new(acc.dtype()).evaluate(BinaryOpKind::Add, false, &result, acc)?
        }
        (_, result @ Value::Tensor(_)) => TensorOperator::new(true).unsafe_forward(
            BinaryOpKind::Add,
            false,
            result,
            acc.clone(),
        )?,
        (Value::Tensor(_), result @ Value::Scalar(_)) => {
            TensorOperator::new(false).forward(BinaryOpKind::Add, false, &result, acc)?
        }
    };
    Ok(Accumulation::Rerouted(sum))
}
