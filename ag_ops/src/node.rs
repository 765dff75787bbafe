//! Expression graph nodes.
//!
//! A [`Node`] is a reference-counted handle to an immutable description
//! (origin, children, type, shape) plus two small pieces of mutable state: the
//! [`Group`] it belongs to and the [`DualValue`] bound to it once it has been
//! evaluated. Cloning a `Node` is cheap and shares that state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ag_tensor::{Dtype, Shape, Value};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::op::Op;
use crate::types::Type;

/// Global counter for unique node IDs.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Logical cluster a node is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Built while differentiating another node.
    Gradient,
}

/// Where a node's value comes from.
#[derive(Debug, Clone)]
pub enum Origin {
    /// Differentiable leaf.
    Var { name: String },
    /// Fixed leaf, never receives a gradient.
    Const,
    /// Result of an operation on the children.
    Op(Arc<dyn Op>),
}

/// A value paired with its derivative.
#[derive(Debug, Clone, PartialEq)]
pub struct DualValue {
    value: Value,
    deriv: Value,
}

impl DualValue {
    /// Bind `value` with a zero derivative of the same kind, dtype and shape.
    pub fn new(value: Value) -> Self {
        let deriv = value.zeros_like();
        DualValue { value, deriv }
    }

    pub fn primal(&self) -> &Value {
        &self.value
    }

    pub fn derivative(&self) -> &Value {
        &self.deriv
    }

    pub fn derivative_mut(&mut self) -> &mut Value {
        &mut self.deriv
    }

    /// Replace the derivative.
    ///
    /// The dtype must match the primal. A tensor primal needs a derivative with
    /// the same element count; a scalar primal accepts any shape (the caller
    /// is expected to sum a tensor-shaped derivative down afterwards).
    pub fn set_derivative(&mut self, deriv: Value) -> Result<()> {
        if deriv.dtype() != self.value.dtype() {
            return Err(Error::type_mismatch(self.value.dtype(), deriv.dtype()));
        }
        if self.value.is_tensor() && deriv.numel() != self.value.numel() {
            return Err(Error::ShapeMismatch {
                lhs: self.value.shape(),
                rhs: deriv.shape(),
            });
        }
        self.deriv = deriv;
        Ok(())
    }
}

/// Internal node structure.
pub struct NodeInner {
    id: NodeId,
    origin: Origin,
    children: Vec<Node>,
    ty: Type,
    shape: Shape,
    dtype: Dtype,
    group: Mutex<Option<Group>>,
    bound: Mutex<Option<DualValue>>,
}

/// A node in the expression graph.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.0.id)
            .field("origin", &self.0.origin)
            .field("shape", &self.0.shape)
            .field("children", &self.0.children.len())
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.origin {
            Origin::Var { name } => write!(f, "{}", name),
            Origin::Const => write!(f, "const{}", self.0.id),
            Origin::Op(op) => write!(f, "{}({})", op, self.0.id),
        }
    }
}

fn type_for(dtype: Dtype, shape: &Shape) -> Type {
    if shape.is_scalar() {
        Type::Dtype(dtype)
    } else {
        Type::tensor(shape.ndim(), dtype)
    }
}

impl Node {
    fn new_node(origin: Origin, children: Vec<Node>, ty: Type, shape: Shape, dtype: Dtype, bound: Option<DualValue>) -> Self {
        Node(Arc::new(NodeInner {
            id: NodeId(next_node_id()),
            origin,
            children,
            ty,
            shape,
            dtype,
            group: Mutex::new(None),
            bound: Mutex::new(bound),
        }))
    }

    fn leaf(origin: Origin, value: Value) -> Self {
        let ty = Type::of_value(&value);
        let (shape, dtype) = (value.shape(), value.dtype());
        Self::new_node(origin, vec![], ty, shape, dtype, Some(DualValue::new(value)))
    }

    // === Constructors ===

    /// A differentiable leaf bound to `value`.
    pub fn var(name: &str, value: Value) -> Self {
        Self::leaf(Origin::Var { name: name.to_string() }, value)
    }

    /// A fixed leaf bound to `value`.
    pub fn constant(value: Value) -> Self {
        Self::leaf(Origin::Const, value)
    }

    /// A differentiable leaf with no value yet.
    pub fn placeholder(name: &str, dtype: Dtype, shape: Shape) -> Self {
        let ty = type_for(dtype, &shape);
        Self::new_node(Origin::Var { name: name.to_string() }, vec![], ty, shape, dtype, None)
    }

    /// A constant of `like`'s type and shape filled with `v`.
    pub fn filled_like(like: &Node, v: f64) -> Self {
        let value = if like.is_scalar() {
            Value::Scalar(ag_tensor::Scalar::from_f64(like.dtype(), v))
        } else {
            Value::Tensor(ag_tensor::Tensor::full(like.dtype(), like.shape().clone(), v))
        };
        Self::constant(value)
    }

    /// Apply `op` to `children`.
    ///
    /// Type and shape are inferred up front. When every child already holds a
    /// value the op is evaluated right away and the result is bound. An op
    /// with no forward kernel leaves the node unbound; every other evaluation
    /// failure is returned.
    pub fn apply(op: Arc<dyn Op>, children: Vec<Node>) -> Result<Self> {
        if children.len() != op.arity() {
            return Err(Error::ArityMismatch {
                op: op.to_string(),
                expected: op.arity(),
                got: children.len(),
            });
        }

        let shapes: Vec<&Shape> = children.iter().map(|c| c.shape()).collect();
        let shape = op.infer_shape(&shapes)?;
        let ret = op.result_type();
        let dtype = match ret.ret().dtype() {
            Some(d) => d,
            None => children[0].dtype(),
        };
        let ty = type_for(dtype, &shape);

        let bound = if children.iter().all(Node::is_bound) {
            let inputs = children.iter().map(Node::primal).collect::<Result<Vec<_>>>()?;
            match op.forward(&inputs) {
                Ok(v) => Some(DualValue::new(v)),
                Err(err @ Error::NotImplemented { .. }) => {
                    tracing::trace!(op = %op, %err, "leaving node unbound");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        Ok(Self::new_node(Origin::Op(op), children, ty, shape, dtype, bound))
    }

    // === Accessors ===

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn origin(&self) -> &Origin {
        &self.0.origin
    }

    /// The op, for non-leaf nodes.
    pub fn op(&self) -> Option<&Arc<dyn Op>> {
        match &self.0.origin {
            Origin::Op(op) => Some(op),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.0.children
    }

    pub fn ty(&self) -> &Type {
        &self.0.ty
    }

    pub fn shape(&self) -> &Shape {
        &self.0.shape
    }

    pub fn dtype(&self) -> Dtype {
        self.0.dtype
    }

    /// Whether the node's type is a bare scalar.
    pub fn is_scalar(&self) -> bool {
        self.0.ty.is_scalar()
    }

    pub fn is_var(&self) -> bool {
        matches!(self.0.origin, Origin::Var { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.0.origin, Origin::Const)
    }

    pub fn name(&self) -> Option<&str> {
        match &self.0.origin {
            Origin::Var { name } => Some(name),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<Group> {
        *self.0.group.lock()
    }

    pub fn set_group(&self, group: Group) {
        *self.0.group.lock() = Some(group);
    }

    // === Bound values ===

    pub fn is_bound(&self) -> bool {
        self.0.bound.lock().is_some()
    }

    /// Bind a fresh value with a zero derivative.
    pub fn bind(&self, value: Value) {
        *self.0.bound.lock() = Some(DualValue::new(value));
    }

    fn unbound(&self) -> Error {
        Error::Unbound { node: self.to_string() }
    }

    /// Run `f` on the bound dual value while holding this node's lock.
    ///
    /// `f` must not lock another node.
    pub fn with_dual<R>(&self, f: impl FnOnce(&mut DualValue) -> R) -> Result<R> {
        let mut guard = self.0.bound.lock();
        match guard.as_mut() {
            Some(dual) => Ok(f(dual)),
            None => Err(self.unbound()),
        }
    }

    /// A copy of the bound dual value.
    pub fn bound_dual_value(&self) -> Result<DualValue> {
        self.with_dual(|dual| dual.clone())
    }

    /// A copy of the bound primal value.
    pub fn primal(&self) -> Result<Value> {
        self.with_dual(|dual| dual.primal().clone())
    }

    /// A copy of the bound derivative.
    pub fn derivative(&self) -> Result<Value> {
        self.with_dual(|dual| dual.derivative().clone())
    }

    pub fn set_derivative(&self, deriv: Value) -> Result<()> {
        self.with_dual(|dual| dual.set_derivative(deriv))?
    }
}
