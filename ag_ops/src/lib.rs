//! # ag_ops - Operator and Autodiff Engine
//!
//! Elementwise, linear-algebra and reduction operations over scalars and dense
//! tensors, each able to infer its result type and shape, evaluate under
//! several write strategies, and differentiate itself both symbolically (by
//! building gradient nodes) and numerically (by pushing bound derivatives).
//!
//! ## Quick Start
//!
//! ```
//! use ag_ops::{backward, expr, Node};
//! use ag_tensor::Value;
//!
//! let x = Node::var("x", Value::from(2.0));
//! let y = Node::var("y", Value::from(3.0));
//!
//! // z = x * y + sin(x)
//! let z = expr::add(&expr::hadamard_prod(&x, &y).unwrap(), &expr::sin(&x).unwrap()).unwrap();
//! let value = z.primal().unwrap().item().unwrap();
//! assert!((value - 6.909297426825682).abs() < 1e-10);
//!
//! // numeric reverse pass
//! let grads = backward::backprop(&z).unwrap();
//! let dz_dx = grads.wrt(&x).unwrap().item().unwrap();
//! assert!((dz_dx - 2.5838531634528574).abs() < 1e-10);
//!
//! // symbolic reverse pass builds gradient nodes
//! let g = backward::grad(&z, &[y.clone()]).unwrap();
//! assert_eq!(g[0].primal().unwrap(), Value::from(2.0));
//! ```
//!
//! ## Operations
//!
//! | Family | Kinds |
//! |--------|-------|
//! | Binary | `+`, `-`, `⊙`, `÷`, `^`, `<`, `>`, `<=`, `>=`, `==`, `!=` |
//! | Unary | neg, abs, sign, ceil, floor, sin, cos, exp, ln, log2, sqrt, square, cube, inverse, tanh, sigmoid |
//! | Linear algebra | matmul, matrix-vector, inner product, outer product |
//! | Reduction | sum, max (shape and symbolic gradient only) |
//!
//! ## Architecture
//!
//! - [`Op`]: the operation trait; [`BinaryOperation`], [`UnaryOperation`],
//!   [`LinAlgOperation`] and [`ReductionOperation`] implement it.
//! - [`ScalarOperator`] / [`TensorOperator`]: binary evaluators over kernels
//!   looked up in the [`registry`].
//! - [`Node`]: reference-counted graph node holding an optional [`DualValue`].
//! - [`diff`]: per-family differentiation rules.
//! - [`backward`]: reference numeric and symbolic reverse passes.

pub mod backward;
pub mod binary;
pub mod catalog;
pub mod diff;
pub mod error;
pub mod expr;
mod finite_diff;
pub mod linalg;
pub mod node;
pub mod op;
pub mod reduction;
pub mod registry;
pub mod scalar_op;
pub mod tensor_op;
pub mod types;
pub mod unary;

pub use backward::{backprop, grad, Gradients};
pub use binary::{BinaryOperation, Operator};
pub use catalog::{BinaryOpKind, LinAlgKind, ReductionKind, UnaryOpKind};
pub use diff::store_gradient;
pub use error::{Error, Result};
pub use finite_diff::{finite_diff_grad, finite_diff_value_grad, max_grad_error, value_from_f64};
pub use linalg::LinAlgOperation;
pub use node::{DualValue, Group, Node, NodeId, Origin};
pub use op::{Accumulation, Op, Strategy};
pub use reduction::{ReductionOperation, RepeatOperation, ReshapeOperation};
pub use scalar_op::ScalarOperator;
pub use tensor_op::TensorOperator;
pub use types::{Type, TypeClass};
pub use unary::UnaryOperation;
