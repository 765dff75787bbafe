//! Linear-algebra products: matmul, matrix-vector, inner and outer product.
//!
//! Transposes are applied through borrowed strided views, so operand storage is
//! never modified and there is nothing to restore afterwards.

use std::fmt;

use ag_tensor::{kernels, Dtype, Shape, Tensor, Value};

use crate::catalog::LinAlgKind;
use crate::diff;
use crate::error::{Error, Result};
use crate::node::{Group, Node};
use crate::op::{hash32, reroute_sum, Accumulation, Op};
use crate::registry::Numeric;
use crate::types::{Type, TypeClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinAlgOperation {
    kind: LinAlgKind,
    transpose_a: bool,
    transpose_b: bool,
}

fn maybe_t(s: &Shape, t: bool) -> Shape {
    if t {
        s.reversed()
    } else {
        s.clone()
    }
}

fn forward_typed<T: Numeric>(op: &LinAlgOperation, a: &Tensor, b: &Tensor) -> Result<Value> {
    let (Some(da), Some(db)) = (T::dense(a), T::dense(b)) else {
        return Err(Error::type_mismatch(a.dtype(), b.dtype()));
    };
    let mut va = da.view();
    let mut vb = db.view();
    if op.transpose_a {
        va = va.t();
    }
    if op.transpose_b {
        vb = vb.t();
    }

    let out = match op.kind {
        LinAlgKind::MatMul => kernels::matmul(&va, &vb)?,
        LinAlgKind::MatVecMul => {
            let column = kernels::matvec(&va, &vb)?;
            let rows = column.numel();
            column.reshape(Shape::new(vec![rows, 1]))?
        }
        LinAlgKind::VecDot => return Ok(Value::Scalar(T::wrap_scalar(kernels::inner(&va, &vb)?))),
        LinAlgKind::OuterProd => kernels::outer(&va, &vb)?,
    };
    Ok(Value::Tensor(T::wrap_dense(out)))
}

impl LinAlgOperation {
    pub fn new(kind: LinAlgKind) -> Self {
        LinAlgOperation {
            kind,
            transpose_a: false,
            transpose_b: false,
        }
    }

    /// Use the transposed view of either operand.
    pub fn transposed(mut self, transpose_a: bool, transpose_b: bool) -> Self {
        self.transpose_a = transpose_a;
        self.transpose_b = transpose_b;
        self
    }

    pub fn kind(&self) -> LinAlgKind {
        self.kind
    }

    pub fn transpose_a(&self) -> bool {
        self.transpose_a
    }

    pub fn transpose_b(&self) -> bool {
        self.transpose_b
    }

    fn pair<'a>(&self, inputs: &'a [Value]) -> Result<(&'a Tensor, &'a Tensor)> {
        let [a, b] = inputs else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 2,
                got: inputs.len(),
            });
        };
        match (a, b) {
            (Value::Tensor(a), Value::Tensor(b)) if a.dtype() == b.dtype() => Ok((a, b)),
            (Value::Tensor(a), Value::Tensor(b)) => Err(Error::type_mismatch(a.dtype(), b.dtype())),
            (Value::Scalar(s), _) | (_, Value::Scalar(s)) => Err(Error::type_mismatch("tensor", s.dtype())),
        }
    }
}

impl fmt::Display for LinAlgOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = |flag: bool| if flag { "ᵀ" } else { "" };
        write!(f, "A{} {} B{}", t(self.transpose_a), self.kind, t(self.transpose_b))
    }
}

impl Op for LinAlgOperation {
    fn arity(&self) -> usize {
        2
    }

    fn result_type(&self) -> Type {
        let a = Type::var("a", Some(TypeClass::Arithable));
        let tensor = |dims| Type::Tensor {
            dims,
            of: Box::new(a.clone()),
        };
        match self.kind {
            LinAlgKind::MatMul => Type::Function(vec![tensor(2), tensor(2), tensor(2)]),
            LinAlgKind::MatVecMul => Type::Function(vec![tensor(2), tensor(1), tensor(2)]),
            LinAlgKind::VecDot => Type::Function(vec![tensor(1), tensor(1), a.clone()]),
            LinAlgKind::OuterProd => Type::Function(vec![tensor(1), tensor(1), tensor(2)]),
        }
    }

    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape> {
        let [a, b] = inputs else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 2,
                got: inputs.len(),
            });
        };
        let mismatch = || Error::ShapeMismatch {
            lhs: (*a).clone(),
            rhs: (*b).clone(),
        };

        match self.kind {
            LinAlgKind::MatMul => {
                let (ea, eb) = (maybe_t(a, self.transpose_a), maybe_t(b, self.transpose_b));
                if ea.ndim() != 2 || eb.ndim() != 2 || ea.dim(1) != eb.dim(0) {
                    return Err(mismatch());
                }
                Ok(Shape::new(vec![ea.dim(0), eb.dim(1)]))
            }
            LinAlgKind::MatVecMul => {
                let ea = maybe_t(a, self.transpose_a);
                if ea.ndim() != 2 || !b.is_vector() || ea.dim(1) != b.numel() {
                    return Err(mismatch());
                }
                Ok(Shape::new(vec![ea.dim(0), 1]))
            }
            LinAlgKind::VecDot => {
                if !a.is_vector() || !b.is_vector() || a.numel() != b.numel() {
                    return Err(mismatch());
                }
                Ok(Shape::scalar())
            }
            LinAlgKind::OuterProd => Ok(Shape::new(vec![a.numel(), b.numel()])),
        }
    }

    fn differentiable_inputs(&self, n: usize) -> Vec<bool> {
        assert_eq!(n, 2, "{} takes exactly two inputs", self);
        vec![true, true]
    }

    fn symbolic_differentiate(&self, inputs: &[Node], output: &Node, grad: &Node) -> Result<Vec<Node>> {
        let [a, b] = inputs else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 2,
                got: inputs.len(),
            });
        };
        let _span = tracing::trace_span!("symbolic_diff", op = %self).entered();
        let grads = diff::linalg::symbolic(self, a, b, output, grad)?;
        for g in &grads {
            g.set_group(Group::Gradient);
        }
        Ok(grads)
    }

    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()> {
        let [a, b] = inputs else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 2,
                got: inputs.len(),
            });
        };
        let _span = tracing::trace_span!("numeric_diff", op = %self).entered();
        diff::linalg::numeric(self, a, b, output)
    }

    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        let (a, b) = self.pair(inputs)?;
        let _span = tracing::trace_span!("linalg", op = %self).entered();
        match a.dtype() {
            Dtype::Float32 => forward_typed::<f32>(self, a, b),
            Dtype::Float64 => forward_typed::<f64>(self, a, b),
            Dtype::Bool => Err(Error::not_implemented(format!("{:?}", self.kind), Dtype::Bool)),
        }
    }

    fn preallocated_forward(&self, dest: Value, inputs: &[Value]) -> Result<Value> {
        let r = match self.forward(inputs)? {
            Value::Tensor(r) => r,
            // VecDot has no buffer to write into
            scalar => return Ok(scalar),
        };
        match dest {
            Value::Tensor(mut d) => {
                if d.dtype() != r.dtype() {
                    return Err(Error::type_mismatch(r.dtype(), d.dtype()));
                }
                if d.numel() != r.numel() {
                    return Err(Error::ShapeMismatch {
                        lhs: d.shape().clone(),
                        rhs: r.shape().clone(),
                    });
                }
                d.assign(&r)?;
                Ok(Value::Tensor(d))
            }
            Value::Scalar(s) => Err(Error::type_mismatch("tensor", s.dtype())),
        }
    }

    fn accumulating_forward(&self, acc: &mut Value, inputs: &[Value]) -> Result<Accumulation> {
        let result = self.forward(inputs)?;
        if let (Value::Tensor(a), Value::Tensor(r)) = (&mut *acc, &result) {
            if a.dtype() != r.dtype() {
                return Err(Error::type_mismatch(a.dtype(), r.dtype()));
            }
            if a.numel() != r.numel() {
                return Err(Error::ShapeMismatch {
                    lhs: a.shape().clone(),
                    rhs: r.shape().clone(),
                });
            }
            a.accumulate(r)?;
            return Ok(Accumulation::Accumulated);
        }
        reroute_sum(acc, result)
    }

    fn returns_owned_buffer(&self) -> bool {
        true
    }

    fn overwrite_candidate(&self) -> Option<usize> {
        None
    }

    fn calls_external_compute(&self) -> bool {
        self.kind != LinAlgKind::VecDot
    }

    fn structural_hash(&self) -> u32 {
        hash32(&("linalg", self.kind, self.transpose_a, self.transpose_b))
    }
}
