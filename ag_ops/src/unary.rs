//! Elementwise unary operation.

use std::fmt;

use ag_tensor::{Dtype, Scalar, Shape, Tensor, Value};

use crate::catalog::UnaryOpKind;
use crate::diff;
use crate::error::{Error, Result};
use crate::node::{Group, Node};
use crate::op::{hash32, reroute_sum, Accumulation, Op};
use crate::registry::{self, Numeric};
use crate::types::{Type, TypeClass};

/// `f(x)` applied to a scalar or to every element of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnaryOperation {
    kind: UnaryOpKind,
    arg_tensor: bool,
}

fn scalar_typed<T: Numeric>(kind: UnaryOpKind, s: &Scalar) -> Result<Value> {
    let f = registry::unary::<T>(kind)?;
    let x = T::scalar(s).ok_or_else(|| Error::type_mismatch(T::DTYPE, s.dtype()))?;
    Ok(Value::Scalar(T::wrap_scalar(f(x))))
}

fn tensor_typed<T: Numeric>(kind: UnaryOpKind, t: &Tensor) -> Result<Value> {
    let f = registry::unary::<T>(kind)?;
    let d = T::dense(t).ok_or_else(|| Error::type_mismatch(T::DTYPE, t.dtype()))?;
    Ok(Value::Tensor(T::wrap_dense(d.map(f))))
}

fn in_place_typed<T: Numeric>(kind: UnaryOpKind, t: Tensor) -> Result<Value> {
    let f = registry::unary::<T>(kind)?;
    let mut d = T::into_dense(t).map_err(|t| Error::type_mismatch(T::DTYPE, t.dtype()))?;
    d.map_in_place(f);
    Ok(Value::Tensor(T::wrap_dense(d)))
}

impl UnaryOperation {
    pub fn new(kind: UnaryOpKind, arg: &Type) -> Self {
        UnaryOperation {
            kind,
            arg_tensor: arg.is_tensor(),
        }
    }

    pub fn for_value(kind: UnaryOpKind, v: &Value) -> Self {
        UnaryOperation {
            kind,
            arg_tensor: v.is_tensor(),
        }
    }

    pub fn kind(&self) -> UnaryOpKind {
        self.kind
    }

    fn single<'a>(&self, inputs: &'a [Value]) -> Result<&'a Value> {
        match inputs {
            [x] => Ok(x),
            _ => Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 1,
                got: inputs.len(),
            }),
        }
    }
}

impl fmt::Display for UnaryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Op for UnaryOperation {
    fn arity(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        let a = Type::var("a", Some(TypeClass::Arithable));
        Type::Function(vec![a.clone(), a])
    }

    fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape> {
        match inputs {
            [s] => Ok((*s).clone()),
            _ => Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 1,
                got: inputs.len(),
            }),
        }
    }

    fn differentiable_inputs(&self, n: usize) -> Vec<bool> {
        assert_eq!(n, 1, "{} takes exactly one input", self);
        vec![self.kind.is_differentiable()]
    }

    fn symbolic_differentiate(&self, inputs: &[Node], output: &Node, grad: &Node) -> Result<Vec<Node>> {
        let [x] = inputs else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 1,
                got: inputs.len(),
            });
        };
        let _span = tracing::trace_span!("symbolic_diff", op = %self).entered();
        let gx = diff::unary::symbolic(self.kind, x, output, grad)?;
        gx.set_group(Group::Gradient);
        Ok(vec![gx])
    }

    fn numeric_differentiate(&self, inputs: &[Node], output: &Node) -> Result<()> {
        let [x] = inputs else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 1,
                got: inputs.len(),
            });
        };
        let _span = tracing::trace_span!("numeric_diff", op = %self).entered();
        diff::unary::numeric(self.kind, x, output)
    }

    fn forward(&self, inputs: &[Value]) -> Result<Value> {
        match self.single(inputs)? {
            Value::Scalar(s) => match s.dtype() {
                Dtype::Float32 => scalar_typed::<f32>(self.kind, s),
                Dtype::Float64 => scalar_typed::<f64>(self.kind, s),
                Dtype::Bool => Err(Error::not_implemented(format!("{:?}", self.kind), Dtype::Bool)),
            },
            Value::Tensor(t) => match t.dtype() {
                Dtype::Float32 => tensor_typed::<f32>(self.kind, t),
                Dtype::Float64 => tensor_typed::<f64>(self.kind, t),
                Dtype::Bool => Err(Error::not_implemented(format!("{:?}", self.kind), Dtype::Bool)),
            },
        }
    }

    fn unsafe_forward(&self, inputs: Vec<Value>) -> Result<Value> {
        let got = inputs.len();
        let Ok([x]) = <[Value; 1]>::try_from(inputs) else {
            return Err(Error::ArityMismatch {
                op: self.to_string(),
                expected: 1,
                got,
            });
        };
        match x {
            Value::Tensor(t) => match t.dtype() {
                Dtype::Float32 => in_place_typed::<f32>(self.kind, t),
                Dtype::Float64 => in_place_typed::<f64>(self.kind, t),
                Dtype::Bool => Err(Error::not_implemented(format!("{:?}", self.kind), Dtype::Bool)),
            },
            scalar => self.forward(&[scalar]),
        }
    }

    fn preallocated_forward(&self, dest: Value, inputs: &[Value]) -> Result<Value> {
        let result = self.forward(inputs)?;
        match (dest, result) {
            (Value::Tensor(mut d), Value::Tensor(r)) => {
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
            (Value::Scalar(s), Value::Tensor(_)) => Err(Error::type_mismatch("tensor", s.dtype())),
            // no buffer to write into
            (_, scalar) => Ok(scalar),
        }
    }

    fn accumulating_forward(&self, acc: &mut Value, inputs: &[Value]) -> Result<Accumulation> {
        let result = self.forward(inputs)?;
        if let (Value::Tensor(a), Value::Tensor(r)) = (&mut *acc, &result) {
            if a.dtype() == r.dtype() && a.numel() == r.numel() {
                a.accumulate(r)?;
                return Ok(Accumulation::Accumulated);
            }
        }
        reroute_sum(acc, result)
    }

    fn returns_owned_buffer(&self) -> bool {
        self.arg_tensor
    }

    fn overwrite_candidate(&self) -> Option<usize> {
        self.arg_tensor.then_some(0)
    }

    fn calls_external_compute(&self) -> bool {
        false
    }

    fn structural_hash(&self) -> u32 {
        hash32(&("unary", self.kind, self.arg_tensor))
    }
}
