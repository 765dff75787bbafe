//! A small type model for operation signatures.
//!
//! Operations describe themselves as function types over element dtypes and
//! tensor types. Type variables carry an optional constraint and may be bound
//! to a concrete type; [`Type::prune`] follows those bindings.

use std::fmt;

use ag_tensor::{Dtype, Value};

/// Constraint carried by a type variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// Any type with arithmetic kernels.
    Arithable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A bare element type (a scalar).
    Dtype(Dtype),
    /// A tensor of rank `dims` over `of`.
    Tensor { dims: usize, of: Box<Type> },
    /// A type variable, possibly bound to an instance.
    Var {
        name: String,
        constraint: Option<TypeClass>,
        instance: Option<Box<Type>>,
    },
    /// `args[0] → args[1] → … → ret`
    Function(Vec<Type>),
}

impl Type {
    pub fn tensor(dims: usize, of: Dtype) -> Type {
        Type::Tensor {
            dims,
            of: Box::new(Type::Dtype(of)),
        }
    }

    /// An unbound variable.
    pub fn var(name: &str, constraint: Option<TypeClass>) -> Type {
        Type::Var {
            name: name.to_string(),
            constraint,
            instance: None,
        }
    }

    /// The type describing a runtime value.
    pub fn of_value(v: &Value) -> Type {
        match v {
            Value::Scalar(s) => Type::Dtype(s.dtype()),
            Value::Tensor(t) => Type::tensor(t.shape().ndim(), t.dtype()),
        }
    }

    /// Follow variable bindings until a concrete type or an unbound variable.
    pub fn prune(&self) -> &Type {
        match self {
            Type::Var {
                instance: Some(inner),
                ..
            } => inner.prune(),
            other => other,
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self.prune(), Type::Tensor { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.prune(), Type::Dtype(_))
    }

    /// Element dtype of a scalar or tensor type.
    pub fn dtype(&self) -> Option<Dtype> {
        match self.prune() {
            Type::Dtype(d) => Some(*d),
            Type::Tensor { of, .. } => of.dtype(),
            _ => None,
        }
    }

    /// Return type of a function type; other types return themselves.
    pub fn ret(&self) -> &Type {
        match self.prune() {
            Type::Function(parts) => parts.last().map_or(self, |r| r.ret()),
            other => other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dtype(d) => write!(f, "{}", d),
            Type::Tensor { dims, of } => write!(f, "Tensor-{} {}", dims, of),
            Type::Var {
                instance: Some(inner),
                ..
            } => write!(f, "{}", inner),
            Type::Var { name, .. } => write!(f, "{}", name),
            Type::Function(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " → ")?;
                    }
                    write!(f, "{}", p)?;
                }
                Ok(())
            }
        }
    }
}
