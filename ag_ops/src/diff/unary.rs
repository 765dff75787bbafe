//! Rules for elementwise unary kinds.
//!
//! Every rule is `gx = f'(x) ⊙ gz`; where it is cheaper, `f'` is written in
//! terms of the output `z` instead of the input.

use std::f64::consts::LN_2;

use ag_tensor::{Scalar, Value};

use crate::catalog::{BinaryOpKind, UnaryOpKind};
use crate::error::{Error, Result};
use crate::expr;
use crate::node::Node;

use super::{binary_value, incr_into, scalar_like, unary_value};

fn undifferentiable(kind: UnaryOpKind) -> Error {
    Error::NotDifferentiable {
        op: kind.name().to_string(),
    }
}

fn constant_like(like: &Node, v: f64) -> Node {
    Node::constant(Value::Scalar(Scalar::from_f64(like.dtype(), v)))
}

/// Gradient of `z = kind(x)` given `gz`.
pub fn symbolic(kind: UnaryOpKind, x: &Node, z: &Node, gz: &Node) -> Result<Node> {
    use UnaryOpKind::*;

    let local = match kind {
        // d(-x)/dx = -1
        Neg => return expr::neg(gz),
        // d|x|/dx = sign(x)
        Abs => expr::sign(x)?,
        // d(sin x)/dx = cos x
        Sin => expr::cos(x)?,
        // d(cos x)/dx = -sin x
        Cos => expr::neg(&expr::sin(x)?)?,
        // d(e^x)/dx = e^x
        Exp => z.clone(),
        // d(ln x)/dx = 1/x
        Ln => return expr::hadamard_div(gz, x),
        // d(log2 x)/dx = 1/(x ln 2)
        Log2 => {
            let scaled = expr::hadamard_prod(x, &constant_like(x, LN_2))?;
            return expr::hadamard_div(gz, &scaled);
        }
        // d(√x)/dx = 1/(2√x)
        Sqrt => {
            let twice = expr::hadamard_prod(z, &constant_like(z, 2.0))?;
            return expr::hadamard_div(gz, &twice);
        }
        // d(x²)/dx = 2x
        Square => expr::hadamard_prod(x, &constant_like(x, 2.0))?,
        // d(x³)/dx = 3x²
        Cube => expr::hadamard_prod(&expr::square(x)?, &constant_like(x, 3.0))?,
        // d(1/x)/dx = -1/x² = -z²
        Inverse => expr::neg(&expr::square(z)?)?,
        // d(tanh x)/dx = 1 - tanh²x
        Tanh => expr::sub(&constant_like(z, 1.0), &expr::square(z)?)?,
        // dσ/dx = σ(1 - σ)
        Sigmoid => expr::hadamard_prod(z, &expr::sub(&constant_like(z, 1.0), z)?)?,
        Sign | Ceil | Floor => return Err(undifferentiable(kind)),
    };
    expr::hadamard_prod(&local, gz)
}

/// `f'` evaluated at the bound values.
fn local_derivative(kind: UnaryOpKind, x: &Value, z: &Value) -> Result<Value> {
    use UnaryOpKind::*;

    match kind {
        Neg => Ok(scalar_like(x, -1.0)),
        Abs => unary_value(Sign, x),
        Sin => unary_value(Cos, x),
        Cos => unary_value(Neg, &unary_value(Sin, x)?),
        Exp => Ok(z.clone()),
        Ln => unary_value(Inverse, x),
        Log2 => unary_value(Inverse, &binary_value(BinaryOpKind::Mul, x, &scalar_like(x, LN_2))?),
        Sqrt => unary_value(Inverse, &binary_value(BinaryOpKind::Mul, z, &scalar_like(z, 2.0))?),
        Square => binary_value(BinaryOpKind::Mul, x, &scalar_like(x, 2.0)),
        Cube => binary_value(BinaryOpKind::Mul, &unary_value(Square, x)?, &scalar_like(x, 3.0)),
        Inverse => unary_value(Neg, &unary_value(Square, z)?),
        Tanh => binary_value(BinaryOpKind::Sub, &scalar_like(z, 1.0), &unary_value(Square, z)?),
        Sigmoid => {
            let one_minus = binary_value(BinaryOpKind::Sub, &scalar_like(z, 1.0), z)?;
            binary_value(BinaryOpKind::Mul, z, &one_minus)
        }
        Sign | Ceil | Floor => Err(undifferentiable(kind)),
    }
}

/// `x.d += f'(x) ⊙ z.d` for `z = kind(x)`.
pub fn numeric(kind: UnaryOpKind, x: &Node, z: &Node) -> Result<()> {
    let local = local_derivative(kind, &x.primal()?, &z.primal()?)?;
    let gz = z.derivative()?;
    incr_into(x, BinaryOpKind::Mul, &local, &gz)?;
    super::collapse_scalar_derivative(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn check(kind: UnaryOpKind, x0: f64, expected: f64) {
        let x = Node::var("x", Value::from(x0));
        let z = expr::unary(kind, &x).unwrap();
        let gz = Node::constant(Value::from(1.0));
        let sym = symbolic(kind, &x, &z, &gz).unwrap().primal().unwrap().item().unwrap();
        assert!((sym - expected).abs() < EPS, "{:?}: symbolic {} vs {}", kind, sym, expected);

        z.set_derivative(Value::from(1.0)).unwrap();
        numeric(kind, &x, &z).unwrap();
        let num = x.derivative().unwrap().item().unwrap();
        assert!((num - expected).abs() < EPS, "{:?}: numeric {} vs {}", kind, num, expected);
    }

    #[test]
    fn test_unary_rules() {
        let x0: f64 = 0.7;
        let s = 1.0 / (1.0 + (-x0).exp());
        check(UnaryOpKind::Neg, x0, -1.0);
        check(UnaryOpKind::Abs, -x0, -1.0);
        check(UnaryOpKind::Sin, x0, x0.cos());
        check(UnaryOpKind::Cos, x0, -x0.sin());
        check(UnaryOpKind::Exp, x0, x0.exp());
        check(UnaryOpKind::Ln, x0, 1.0 / x0);
        check(UnaryOpKind::Log2, x0, 1.0 / (x0 * LN_2));
        check(UnaryOpKind::Sqrt, x0, 0.5 / x0.sqrt());
        check(UnaryOpKind::Square, x0, 2.0 * x0);
        check(UnaryOpKind::Cube, x0, 3.0 * x0 * x0);
        check(UnaryOpKind::Inverse, x0, -1.0 / (x0 * x0));
        check(UnaryOpKind::Tanh, x0, 1.0 - x0.tanh().powi(2));
        check(UnaryOpKind::Sigmoid, x0, s * (1.0 - s));
    }

    #[test]
    fn test_tensor_numeric() {
        let x = Node::var("x", Value::tensor(vec![1.0, 2.0, 3.0], vec![3]).unwrap());
        let z = expr::square(&x).unwrap();
        z.set_derivative(Value::tensor(vec![1.0, 1.0, 2.0], vec![3]).unwrap()).unwrap();
        numeric(UnaryOpKind::Square, &x, &z).unwrap();
        assert_eq!(x.derivative().unwrap().to_f64_vec(), vec![2.0, 4.0, 12.0]);
    }

    #[test]
    fn test_step_functions_not_differentiable() {
        let x = Node::var("x", Value::from(0.3));
        for kind in [UnaryOpKind::Sign, UnaryOpKind::Ceil, UnaryOpKind::Floor] {
            let z = expr::unary(kind, &x).unwrap();
            let gz = Node::constant(Value::from(1.0));
            assert!(matches!(
                symbolic(kind, &x, &z, &gz),
                Err(Error::NotDifferentiable { .. })
            ));
            assert!(matches!(numeric(kind, &x, &z), Err(Error::NotDifferentiable { .. })));
        }
    }
}
