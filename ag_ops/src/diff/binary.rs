//! Rules for elementwise binary kinds.

use crate::catalog::{BinaryOpKind, UnaryOpKind};
use crate::error::{Error, Result};
use crate::expr;
use crate::node::Node;

use super::{binary_value, incr_into, unary_value, update_derivative};

fn undifferentiable(kind: BinaryOpKind, form: &str) -> Error {
    if kind.is_arith() {
        // Pow has no rule yet
        Error::not_implemented(format!("{:?}", kind), form)
    } else {
        Error::NotDifferentiable {
            op: kind.symbol().to_string(),
        }
    }
}

/// Gradients `[gx, gy]` of `z = x <kind> y` given `gz`.
pub fn symbolic(kind: BinaryOpKind, x: &Node, y: &Node, z: &Node, gz: &Node) -> Result<Vec<Node>> {
    match kind {
        // d(x + y)/dx = 1, d(x + y)/dy = 1
        BinaryOpKind::Add => Ok(vec![gz.clone(), gz.clone()]),
        // d(x - y)/dx = 1, d(x - y)/dy = -1
        BinaryOpKind::Sub => Ok(vec![gz.clone(), expr::neg(gz)?]),
        // d(x * y)/dx = y, d(x * y)/dy = x
        BinaryOpKind::Mul => Ok(vec![expr::hadamard_prod(y, gz)?, expr::hadamard_prod(x, gz)?]),
        // d(x / y)/dx = 1/y, d(x / y)/dy = -x/y² = -z/y
        BinaryOpKind::Div => {
            let gx = expr::hadamard_div(gz, y)?;
            let ratio = expr::hadamard_div(z, y)?;
            let gy = expr::neg(&expr::hadamard_prod(&ratio, gz)?)?;
            Ok(vec![gx, gy])
        }
        _ => Err(undifferentiable(kind, "symbolic differentiation")),
    }
}

/// Push `z.d` into `x.d` and `y.d` for `z = x <kind> y`.
pub fn numeric(kind: BinaryOpKind, x: &Node, y: &Node, z: &Node) -> Result<()> {
    match kind {
        BinaryOpKind::Add => {
            let gz = z.derivative()?;
            update_derivative(x, BinaryOpKind::Add, gz.clone())?;
            update_derivative(y, BinaryOpKind::Add, gz)
        }
        BinaryOpKind::Sub => {
            let gz = z.derivative()?;
            update_derivative(x, BinaryOpKind::Add, gz.clone())?;
            update_derivative(y, BinaryOpKind::Sub, gz)
        }
        BinaryOpKind::Mul => {
            let gz = z.derivative()?;
            let (xv, yv) = (x.primal()?, y.primal()?);
            incr_into(x, BinaryOpKind::Mul, &yv, &gz)?;
            incr_into(y, BinaryOpKind::Mul, &xv, &gz)
        }
        BinaryOpKind::Div => {
            let gz = z.derivative()?;
            let (yv, zv) = (y.primal()?, z.primal()?);
            update_derivative(x, BinaryOpKind::Add, binary_value(BinaryOpKind::Div, &gz, &yv)?)?;
            let neg_ratio = unary_value(UnaryOpKind::Neg, &binary_value(BinaryOpKind::Div, &zv, &yv)?)?;
            incr_into(y, BinaryOpKind::Mul, &gz, &neg_ratio)
        }
        _ => Err(undifferentiable(kind, "numeric differentiation")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_tensor::Value;

    fn scalars(x: f64, y: f64) -> (Node, Node) {
        (Node::var("x", Value::from(x)), Node::var("y", Value::from(y)))
    }

    #[test]
    fn test_add_passes_gradient_through() {
        let (x, y) = scalars(1.0, 2.0);
        let z = expr::add(&x, &y).unwrap();
        let gz = Node::constant(Value::from(1.0));
        let grads = symbolic(BinaryOpKind::Add, &x, &y, &z, &gz).unwrap();
        assert_eq!(grads[0].id(), gz.id());
        assert_eq!(grads[1].id(), gz.id());
    }

    #[test]
    fn test_sub_negates_second() {
        let (x, y) = scalars(1.0, 2.0);
        let z = expr::sub(&x, &y).unwrap();
        let gz = Node::constant(Value::from(1.5));
        let grads = symbolic(BinaryOpKind::Sub, &x, &y, &z, &gz).unwrap();
        assert_eq!(grads[0].id(), gz.id());
        assert_eq!(grads[1].children()[0].id(), gz.id());
        assert_eq!(grads[1].primal().unwrap(), Value::from(-1.5));
    }

    #[test]
    fn test_mul_numeric() {
        let (x, y) = scalars(2.0, 3.0);
        let z = expr::hadamard_prod(&x, &y).unwrap();
        z.set_derivative(Value::from(1.0)).unwrap();
        numeric(BinaryOpKind::Mul, &x, &y, &z).unwrap();
        assert_eq!(x.derivative().unwrap(), Value::from(3.0));
        assert_eq!(y.derivative().unwrap(), Value::from(2.0));
    }

    #[test]
    fn test_div_symbolic_and_numeric_agree() {
        let (x, y) = scalars(3.0, 2.0);
        let z = expr::hadamard_div(&x, &y).unwrap();
        let gz = Node::constant(Value::from(1.0));
        let grads = symbolic(BinaryOpKind::Div, &x, &y, &z, &gz).unwrap();
        let gx = grads[0].primal().unwrap().item().unwrap();
        let gy = grads[1].primal().unwrap().item().unwrap();
        assert!((gx - 0.5).abs() < 1e-12);
        assert!((gy + 0.75).abs() < 1e-12);

        z.set_derivative(Value::from(1.0)).unwrap();
        numeric(BinaryOpKind::Div, &x, &y, &z).unwrap();
        assert!((x.derivative().unwrap().item().unwrap() - gx).abs() < 1e-12);
        assert!((y.derivative().unwrap().item().unwrap() - gy).abs() < 1e-12);
    }

    #[test]
    fn test_sub_numeric_tensor() {
        let x = Node::var("x", Value::tensor(vec![1.0, 2.0], vec![2]).unwrap());
        let y = Node::var("y", Value::tensor(vec![5.0, 5.0], vec![2]).unwrap());
        let z = expr::sub(&x, &y).unwrap();
        z.set_derivative(Value::tensor(vec![1.0, 2.0], vec![2]).unwrap()).unwrap();
        numeric(BinaryOpKind::Sub, &x, &y, &z).unwrap();
        assert_eq!(x.derivative().unwrap().to_f64_vec(), vec![1.0, 2.0]);
        assert_eq!(y.derivative().unwrap().to_f64_vec(), vec![-1.0, -2.0]);
    }

    #[test]
    fn test_pow_and_comparisons_fail() {
        let (x, y) = scalars(2.0, 3.0);
        let z = expr::pow(&x, &y).unwrap();
        let gz = Node::constant(Value::from(1.0));
        assert!(matches!(
            symbolic(BinaryOpKind::Pow, &x, &y, &z, &gz),
            Err(Error::NotImplemented { .. })
        ));
        assert!(matches!(
            numeric(BinaryOpKind::Pow, &x, &y, &z),
            Err(Error::NotImplemented { .. })
        ));

        let lt = expr::lt(&x, &y).unwrap();
        assert!(matches!(
            symbolic(BinaryOpKind::Lt, &x, &y, &lt, &gz),
            Err(Error::NotDifferentiable { .. })
        ));
        assert!(matches!(
            numeric(BinaryOpKind::Lt, &x, &y, &lt),
            Err(Error::NotDifferentiable { .. })
        ));
    }
}
