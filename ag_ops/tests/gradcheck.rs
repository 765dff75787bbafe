//! Reverse-mode gradients checked against central finite differences on
//! random inputs.

use ag_ops::{backprop, expr, finite_diff_value_grad, grad, max_grad_error, LinAlgKind, Node, Result};
use ag_tensor::Value;
use rand::distributions::Uniform;
use rand::prelude::*;

const EPS: f64 = 1e-6;
const TOLERANCE: f64 = 1e-5;

fn random_tensor(rng: &mut StdRng, dist: &Uniform<f64>, dims: Vec<usize>) -> Value {
    let n: usize = dims.iter().product();
    let data: Vec<f64> = (0..n).map(|_| rng.sample(dist)).collect();
    Value::tensor(data, dims).unwrap()
}

/// Compare both reverse passes with finite differences for every input.
fn check_gradients<F>(name: &str, inputs: &[Value], build: F)
where
    F: Fn(&[Node]) -> Result<Node>,
{
    let vars: Vec<Node> = inputs
        .iter()
        .enumerate()
        .map(|(i, v)| Node::var(&format!("x{i}"), v.clone()))
        .collect();
    let out = build(&vars).unwrap();
    assert!(out.is_scalar(), "{name}: output must be a scalar");

    let numeric = backprop(&out).unwrap();
    let symbolic = grad(&out, &vars).unwrap();

    for (i, point) in inputs.iter().enumerate() {
        let f = |v: &Value| -> Result<f64> {
            let nodes: Vec<Node> = inputs
                .iter()
                .enumerate()
                .map(|(j, w)| Node::constant(if j == i { v.clone() } else { w.clone() }))
                .collect();
            Ok(build(&nodes)?.primal()?.item().unwrap_or(f64::NAN))
        };
        let expected = finite_diff_value_grad(f, point, EPS).unwrap();

        let bp = numeric.wrt(&vars[i]).unwrap();
        assert_eq!(bp.shape(), point.shape(), "{name}: backprop shape for input {i}");
        let bp = bp.to_f64_vec();
        let err = max_grad_error(&bp, &expected);
        assert!(
            err < TOLERANCE,
            "{name}: backprop input {i}: got={bp:?}, expected={expected:?}, err={err}"
        );

        let sym = symbolic[i].primal().unwrap().to_f64_vec();
        let err = max_grad_error(&sym, &bp);
        assert!(err < 1e-10, "{name}: grad vs backprop input {i}: {sym:?} vs {bp:?}");
    }
}

// ============================================================================
// Elementwise
// ============================================================================

#[test]
fn test_unary_chain() {
    let mut rng = StdRng::seed_from_u64(7);
    let dist = Uniform::new(0.5, 2.0);
    let x = random_tensor(&mut rng, &dist, vec![2, 3]);

    check_gradients("unary chain", &[x], |v| {
        let a = expr::ln(&expr::square(&v[0])?)?;
        let b = expr::sigmoid(&expr::sqrt(&v[0])?)?;
        let c = expr::tanh(&expr::inverse(&v[0])?)?;
        let d = expr::hadamard_prod(&expr::exp(&expr::neg(&v[0])?)?, &expr::cos(&v[0])?)?;
        let total = expr::add(&expr::add(&a, &b)?, &expr::add(&c, &d)?)?;
        expr::sum(&total, &[])
    });
}

#[test]
fn test_cube_log2_sin() {
    let mut rng = StdRng::seed_from_u64(11);
    let dist = Uniform::new(0.5, 2.0);
    let x = random_tensor(&mut rng, &dist, vec![4]);

    check_gradients("cube log2 sin", &[x], |v| {
        let a = expr::cube(&expr::sin(&v[0])?)?;
        let b = expr::log2(&v[0])?;
        expr::sum(&expr::sub(&a, &b)?, &[])
    });
}

#[test]
fn test_division() {
    let mut rng = StdRng::seed_from_u64(3);
    let dist = Uniform::new(0.5, 2.0);
    let x = random_tensor(&mut rng, &dist, vec![3]);
    let y = random_tensor(&mut rng, &dist, vec![3]);

    check_gradients("division", &[x, y], |v| {
        let q = expr::hadamard_div(&v[0], &v[1])?;
        expr::sum(&expr::square(&q)?, &[])
    });
}

#[test]
fn test_scalar_broadcast() {
    let mut rng = StdRng::seed_from_u64(5);
    let dist = Uniform::new(-1.0, 1.0);
    let x = random_tensor(&mut rng, &dist, vec![2, 2]);
    let s = Value::from(rng.sample(&dist));

    check_gradients("scalar broadcast", &[x, s], |v| {
        let scaled = expr::hadamard_prod(&v[0], &v[1])?;
        let shifted = expr::sub(&v[1], &scaled)?;
        expr::sum(&expr::tanh(&shifted)?, &[])
    });
}

// ============================================================================
// Reductions
// ============================================================================

#[test]
fn test_partial_sum() {
    let mut rng = StdRng::seed_from_u64(13);
    let dist = Uniform::new(-1.0, 1.0);
    let x = random_tensor(&mut rng, &dist, vec![2, 3]);

    check_gradients("partial sum", &[x], |v| {
        let rows = expr::sum(&v[0], &[1])?;
        expr::sum(&expr::square(&rows)?, &[])
    });
}

// ============================================================================
// Linear algebra
// ============================================================================

#[test]
fn test_matmul_all_transposes() {
    let mut rng = StdRng::seed_from_u64(17);
    let dist = Uniform::new(-1.0, 1.0);

    for (ta, tb) in [(false, false), (true, false), (false, true), (true, true)] {
        let a_dims = if ta { vec![3, 2] } else { vec![2, 3] };
        let b_dims = if tb { vec![4, 3] } else { vec![3, 4] };
        let a = random_tensor(&mut rng, &dist, a_dims);
        let b = random_tensor(&mut rng, &dist, b_dims);

        check_gradients(&format!("matmul ta={ta} tb={tb}"), &[a, b], |v| {
            let c = expr::linalg(LinAlgKind::MatMul, ta, tb, &v[0], &v[1])?;
            expr::sum(&expr::square(&c)?, &[])
        });
    }
}

#[test]
fn test_matvec() {
    let mut rng = StdRng::seed_from_u64(19);
    let dist = Uniform::new(-1.0, 1.0);
    let a = random_tensor(&mut rng, &dist, vec![2, 3]);
    let x = random_tensor(&mut rng, &dist, vec![3]);

    check_gradients("matvec", &[a, x], |v| {
        let y = expr::matvec(&v[0], &v[1])?;
        expr::sum(&expr::square(&y)?, &[])
    });
}

#[test]
fn test_vecdot_and_outer() {
    let mut rng = StdRng::seed_from_u64(23);
    let dist = Uniform::new(-1.0, 1.0);
    let a = random_tensor(&mut rng, &dist, vec![3]);
    let b = random_tensor(&mut rng, &dist, vec![3]);

    check_gradients("vecdot", &[a.clone(), b.clone()], |v| {
        let d = expr::vecdot(&v[0], &v[1])?;
        expr::square(&d)
    });

    check_gradients("outer", &[a, b], |v| {
        let m = expr::outer(&v[0], &v[1])?;
        expr::sum(&expr::sin(&m)?, &[])
    });
}
