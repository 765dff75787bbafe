//! End-to-end behaviour of the operator engine through its public API.

use std::sync::Arc;

use ag_ops::{
    expr, Accumulation, BinaryOpKind, BinaryOperation, Error, Node, Op, ReductionKind, ReductionOperation,
    ScalarOperator, Type,
};
use ag_tensor::{Dtype, Shape, Value};

const TOLERANCE: f64 = 1e-12;

fn assert_close(got: f64, expected: f64, name: &str) {
    let diff = (got - expected).abs();
    assert!(diff < TOLERANCE, "{name}: got={got}, expected={expected}, diff={diff}");
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_scalar_arithmetic_matches_direct_math() {
    let f64_op = ScalarOperator::new(Dtype::Float64);
    let cases = [
        (BinaryOpKind::Add, 1.5 + 2.25),
        (BinaryOpKind::Sub, 1.5 - 2.25),
        (BinaryOpKind::Mul, 1.5 * 2.25),
        (BinaryOpKind::Div, 1.5 / 2.25),
        (BinaryOpKind::Pow, 1.5f64.powf(2.25)),
    ];
    for (kind, expected) in cases {
        let v = f64_op
            .evaluate(kind, false, &Value::from(1.5), &Value::from(2.25))
            .unwrap();
        assert_close(v.item().unwrap(), expected, &format!("{kind:?} f64"));
    }

    let f32_op = ScalarOperator::new(Dtype::Float32);
    let v = f32_op
        .evaluate(BinaryOpKind::Mul, false, &Value::from(1.5f32), &Value::from(4.0f32))
        .unwrap();
    assert_eq!(v, Value::from(6.0f32));

    let err = f64_op
        .evaluate(BinaryOpKind::Add, false, &Value::from(1.0), &Value::from(1.0f32))
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
}

#[test]
fn test_comparison_result_dtype() {
    let op = ScalarOperator::new(Dtype::Float64);
    let plain = op
        .evaluate(BinaryOpKind::Lt, false, &Value::from(2.0), &Value::from(3.0))
        .unwrap();
    assert_eq!(plain, Value::from(true));

    let same = op
        .evaluate(BinaryOpKind::Lt, true, &Value::from(2.0), &Value::from(3.0))
        .unwrap();
    assert_eq!(same, Value::from(1.0));
}

#[test]
fn test_binary_shape_inference() {
    let op = BinaryOperation::new(
        BinaryOpKind::Add,
        &Type::tensor(2, Dtype::Float64),
        &Type::tensor(2, Dtype::Float64),
    )
    .unwrap();
    let scalar = Shape::scalar();
    let s34 = Shape::new(vec![3, 4]);
    let s22 = Shape::new(vec![2, 2]);

    assert_eq!(op.infer_shape(&[&scalar, &scalar]).unwrap(), scalar);
    assert_eq!(op.infer_shape(&[&s34, &scalar]).unwrap(), s34);
    assert_eq!(op.infer_shape(&[&s34, &s34]).unwrap(), s34);
    match op.infer_shape(&[&s34, &s22]) {
        Err(Error::ShapeMismatch { lhs, rhs }) => {
            assert_eq!(lhs, s34);
            assert_eq!(rhs, s22);
        }
        other => panic!("expected a shape mismatch, got {other:?}"),
    }
}

#[test]
fn test_incr_into_scalar_accumulator_reroutes() {
    let t = Value::tensor(vec![1.0, 2.0, 3.0], vec![3]).unwrap();
    let ops = [
        BinaryOperation::for_values(BinaryOpKind::Add, &Value::from(1.0), &Value::from(2.0)).unwrap(),
        BinaryOperation::for_values(BinaryOpKind::Mul, &t, &Value::from(2.0)).unwrap(),
    ];
    let inputs = [
        [Value::from(1.0), Value::from(2.0)],
        [t.clone(), Value::from(2.0)],
    ];
    let expected = [
        Value::from(13.0),
        Value::tensor(vec![12.0, 14.0, 16.0], vec![3]).unwrap(),
    ];

    for ((op, inputs), expected) in ops.iter().zip(inputs.iter()).zip(expected) {
        let mut acc = Value::from(10.0);
        let out = op.accumulating_forward(&mut acc, inputs).unwrap();
        assert_eq!(out, Accumulation::Rerouted(expected));
        assert_eq!(acc, Value::from(10.0));
    }
}

// ============================================================================
// Differentiation rules
// ============================================================================

#[test]
fn test_add_and_sub_symbolic() {
    let x = Node::var("x", Value::from(1.0));
    let y = Node::var("y", Value::from(2.0));
    let gz = Node::constant(Value::from(1.0));

    let add = expr::add(&x, &y).unwrap();
    let grads = add.op().unwrap().symbolic_differentiate(&[x.clone(), y.clone()], &add, &gz).unwrap();
    assert_eq!(grads[0].id(), gz.id());
    assert_eq!(grads[1].id(), gz.id());

    let sub = expr::sub(&x, &y).unwrap();
    let grads = sub.op().unwrap().symbolic_differentiate(&[x.clone(), y.clone()], &sub, &gz).unwrap();
    assert_eq!(grads[0].id(), gz.id());
    assert_eq!(grads[1].op().unwrap().to_string(), "neg");
    assert_eq!(grads[1].children()[0].id(), gz.id());
}

#[test]
fn test_mul_numeric() {
    let x = Node::var("x", Value::from(2.0));
    let y = Node::var("y", Value::from(3.0));
    let z = expr::hadamard_prod(&x, &y).unwrap();
    z.set_derivative(Value::from(1.0)).unwrap();
    z.op().unwrap().numeric_differentiate(&[x.clone(), y.clone()], &z).unwrap();
    assert_eq!(x.derivative().unwrap(), Value::from(3.0));
    assert_eq!(y.derivative().unwrap(), Value::from(2.0));
}

#[test]
fn test_sum_gradient_repeats_upstream() {
    let x = Node::var("x", Value::tensor(vec![1.0; 6], vec![2, 3]).unwrap());
    let z = expr::sum(&x, &[1]).unwrap();
    assert_eq!(z.shape(), &Shape::new(vec![2]));

    let upstream = Value::tensor(vec![0.5, -2.0], vec![2]).unwrap();
    let gz = Node::constant(upstream.clone());
    let gx = z.op().unwrap().symbolic_differentiate(&[x.clone()], &z, &gz).unwrap();
    let g = gx[0].primal().unwrap();
    assert_eq!(g.shape(), Shape::new(vec![2, 3]));

    let row_sums = expr::sum(&Node::constant(g), &[1]).unwrap().primal().unwrap();
    let expected: Vec<f64> = upstream.to_f64_vec().iter().map(|v| v * 3.0).collect();
    assert_eq!(row_sums.to_f64_vec(), expected);
    for (row, up) in gx[0].primal().unwrap().to_f64_vec().chunks(3).zip(upstream.to_f64_vec()) {
        assert!(row.iter().all(|&v| v == up));
    }
}

#[test]
fn test_max_shape_and_symbolic_without_forward() {
    let x = Node::placeholder("x", Dtype::Float64, Shape::new(vec![2, 3]));
    let z = expr::max(&x, &[1]).unwrap();
    assert_eq!(z.shape(), &Shape::new(vec![2]));

    let gz = Node::placeholder("gz", Dtype::Float64, Shape::new(vec![2]));
    let gx = z.op().unwrap().symbolic_differentiate(&[x.clone()], &z, &gz).unwrap();
    assert_eq!(gx[0].shape(), x.shape());

    let op = ReductionOperation::new(ReductionKind::Max, &[1], &Shape::new(vec![2, 3])).unwrap();
    let v = Value::tensor(vec![0.0; 6], vec![2, 3]).unwrap();
    assert!(matches!(op.forward(&[v.clone()]), Err(Error::NotImplemented { .. })));

    // a bound input still builds, and its gradient has the input's shape
    let bound = Node::var("b", v);
    let z = expr::max(&bound, &[1]).unwrap();
    assert!(!z.is_bound());
    let gz = Node::constant(Value::tensor(vec![1.0, 1.0], vec![2]).unwrap());
    let gb = z.op().unwrap().symbolic_differentiate(&[bound.clone()], &z, &gz).unwrap();
    assert_eq!(gb[0].shape(), bound.shape());
}

#[test]
fn test_pow_and_comparison_differentiation_fail() {
    let x = Node::var("x", Value::from(2.0));
    let y = Node::var("y", Value::from(3.0));
    let gz = Node::constant(Value::from(1.0));

    let pow = expr::pow(&x, &y).unwrap();
    let op = pow.op().unwrap();
    assert!(matches!(
        op.symbolic_differentiate(&[x.clone(), y.clone()], &pow, &gz),
        Err(Error::NotImplemented { .. })
    ));
    assert!(matches!(
        op.numeric_differentiate(&[x.clone(), y.clone()], &pow),
        Err(Error::NotImplemented { .. })
    ));

    let gt = expr::compare(BinaryOpKind::Gt, &x, &y, true).unwrap();
    let op = gt.op().unwrap();
    assert!(matches!(
        op.symbolic_differentiate(&[x.clone(), y.clone()], &gt, &gz),
        Err(Error::NotDifferentiable { .. })
    ));
    assert!(matches!(
        op.numeric_differentiate(&[x.clone(), y.clone()], &gt),
        Err(Error::NotDifferentiable { .. })
    ));
}

// ============================================================================
// Graph plumbing
// ============================================================================

#[test]
fn test_apply_checks_arity() {
    let x = Node::var("x", Value::from(1.0));
    let op = BinaryOperation::new(
        BinaryOpKind::Add,
        &Type::Dtype(Dtype::Float64),
        &Type::Dtype(Dtype::Float64),
    )
    .unwrap();
    let err = Node::apply(Arc::new(op), vec![x]).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 2, got: 1, .. }));
}

#[test]
fn test_ops_are_shareable_across_threads() {
    let op: Arc<dyn Op> = Arc::new(
        BinaryOperation::new(
            BinaryOpKind::Mul,
            &Type::tensor(1, Dtype::Float64),
            &Type::Dtype(Dtype::Float64),
        )
        .unwrap(),
    );
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let op = Arc::clone(&op);
            std::thread::spawn(move || {
                let t = Value::tensor(vec![1.0, 2.0], vec![2]).unwrap();
                op.forward(&[t, Value::from(i as f64)]).unwrap().to_f64_vec()
            })
        })
        .collect();
    for (i, h) in handles.into_iter().enumerate() {
        let i = i as f64;
        assert_eq!(h.join().unwrap(), vec![i, 2.0 * i]);
    }
}
