//! Rules for the linear-algebra products.

use ag_tensor::Value;

use crate::catalog::{BinaryOpKind, LinAlgKind};
use crate::error::Result;
use crate::expr;
use crate::linalg::LinAlgOperation;
use crate::node::Node;

use super::{incr_into, incr_with};

#[derive(Debug, Clone, Copy)]
enum Term {
    A,
    B,
    G,
}

fn pick<T: Clone>(term: Term, a: &T, b: &T, g: &T) -> T {
    match term {
        Term::A => a.clone(),
        Term::B => b.clone(),
        Term::G => g.clone(),
    }
}

/// `(left, right, transpose_left, transpose_right)` producing dA and dB for
/// `C = op(A) · op(B)`.
fn matmul_rules(ta: bool, tb: bool) -> [(Term, Term, bool, bool); 2] {
    use Term::*;
    match (ta, tb) {
        // dA = G·Bᵀ, dB = Aᵀ·G
        (false, false) => [(G, B, false, true), (A, G, true, false)],
        // dA = B·Gᵀ, dB = A·G
        (true, false) => [(B, G, false, true), (A, G, false, false)],
        // dA = G·B, dB = Gᵀ·A
        (false, true) => [(G, B, false, false), (G, A, true, false)],
        // dA = Bᵀ·Gᵀ, dB = Gᵀ·Aᵀ
        (true, true) => [(B, G, true, true), (G, A, true, true)],
    }
}

/// Reshape `g` to `like`'s shape when a vector came back as a column.
fn conform(g: Node, like: &Node) -> Result<Node> {
    if g.shape() == like.shape() {
        Ok(g)
    } else {
        expr::reshape(&g, like.shape())
    }
}

/// Gradients `[ga, gb]` of `z = op(a, b)` given `g`.
pub fn symbolic(op: &LinAlgOperation, a: &Node, b: &Node, _z: &Node, g: &Node) -> Result<Vec<Node>> {
    let (ta, tb) = (op.transpose_a(), op.transpose_b());
    let grads = match op.kind() {
        LinAlgKind::MatMul => {
            let mut out = Vec::with_capacity(2);
            for (l, r, tl, tr) in matmul_rules(ta, tb) {
                out.push(expr::linalg(LinAlgKind::MatMul, tl, tr, &pick(l, a, b, g), &pick(r, a, b, g))?);
            }
            out
        }
        LinAlgKind::MatVecMul => {
            let (ga, gb) = if ta {
                // z = Aᵀv: dA = v⊗G, dv = A·G
                (expr::outer(b, g)?, expr::matvec(a, g)?)
            } else {
                // z = Av: dA = G⊗v, dv = Aᵀ·G
                (expr::outer(g, b)?, expr::linalg(LinAlgKind::MatVecMul, true, false, a, g)?)
            };
            vec![ga, conform(gb, b)?]
        }
        // z = a·b: da = G·b, db = G·a
        LinAlgKind::VecDot => vec![
            conform(expr::hadamard_prod(b, g)?, a)?,
            conform(expr::hadamard_prod(a, g)?, b)?,
        ],
        // z = a⊗b: da = G·b, db = Gᵀ·a
        LinAlgKind::OuterProd => vec![
            conform(expr::matvec(g, b)?, a)?,
            conform(expr::linalg(LinAlgKind::MatVecMul, true, false, g, a)?, b)?,
        ],
    };
    Ok(grads)
}

/// Push `z.d` into `a.d` and `b.d` for `z = op(a, b)`.
pub fn numeric(op: &LinAlgOperation, a: &Node, b: &Node, z: &Node) -> Result<()> {
    let g = z.derivative()?;
    let (av, bv) = (a.primal()?, b.primal()?);
    let product = |kind, tl, tr| LinAlgOperation::new(kind).transposed(tl, tr);
    let incr = |node: &Node, op: LinAlgOperation, l: &Value, r: &Value| {
        incr_with(node, &op, &[l.clone(), r.clone()])
    };

    match op.kind() {
        LinAlgKind::MatMul => {
            let [(l, r, tl, tr), (l2, r2, tl2, tr2)] = matmul_rules(op.transpose_a(), op.transpose_b());
            let mm = |tl, tr| product(LinAlgKind::MatMul, tl, tr);
            incr(a, mm(tl, tr), &pick(l, &av, &bv, &g), &pick(r, &av, &bv, &g))?;
            incr(b, mm(tl2, tr2), &pick(l2, &av, &bv, &g), &pick(r2, &av, &bv, &g))
        }
        LinAlgKind::MatVecMul => {
            let outer = product(LinAlgKind::OuterProd, false, false);
            if op.transpose_a() {
                incr(a, outer, &bv, &g)?;
                incr(b, product(LinAlgKind::MatVecMul, false, false), &av, &g)
            } else {
                incr(a, outer, &g, &bv)?;
                incr(b, product(LinAlgKind::MatVecMul, true, false), &av, &g)
            }
        }
        LinAlgKind::VecDot => {
            incr_into(a, BinaryOpKind::Mul, &bv, &g)?;
            incr_into(b, BinaryOpKind::Mul, &av, &g)
        }
        LinAlgKind::OuterProd => {
            incr(a, product(LinAlgKind::MatVecMul, false, false), &g, &bv)?;
            incr(b, product(LinAlgKind::MatVecMul, true, false), &g, &av)
        }
    }
}
