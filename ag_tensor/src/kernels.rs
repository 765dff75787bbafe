//! CPU kernels.
//!
//! Elementwise kernels come in four write modes matching the engine's
//! evaluation strategies: allocate ([`zip_map`]), overwrite an operand
//! ([`zip_overwrite`]), write into a destination ([`zip_write`]) and accumulate
//! into a destination ([`zip_accumulate`]). Operands are either a bare scalar,
//! broadcast to the other side, or a tensor view; two tensors must agree in
//! shape exactly.

use std::borrow::Cow;
use std::ops::AddAssign;

use crate::dense::{Dense, View};
use crate::dtype::Element;
use crate::error::{Result, TensorError};
use crate::shape::{Shape, TensorIndices};

/// One side of an elementwise kernel.
#[derive(Clone, Debug)]
pub enum Operand<'a, T> {
    Scalar(T),
    Tensor(View<'a, T>),
}

impl<T: Copy> Operand<'_, T> {
    pub fn shape(&self) -> Shape {
        match self {
            Operand::Scalar(_) => Shape::scalar(),
            Operand::Tensor(v) => v.shape().clone(),
        }
    }
}

/// Row-major elements of an operand, or the broadcast scalar.
enum Elems<'a, T: Clone> {
    Splat(T),
    Slice(Cow<'a, [T]>),
}

impl<T: Copy> Elems<'_, T> {
    #[inline]
    fn at(&self, i: usize) -> T {
        match self {
            Elems::Splat(v) => *v,
            Elems::Slice(s) => s[i],
        }
    }
}

fn elems<'a, T: Copy>(op: &Operand<'a, T>) -> Elems<'a, T> {
    match op {
        Operand::Scalar(v) => Elems::Splat(*v),
        Operand::Tensor(v) => Elems::Slice(v.materialize()),
    }
}

/// Result shape of an elementwise pair: the tensor side wins, two tensors must match.
pub fn result_shape<T: Copy>(a: &Operand<'_, T>, b: &Operand<'_, T>) -> Result<Shape> {
    match (a, b) {
        (Operand::Tensor(x), Operand::Tensor(y)) => {
            if x.shape() != y.shape() {
                return Err(TensorError::ShapeMismatch {
                    lhs: x.shape().clone(),
                    rhs: y.shape().clone(),
                });
            }
            Ok(x.shape().clone())
        }
        (Operand::Tensor(x), Operand::Scalar(_)) => Ok(x.shape().clone()),
        (Operand::Scalar(_), Operand::Tensor(y)) => Ok(y.shape().clone()),
        (Operand::Scalar(_), Operand::Scalar(_)) => Ok(Shape::scalar()),
    }
}

fn check_extent(dst: &Shape, result: &Shape) -> Result<()> {
    if dst.numel() != result.numel() {
        return Err(TensorError::ShapeMismatch {
            lhs: dst.clone(),
            rhs: result.clone(),
        });
    }
    Ok(())
}

// === Elementwise ===

/// `out[i] = f(a[i], b[i])` into a fresh buffer.
pub fn zip_map<T: Copy, U: Copy>(
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    f: impl Fn(T, T) -> U,
) -> Result<Dense<U>> {
    let shape = result_shape(a, b)?;
    let (ea, eb) = (elems(a), elems(b));
    let data = (0..shape.numel()).map(|i| f(ea.at(i), eb.at(i))).collect();
    Dense::new(data, shape)
}

/// `dst[i] = f(dst[i], other[i])` (or `f(other[i], dst[i])` when `dst_is_left` is false).
pub fn zip_overwrite<T: Copy>(
    dst: &mut Dense<T>,
    dst_is_left: bool,
    other: &Operand<'_, T>,
    f: impl Fn(T, T) -> T,
) -> Result<()> {
    if let Operand::Tensor(v) = other {
        if v.shape() != dst.shape() {
            return Err(TensorError::ShapeMismatch {
                lhs: dst.shape().clone(),
                rhs: v.shape().clone(),
            });
        }
    }
    let eo = elems(other);
    for (i, d) in dst.data_mut().iter_mut().enumerate() {
        *d = if dst_is_left {
            f(*d, eo.at(i))
        } else {
            f(eo.at(i), *d)
        };
    }
    Ok(())
}

/// `dst[i] = f(a[i], b[i])`; `dst` keeps its shape and must hold as many elements.
pub fn zip_write<T: Copy>(
    dst: &mut Dense<T>,
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    f: impl Fn(T, T) -> T,
) -> Result<()> {
    let shape = result_shape(a, b)?;
    check_extent(dst.shape(), &shape)?;
    let (ea, eb) = (elems(a), elems(b));
    for (i, d) in dst.data_mut().iter_mut().enumerate() {
        *d = f(ea.at(i), eb.at(i));
    }
    Ok(())
}

/// `dst[i] += f(a[i], b[i])`; `dst` keeps its shape and must hold as many elements.
pub fn zip_accumulate<T: Copy + AddAssign>(
    dst: &mut Dense<T>,
    a: &Operand<'_, T>,
    b: &Operand<'_, T>,
    f: impl Fn(T, T) -> T,
) -> Result<()> {
    let shape = result_shape(a, b)?;
    check_extent(dst.shape(), &shape)?;
    let (ea, eb) = (elems(a), elems(b));
    for (i, d) in dst.data_mut().iter_mut().enumerate() {
        *d += f(ea.at(i), eb.at(i));
    }
    Ok(())
}

/// `dst[i] = src[i]`, matching element counts.
pub fn assign<T: Copy>(dst: &mut Dense<T>, src: &Dense<T>) -> Result<()> {
    check_extent(dst.shape(), src.shape())?;
    let src = src.materialize();
    dst.data_mut().copy_from_slice(&src);
    Ok(())
}

/// `dst[i] += src[i]`, matching element counts.
pub fn add_assign<T: Copy + AddAssign>(dst: &mut Dense<T>, src: &Dense<T>) -> Result<()> {
    check_extent(dst.shape(), src.shape())?;
    let src = src.materialize();
    for (d, &s) in dst.data_mut().iter_mut().zip(src.iter()) {
        *d += s;
    }
    Ok(())
}

// === Reductions ===

/// Sum over `along` (empty = every axis); reduced axes are dropped from the result.
pub fn sum_along<T: Element>(x: &View<'_, T>, along: &[usize]) -> Result<Dense<T>> {
    let ndim = x.shape().ndim();
    for &axis in along {
        if axis >= ndim {
            return Err(TensorError::InvalidAxis { axis, ndim });
        }
    }
    let reduce: Vec<usize> = if along.is_empty() {
        (0..ndim).collect()
    } else {
        along.to_vec()
    };

    let out_shape = x.shape().without_axes(&reduce);
    let out_strides = out_shape.contiguous_strides();
    let mut data = vec![T::zero(); out_shape.numel()];

    for idx in TensorIndices::new(x.shape()) {
        let out_idx: Vec<usize> = idx
            .iter()
            .enumerate()
            .filter(|(i, _)| !reduce.contains(i))
            .map(|(_, &v)| v)
            .collect();
        data[out_strides.index(&out_idx)] += x.get(&idx);
    }

    Dense::new(data, out_shape)
}

/// Sum of every element.
pub fn sum_all<T: Element>(x: &View<'_, T>) -> T {
    x.materialize().iter().fold(T::zero(), |acc, &v| acc + v)
}

/// Repeat every slice along `axis` `n` times, so that axis grows by a factor of `n`.
pub fn repeat<T: Copy>(x: &Dense<T>, axis: usize, n: usize) -> Result<Dense<T>> {
    let ndim = x.shape().ndim();
    if axis >= ndim {
        return Err(TensorError::InvalidAxis { axis, ndim });
    }
    let mut dims = x.shape().dims().to_vec();
    dims[axis] *= n;
    let out_shape = Shape::new(dims);

    let src = x.view();
    let data = TensorIndices::new(&out_shape)
        .map(|mut idx| {
            idx[axis] /= n;
            src.get(&idx)
        })
        .collect();
    Dense::new(data, out_shape)
}

// === Linear algebra ===

fn expect_rank<T: Copy>(op: &'static str, v: &View<'_, T>, rank: usize) -> Result<()> {
    if v.shape().ndim() != rank {
        return Err(TensorError::RankMismatch {
            op,
            expected: rank,
            got: v.shape().clone(),
        });
    }
    Ok(())
}

/// Flatten a vector-like view (`(n,)`, `(n, 1)` or `(1, n)`) into its elements.
fn vector_elems<'a, T: Copy>(op: &'static str, v: &View<'a, T>) -> Result<Cow<'a, [T]>> {
    if !v.shape().is_vector() {
        return Err(TensorError::RankMismatch {
            op,
            expected: 1,
            got: v.shape().clone(),
        });
    }
    Ok(v.materialize())
}

/// `(m, k) @ (k, n) -> (m, n)`
pub fn matmul<T: Element>(a: &View<'_, T>, b: &View<'_, T>) -> Result<Dense<T>> {
    expect_rank("matmul", a, 2)?;
    expect_rank("matmul", b, 2)?;
    let (m, k) = (a.shape().dim(0), a.shape().dim(1));
    let n = b.shape().dim(1);
    if b.shape().dim(0) != k {
        return Err(TensorError::ShapeMismatch {
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }

    let mut data = vec![T::zero(); m * n];
    for i in 0..m {
        for p in 0..k {
            let a_ip = a.at2(i, p);
            for j in 0..n {
                data[i * n + j] += a_ip * b.at2(p, j);
            }
        }
    }
    Dense::new(data, Shape::new(vec![m, n]))
}

/// `(m, k) @ (k,) -> (m,)`; the vector may also be a `(k, 1)` column.
pub fn matvec<T: Element>(a: &View<'_, T>, v: &View<'_, T>) -> Result<Dense<T>> {
    expect_rank("matvec", a, 2)?;
    let x = vector_elems("matvec", v)?;
    let (m, k) = (a.shape().dim(0), a.shape().dim(1));
    if x.len() != k {
        return Err(TensorError::ShapeMismatch {
            lhs: a.shape().clone(),
            rhs: v.shape().clone(),
        });
    }

    let data = (0..m)
        .map(|i| (0..k).fold(T::zero(), |acc, j| acc + a.at2(i, j) * x[j]))
        .collect();
    Dense::new(data, Shape::new(vec![m]))
}

/// Inner product of two equal-length vectors.
pub fn inner<T: Element>(a: &View<'_, T>, b: &View<'_, T>) -> Result<T> {
    let x = vector_elems("inner", a)?;
    let y = vector_elems("inner", b)?;
    if x.len() != y.len() {
        return Err(TensorError::ShapeMismatch {
            lhs: a.shape().clone(),
            rhs: b.shape().clone(),
        });
    }
    Ok(x.iter().zip(y.iter()).fold(T::zero(), |acc, (&p, &q)| acc + p * q))
}

/// Outer product `(m,) x (n,) -> (m, n)`; operands are flattened first.
pub fn outer<T: Element>(a: &View<'_, T>, b: &View<'_, T>) -> Result<Dense<T>> {
    let x = a.materialize();
    let y = b.materialize();
    let data = x
        .iter()
        .flat_map(|&p| y.iter().map(move |&q| p * q))
        .collect();
    Dense::new(data, Shape::new(vec![x.len(), y.len()]))
}
