//! Kernel registries keyed by `(Dtype, kind)`.
//!
//! Built once on first use and never mutated afterwards. A missing entry is
//! reported as `NotImplemented` naming the dtype and the kind.

use ag_tensor::{Dtype, Element};
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::catalog::{BinaryOpKind, UnaryOpKind};
use crate::error::{Error, Result};

/// Typed arithmetic kernel.
#[derive(Clone, Copy)]
pub enum ArithFn {
    F32(fn(f32, f32) -> f32),
    F64(fn(f64, f64) -> f64),
}

/// Typed comparison kernel.
#[derive(Clone, Copy)]
pub enum CmpFn {
    F32(fn(f32, f32) -> bool),
    F64(fn(f64, f64) -> bool),
}

/// Typed unary kernel.
#[derive(Clone, Copy)]
pub enum UnaryFn {
    F32(fn(f32) -> f32),
    F64(fn(f64) -> f64),
}

/// Element types with registered kernels.
pub trait Numeric: Element {
    fn pick_arith(f: ArithFn) -> Option<fn(Self, Self) -> Self>;
    fn pick_cmp(f: CmpFn) -> Option<fn(Self, Self) -> bool>;
    fn pick_unary(f: UnaryFn) -> Option<fn(Self) -> Self>;
}

impl Numeric for f32 {
    fn pick_arith(f: ArithFn) -> Option<fn(f32, f32) -> f32> {
        match f {
            ArithFn::F32(f) => Some(f),
            _ => None,
        }
    }

    fn pick_cmp(f: CmpFn) -> Option<fn(f32, f32) -> bool> {
        match f {
            CmpFn::F32(f) => Some(f),
            _ => None,
        }
    }

    fn pick_unary(f: UnaryFn) -> Option<fn(f32) -> f32> {
        match f {
            UnaryFn::F32(f) => Some(f),
            _ => None,
        }
    }
}

impl Numeric for f64 {
    fn pick_arith(f: ArithFn) -> Option<fn(f64, f64) -> f64> {
        match f {
            ArithFn::F64(f) => Some(f),
            _ => None,
        }
    }

    fn pick_cmp(f: CmpFn) -> Option<fn(f64, f64) -> bool> {
        match f {
            CmpFn::F64(f) => Some(f),
            _ => None,
        }
    }

    fn pick_unary(f: UnaryFn) -> Option<fn(f64) -> f64> {
        match f {
            UnaryFn::F64(f) => Some(f),
            _ => None,
        }
    }
}

// === Kernel bodies ===

fn add<T: Element>(a: T, b: T) -> T {
    a + b
}

fn sub<T: Element>(a: T, b: T) -> T {
    a - b
}

fn mul<T: Element>(a: T, b: T) -> T {
    a * b
}

fn div<T: Element>(a: T, b: T) -> T {
    a / b
}

fn pow<T: Element>(a: T, b: T) -> T {
    a.powf(b)
}

fn lt<T: Element>(a: T, b: T) -> bool {
    a < b
}

fn gt<T: Element>(a: T, b: T) -> bool {
    a > b
}

fn lte<T: Element>(a: T, b: T) -> bool {
    a <= b
}

fn gte<T: Element>(a: T, b: T) -> bool {
    a >= b
}

fn eq<T: Element>(a: T, b: T) -> bool {
    a == b
}

fn ne<T: Element>(a: T, b: T) -> bool {
    a != b
}

fn neg<T: Element>(x: T) -> T {
    -x
}

fn abs<T: Element>(x: T) -> T {
    x.abs()
}

// -1, 0 or 1
fn sign<T: Element>(x: T) -> T {
    if x > T::zero() {
        T::one()
    } else if x < T::zero() {
        -T::one()
    } else {
        T::zero()
    }
}

fn ceil<T: Element>(x: T) -> T {
    x.ceil()
}

fn floor<T: Element>(x: T) -> T {
    x.floor()
}

fn sin<T: Element>(x: T) -> T {
    x.sin()
}

fn cos<T: Element>(x: T) -> T {
    x.cos()
}

fn exp<T: Element>(x: T) -> T {
    x.exp()
}

fn ln<T: Element>(x: T) -> T {
    x.ln()
}

fn log2<T: Element>(x: T) -> T {
    x.log2()
}

fn sqrt<T: Element>(x: T) -> T {
    x.sqrt()
}

fn square<T: Element>(x: T) -> T {
    x * x
}

fn cube<T: Element>(x: T) -> T {
    x * x * x
}

fn inverse<T: Element>(x: T) -> T {
    x.recip()
}

fn tanh<T: Element>(x: T) -> T {
    x.tanh()
}

fn sigmoid<T: Element>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

fn arith_body<T: Element>(kind: BinaryOpKind) -> Option<fn(T, T) -> T> {
    let f: fn(T, T) -> T = match kind {
        BinaryOpKind::Add => add::<T>,
        BinaryOpKind::Sub => sub::<T>,
        BinaryOpKind::Mul => mul::<T>,
        BinaryOpKind::Div => div::<T>,
        BinaryOpKind::Pow => pow::<T>,
        _ => return None,
    };
    Some(f)
}

fn cmp_body<T: Element>(kind: BinaryOpKind) -> Option<fn(T, T) -> bool> {
    let f: fn(T, T) -> bool = match kind {
        BinaryOpKind::Lt => lt::<T>,
        BinaryOpKind::Gt => gt::<T>,
        BinaryOpKind::Lte => lte::<T>,
        BinaryOpKind::Gte => gte::<T>,
        BinaryOpKind::Eq => eq::<T>,
        BinaryOpKind::Ne => ne::<T>,
        _ => return None,
    };
    Some(f)
}

fn unary_body<T: Element>(kind: UnaryOpKind) -> fn(T) -> T {
    match kind {
        UnaryOpKind::Neg => neg::<T>,
        UnaryOpKind::Abs => abs::<T>,
        UnaryOpKind::Sign => sign::<T>,
        UnaryOpKind::Ceil => ceil::<T>,
        UnaryOpKind::Floor => floor::<T>,
        UnaryOpKind::Sin => sin::<T>,
        UnaryOpKind::Cos => cos::<T>,
        UnaryOpKind::Exp => exp::<T>,
        UnaryOpKind::Ln => ln::<T>,
        UnaryOpKind::Log2 => log2::<T>,
        UnaryOpKind::Sqrt => sqrt::<T>,
        UnaryOpKind::Square => square::<T>,
        UnaryOpKind::Cube => cube::<T>,
        UnaryOpKind::Inverse => inverse::<T>,
        UnaryOpKind::Tanh => tanh::<T>,
        UnaryOpKind::Sigmoid => sigmoid::<T>,
    }
}

fn build_arith() -> FxHashMap<(Dtype, BinaryOpKind), ArithFn> {
    let mut table = FxHashMap::default();
    for kind in BinaryOpKind::ALL {
        if let Some(f) = arith_body::<f32>(kind) {
            table.insert((Dtype::Float32, kind), ArithFn::F32(f));
        }
        if let Some(f) = arith_body::<f64>(kind) {
            table.insert((Dtype::Float64, kind), ArithFn::F64(f));
        }
    }
    table
}

fn build_cmp() -> FxHashMap<(Dtype, BinaryOpKind), CmpFn> {
    let mut table = FxHashMap::default();
    for kind in BinaryOpKind::ALL {
        if let Some(f) = cmp_body::<f32>(kind) {
            table.insert((Dtype::Float32, kind), CmpFn::F32(f));
        }
        if let Some(f) = cmp_body::<f64>(kind) {
            table.insert((Dtype::Float64, kind), CmpFn::F64(f));
        }
    }
    table
}

fn build_unary() -> FxHashMap<(Dtype, UnaryOpKind), UnaryFn> {
    let mut table = FxHashMap::default();
    for kind in UnaryOpKind::ALL {
        table.insert((Dtype::Float32, kind), UnaryFn::F32(unary_body::<f32>(kind)));
        table.insert((Dtype::Float64, kind), UnaryFn::F64(unary_body::<f64>(kind)));
    }
    table
}

lazy_static! {
    static ref ARITH: FxHashMap<(Dtype, BinaryOpKind), ArithFn> = build_arith();
    static ref CMP: FxHashMap<(Dtype, BinaryOpKind), CmpFn> = build_cmp();
    static ref UNARY: FxHashMap<(Dtype, UnaryOpKind), UnaryFn> = build_unary();
}

fn missing(dtype: Dtype, kind: impl std::fmt::Debug) -> Error {
    Error::not_implemented(format!("{:?}", kind), dtype)
}

/// Arithmetic kernel for `(T::DTYPE, kind)`.
pub fn arith<T: Numeric>(kind: BinaryOpKind) -> Result<fn(T, T) -> T> {
    ARITH
        .get(&(T::DTYPE, kind))
        .and_then(|f| T::pick_arith(*f))
        .ok_or_else(|| missing(T::DTYPE, kind))
}

/// Comparison kernel for `(T::DTYPE, kind)`.
pub fn cmp<T: Numeric>(kind: BinaryOpKind) -> Result<fn(T, T) -> bool> {
    CMP.get(&(T::DTYPE, kind))
        .and_then(|f| T::pick_cmp(*f))
        .ok_or_else(|| missing(T::DTYPE, kind))
}

/// Unary kernel for `(T::DTYPE, kind)`.
pub fn unary<T: Numeric>(kind: UnaryOpKind) -> Result<fn(T) -> T> {
    UNARY
        .get(&(T::DTYPE, kind))
        .and_then(|f| T::pick_unary(*f))
        .ok_or_else(|| missing(T::DTYPE, kind))
}

/// Whether any binary kernel is registered for `(dtype, kind)`.
pub fn has_binary(dtype: Dtype, kind: BinaryOpKind) -> bool {
    ARITH.contains_key(&(dtype, kind)) || CMP.contains_key(&(dtype, kind))
}
