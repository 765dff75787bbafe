//! # ag_tensor - Dense Storage and CPU Kernels
//!
//! Storage and compute layer underneath the `ag_ops` operator engine.
//!
//! ## Overview
//!
//! - [`Shape`] and [`Strides`] - tensor shape and memory layout
//! - [`Dense`] / [`View`] - owned strided buffers and borrowed views over them
//! - [`Dtype`] / [`Element`] - runtime element tags and the typed bridge to them
//! - [`Value`] - a bare [`Scalar`] or a dtype-tagged [`Tensor`]
//! - [`kernels`] - elementwise zips, reductions, repeat, matmul/matvec/inner/outer
//!
//! ## Example
//!
//! ```
//! use ag_tensor::{kernels, Dense, Shape};
//!
//! let a = Dense::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2])).unwrap();
//! let b = Dense::new(vec![5.0, 6.0, 7.0, 8.0], Shape::new(vec![2, 2])).unwrap();
//! let c = kernels::matmul(&a.view(), &b.view()).unwrap();
//! assert_eq!(c.into_vec(), vec![19.0, 22.0, 43.0, 50.0]);
//! ```

pub mod dense;
pub mod dtype;
pub mod error;
pub mod kernels;
pub mod shape;
pub mod value;

pub use dense::{Dense, View};
pub use dtype::{Dtype, Element};
pub use error::{Result, TensorError};
pub use kernels::Operand;
pub use shape::{Shape, Strides, TensorIndices};
pub use value::{Scalar, Tensor, Value};
