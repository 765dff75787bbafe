//! Dense strided storage.
//!
//! A [`Dense`] owns a flat buffer plus a shape and strides. Transposition is a
//! view change (shape and strides reversed) and never moves data; kernels read
//! through [`View`]s and call [`View::materialize`] when they need row-major order.

use std::borrow::Cow;

use crate::error::{Result, TensorError};
use crate::shape::{Shape, Strides, TensorIndices};

/// Owned n-dimensional buffer.
#[derive(Clone, Debug)]
pub struct Dense<T> {
    data: Vec<T>,
    shape: Shape,
    strides: Strides,
}

impl<T: Copy> Dense<T> {
    /// Create a new tensor from row-major data and shape.
    pub fn new(data: Vec<T>, shape: Shape) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(TensorError::LengthMismatch {
                len: data.len(),
                shape,
            });
        }
        let strides = shape.contiguous_strides();
        Ok(Dense { data, shape, strides })
    }

    /// A tensor of the given shape filled with `value`.
    pub fn full(shape: Shape, value: T) -> Self {
        let strides = shape.contiguous_strides();
        Dense {
            data: vec![value; shape.numel()],
            shape,
            strides,
        }
    }

    /// A 0-dimensional tensor holding one value.
    pub fn scalar(value: T) -> Self {
        Self::full(Shape::scalar(), value)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_scalar()
    }

    /// Whether the buffer is laid out row-major for the current shape.
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides()
    }

    /// Borrow as a strided view.
    pub fn view(&self) -> View<'_, T> {
        View {
            data: &self.data,
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }

    /// Row-major elements, borrowed when the layout allows it.
    pub fn materialize(&self) -> Cow<'_, [T]> {
        self.view().materialize()
    }

    /// Toggle the transpose of this view by reversing its axes.
    ///
    /// Calling it twice restores the original view. No data is moved.
    pub fn transpose_in_place(&mut self) {
        self.shape = self.shape.reversed();
        self.strides = self.strides.reversed();
    }

    /// Rewrite the buffer so that it is row-major for the current shape.
    pub fn make_contiguous(&mut self) {
        if self.is_contiguous() {
            return;
        }
        self.data = self.view().materialize().into_owned();
        self.strides = self.shape.contiguous_strides();
    }

    /// Mutable row-major elements.
    pub fn data_mut(&mut self) -> &mut [T] {
        self.make_contiguous();
        &mut self.data
    }

    /// Consume into row-major elements.
    pub fn into_vec(mut self) -> Vec<T> {
        self.make_contiguous();
        self.data
    }

    /// Same elements, new shape with identical element count.
    pub fn reshape(mut self, shape: Shape) -> Result<Self> {
        if shape.numel() != self.numel() {
            return Err(TensorError::ShapeMismatch {
                lhs: self.shape,
                rhs: shape,
            });
        }
        self.make_contiguous();
        self.strides = shape.contiguous_strides();
        self.shape = shape;
        Ok(self)
    }

    /// Insert a unit axis at `axis`.
    pub fn unsqueeze(self, axis: usize) -> Result<Self> {
        if axis > self.shape.ndim() {
            return Err(TensorError::InvalidAxis {
                axis,
                ndim: self.shape.ndim(),
            });
        }
        let mut dims = self.shape.dims().to_vec();
        dims.insert(axis, 1);
        self.reshape(Shape::new(dims))
    }

    /// The single element of a one-element tensor.
    pub fn scalar_value(&self) -> Option<T> {
        if self.numel() == 1 {
            Some(self.view().materialize()[0])
        } else {
            None
        }
    }

    /// Elementwise map into a new contiguous tensor.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Dense<U> {
        let data = self.materialize().iter().map(|&v| f(v)).collect();
        Dense {
            data,
            shape: self.shape.clone(),
            strides: self.shape.contiguous_strides(),
        }
    }

    /// Elementwise map that reuses this buffer.
    pub fn map_in_place(&mut self, f: impl Fn(T) -> T) {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
    }
}

impl<T: Copy + PartialEq> PartialEq for Dense<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.materialize() == other.materialize()
    }
}

/// Borrowed strided view over a [`Dense`] buffer.
#[derive(Clone, Debug)]
pub struct View<'a, T> {
    data: &'a [T],
    shape: Shape,
    strides: Strides,
}

impl<'a, T: Copy> View<'a, T> {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// The transposed view (axes reversed).
    pub fn t(self) -> Self {
        View {
            data: self.data,
            shape: self.shape.reversed(),
            strides: self.strides.reversed(),
        }
    }

    /// Element at a multi-dimensional index.
    #[inline]
    pub fn get(&self, idx: &[usize]) -> T {
        self.data[self.strides.index(idx)]
    }

    /// Element `(i, j)` of a rank-2 view.
    #[inline]
    pub fn at2(&self, i: usize, j: usize) -> T {
        self.data[i * self.strides.as_slice()[0] + j * self.strides.as_slice()[1]]
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides()
    }

    /// Row-major elements, borrowed when already contiguous.
    pub fn materialize(&self) -> Cow<'a, [T]> {
        if self.is_contiguous() {
            return Cow::Borrowed(&self.data[..self.numel()]);
        }
        Cow::Owned(
            TensorIndices::new(&self.shape)
                .map(|idx| self.get(&idx))
                .collect(),
        )
    }
}
