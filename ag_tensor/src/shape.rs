//! Extents, strides and row-major index iteration.

use std::fmt;

/// Extent of each axis. No axes means a scalar.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Rank.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Extent of axis `axis`. Panics when out of range.
    pub fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Element count; 1 for a scalar, 0 when any axis is empty.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Rank 1, or rank 2 with one unit axis.
    pub fn is_vector(&self) -> bool {
        match self.dims[..] {
            [_] => true,
            [_, _] => self.is_col_vec() || self.is_row_vec(),
            _ => false,
        }
    }

    /// `(n, 1)`
    pub fn is_col_vec(&self) -> bool {
        matches!(self.dims[..], [_, 1])
    }

    /// `(1, n)`
    pub fn is_row_vec(&self) -> bool {
        matches!(self.dims[..], [1, _])
    }

    /// Axes in reverse order; a transpose for rank 2.
    pub fn reversed(&self) -> Shape {
        Shape::new(self.dims.iter().rev().copied().collect())
    }

    /// Row-major strides, innermost axis stepping by one.
    pub fn contiguous_strides(&self) -> Strides {
        let mut steps = Vec::with_capacity(self.ndim());
        let mut step = 1;
        for &d in self.dims.iter().rev() {
            steps.push(step);
            step *= d;
        }
        steps.reverse();
        Strides::new(steps)
    }

    /// The shape left after reducing `axes`. Out-of-range axes are ignored.
    pub fn without_axes(&self, axes: &[usize]) -> Shape {
        let kept = self
            .dims
            .iter()
            .enumerate()
            .filter_map(|(axis, &d)| (!axes.contains(&axis)).then_some(d));
        Shape::new(kept.collect())
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.dims)
    }
}

/// `(2, 3)`, `(4,)`, `()`.
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.dims.iter().map(usize::to_string).collect();
        match parts.len() {
            1 => write!(f, "({},)", parts[0]),
            _ => write!(f, "({})", parts.join(", ")),
        }
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

/// Element step per axis in a flat buffer.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Strides {
    steps: Vec<usize>,
}

impl Strides {
    pub fn new(steps: Vec<usize>) -> Self {
        Strides { steps }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.steps
    }

    /// Flat offset of a multi-index.
    pub fn index(&self, indices: &[usize]) -> usize {
        debug_assert_eq!(self.steps.len(), indices.len());
        self.steps.iter().zip(indices).map(|(s, i)| s * i).sum()
    }

    pub(crate) fn reversed(&self) -> Strides {
        Strides::new(self.steps.iter().rev().copied().collect())
    }
}

/// Every multi-index of a shape in row-major order. A scalar yields one empty
/// index; a shape with an empty axis yields none.
pub struct TensorIndices<'a> {
    shape: &'a Shape,
    next: Option<Vec<usize>>,
}

impl<'a> TensorIndices<'a> {
    pub fn new(shape: &'a Shape) -> Self {
        let next = (shape.numel() > 0).then(|| vec![0; shape.ndim()]);
        TensorIndices { shape, next }
    }
}

impl Iterator for TensorIndices<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        let mut succ = current.clone();
        for axis in (0..succ.len()).rev() {
            succ[axis] += 1;
            if succ[axis] < self.shape.dim(axis) {
                self.next = Some(succ);
                break;
            }
            succ[axis] = 0;
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_and_count() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!((s.ndim(), s.dim(2), s.numel()), (3, 4, 24));
        assert!(!s.is_scalar());

        let scalar = Shape::scalar();
        assert_eq!((scalar.ndim(), scalar.numel()), (0, 1));
        assert!(scalar.is_scalar());
        assert_eq!(Shape::new(vec![3, 0]).numel(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::scalar().to_string(), "()");
        assert_eq!(Shape::new(vec![4]).to_string(), "(4,)");
        assert_eq!(Shape::new(vec![2, 3]).to_string(), "(2, 3)");
    }

    #[test]
    fn test_vector_predicates() {
        assert!(Shape::new(vec![5]).is_vector());
        assert!(Shape::new(vec![5, 1]).is_col_vec());
        assert!(Shape::new(vec![1, 5]).is_row_vec());
        assert!(!Shape::new(vec![2, 5]).is_vector());
        assert!(!Shape::new(vec![1, 1, 5]).is_vector());
    }

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(Shape::new(vec![2, 3, 4]).contiguous_strides().as_slice(), &[12, 4, 1]);
        assert!(Shape::scalar().contiguous_strides().as_slice().is_empty());
        let strides = Strides::new(vec![12, 4, 1]);
        assert_eq!(strides.index(&[1, 2, 3]), 23);
    }

    #[test]
    fn test_without_axes() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.without_axes(&[1]), Shape::new(vec![2, 4]));
        assert_eq!(s.without_axes(&[0, 1, 2]), Shape::scalar());
    }

    #[test]
    fn test_indices_row_major() {
        let s = Shape::new(vec![2, 2]);
        let all: Vec<Vec<usize>> = TensorIndices::new(&s).collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);

        assert_eq!(TensorIndices::new(&Shape::scalar()).count(), 1);
        assert_eq!(TensorIndices::new(&Shape::new(vec![2, 0])).count(), 0);
    }
}
