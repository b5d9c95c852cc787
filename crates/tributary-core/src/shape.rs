use std::fmt;

use crate::error::{Error, Result};

// Shape: concrete N-dimensional shape of a materialised tensor
//
// Every dimension of a Shape is known. Build-time shapes that may contain
// unknown dimensions live in `dynamic_shape::SymbolicShape`; a Shape always
// converts into one losslessly.
//
//   - Scalar: Shape([])          0 dimensions, 1 element
//   - Vector: Shape([5])         1 dimension, 5 elements
//   - Matrix: Shape([3, 4])      2 dimensions, 12 elements

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions (0 for scalar, 1 for vector, 2 for matrix, etc.).
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dimensions).
    /// A scalar shape [] has 1 element.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Contiguous (row-major) strides: [2, 3, 4] → [12, 4, 1].
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        if self.rank() > 0 {
            strides[self.rank() - 1] = 1;
            for i in (0..self.rank() - 1).rev() {
                strides[i] = strides[i + 1] * self.0[i + 1];
            }
        }
        strides
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> Result<usize> {
        self.0.get(d).copied().ok_or(Error::DimOutOfRange {
            dim: d,
            rank: self.rank(),
        })
    }

    // Broadcasting

    /// Compute the broadcast output shape from two concrete shapes.
    ///
    /// NumPy-style rules: align from the right, treat missing leading dims
    /// as 1, and require each aligned pair to be equal or contain a 1.
    ///
    ///   [3, 4] and [4]       → [3, 4]
    ///   [2, 1] and [1, 3]    → [2, 3]
    ///   [3] and [4]          → Error
    pub fn broadcast_shape(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
        let l = lhs.dims();
        let r = rhs.dims();
        let max_rank = l.len().max(r.len());
        let mut result = Vec::with_capacity(max_rank);

        for i in 0..max_rank {
            // i counts from the right; missing dims behave as 1
            let ld = if i < l.len() { l[l.len() - 1 - i] } else { 1 };
            let rd = if i < r.len() { r[r.len() - 1 - i] } else { 1 };

            if ld == rd || rd == 1 {
                result.push(ld);
            } else if ld == 1 {
                result.push(rd);
            } else {
                return Err(Error::BroadcastIncompatible {
                    lhs: lhs.clone(),
                    rhs: rhs.clone(),
                    dim: i,
                    lhs_dim: ld,
                    rhs_dim: rd,
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }

    /// Broadcast any number of shapes together, left to right.
    pub fn broadcast_all<'a>(shapes: impl IntoIterator<Item = &'a Shape>) -> Result<Shape> {
        let mut iter = shapes.into_iter();
        let first = match iter.next() {
            Some(s) => s.clone(),
            None => return Err(Error::msg("broadcast_all requires at least one shape")),
        };
        iter.try_fold(first, |acc, s| Shape::broadcast_shape(&acc, s))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<()> for Shape {
    /// Scalar shape (0 dimensions).
    fn from(_: ()) -> Self {
        Shape(vec![])
    }
}

impl From<usize> for Shape {
    /// 1-D shape.
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize,)> for Shape {
    fn from((d0,): (usize,)) -> Self {
        Shape(vec![d0])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape(vec![d0, d1, d2])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.elem_count(), 1);
        assert_eq!(s.stride_contiguous(), Vec::<usize>::new());
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.stride_contiguous(), vec![12, 4, 1]);
        assert_eq!(s.elem_count(), 24);
    }

    #[test]
    fn test_broadcast_trailing() {
        let out = Shape::broadcast_shape(&Shape::from((3, 4)), &Shape::from(4)).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
        let out = Shape::broadcast_shape(&Shape::from((2, 1)), &Shape::from((1, 3))).unwrap();
        assert_eq!(out.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_incompatible() {
        let err = Shape::broadcast_shape(&Shape::from(3), &Shape::from(4)).unwrap_err();
        assert!(matches!(
            err,
            Error::BroadcastIncompatible {
                lhs_dim: 3,
                rhs_dim: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_broadcast_all() {
        let shapes = [Shape::from((2, 1)), Shape::from(3), Shape::from((1, 1))];
        assert_eq!(Shape::broadcast_all(&shapes).unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_display() {
        let s = Shape::from((3, 4));
        assert_eq!(format!("{}", s), "[3, 4]");
    }
}
