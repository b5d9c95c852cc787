// Dynamic Shapes: build-time shapes with unknown dimensions
//
// A merge layer is validated before any data flows, typically when only part
// of each input shape is known (the batch dimension, a variable sequence
// length). Those shapes are described with SymbolicShape:
//
//   SymDim            a dimension that is either Fixed(n) or Dynamic
//   SymbolicShape     an ordered list of SymDim
//
// BROADCAST RULES (right-aligned, shorter shape padded on the left with 1s):
//
//   a == b            → a
//   a == 1            → b
//   b == 1            → a
//   a or b Dynamic    → the other one (both Dynamic → Dynamic)
//   otherwise         → incompatible
//
// A concrete dimension beats an unknown one: the unknown is assumed to agree
// and is checked again when concrete shapes arrive.
//
// EXAMPLES:
//
//   [?, 3] ⊕ [4, 1]   → [4, 3]
//   [2, 3] ⊕ [3]      → [2, 3]
//   [3]    ⊕ [4]      → error at dim 0

use std::fmt;

use crate::error::{Error, Result};
use crate::shape::Shape;

/// A dimension that is either known or unknown until runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymDim {
    /// Known size: 768, 50257, etc.
    Fixed(usize),
    /// Unknown until runtime (batch size, sequence length).
    Dynamic,
}

impl SymDim {
    /// Create a fixed dimension.
    pub fn fixed(n: usize) -> Self {
        SymDim::Fixed(n)
    }

    /// Create a dynamic (wildcard) dimension.
    pub fn dynamic() -> Self {
        SymDim::Dynamic
    }

    /// Is this a concrete (fixed) dimension?
    pub fn is_fixed(&self) -> bool {
        matches!(self, SymDim::Fixed(_))
    }

    /// Is this fully dynamic?
    pub fn is_dynamic(&self) -> bool {
        matches!(self, SymDim::Dynamic)
    }

    /// The concrete size, if known.
    pub fn value(&self) -> Option<usize> {
        match self {
            SymDim::Fixed(n) => Some(*n),
            SymDim::Dynamic => None,
        }
    }

    /// Broadcast two aligned dimensions. Returns None when both are fixed,
    /// differ, and neither is 1.
    pub fn broadcast(self, other: SymDim) -> Option<SymDim> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (SymDim::Fixed(1), b) => Some(b),
            (a, SymDim::Fixed(1)) => Some(a),
            (SymDim::Dynamic, b) => Some(b),
            (a, SymDim::Dynamic) => Some(a),
            (SymDim::Fixed(_), SymDim::Fixed(_)) => None,
        }
    }
}

impl fmt::Display for SymDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymDim::Fixed(n) => write!(f, "{n}"),
            SymDim::Dynamic => write!(f, "?"),
        }
    }
}

impl From<usize> for SymDim {
    fn from(n: usize) -> Self {
        SymDim::Fixed(n)
    }
}

impl From<Option<usize>> for SymDim {
    fn from(n: Option<usize>) -> Self {
        n.map_or(SymDim::Dynamic, SymDim::Fixed)
    }
}

/// A shape whose dimensions may be unknown.
///
/// # Examples
/// ```
/// use tributary_core::{SymDim, SymbolicShape};
///
/// let a = SymbolicShape::new(vec![SymDim::Dynamic, SymDim::Fixed(3)]);
/// let b = SymbolicShape::from(vec![Some(4), Some(1)]);
/// assert_eq!(a.broadcast(&b).unwrap().to_string(), "[4, 3]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolicShape {
    dims: Vec<SymDim>,
}

impl SymbolicShape {
    /// Create a new symbolic shape from a vector of SymDim.
    pub fn new(dims: Vec<SymDim>) -> Self {
        Self { dims }
    }

    /// Create a fully-fixed symbolic shape from a concrete shape.
    pub fn from_shape(shape: &Shape) -> Self {
        Self {
            dims: shape.dims().iter().map(|&d| SymDim::Fixed(d)).collect(),
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Get the dimension patterns.
    pub fn dims(&self) -> &[SymDim] {
        &self.dims
    }

    /// Check if all dimensions are fixed (fully concrete).
    pub fn is_concrete(&self) -> bool {
        self.dims.iter().all(|d| d.is_fixed())
    }

    /// Convert to a concrete Shape, or None if any dimension is unknown.
    pub fn to_shape(&self) -> Option<Shape> {
        self.dims
            .iter()
            .map(|d| d.value())
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }

    /// Broadcast this shape with another.
    ///
    /// On failure, `dim` in the error is the index of the offending dimension
    /// in the right-aligned output shape.
    pub fn broadcast(&self, other: &SymbolicShape) -> Result<SymbolicShape> {
        let rank = self.rank().max(other.rank());
        let pad_self = rank - self.rank();
        let pad_other = rank - other.rank();
        let mut result = Vec::with_capacity(rank);

        for i in 0..rank {
            let a = if i < pad_self {
                SymDim::Fixed(1)
            } else {
                self.dims[i - pad_self]
            };
            let b = if i < pad_other {
                SymDim::Fixed(1)
            } else {
                other.dims[i - pad_other]
            };
            match a.broadcast(b) {
                Some(d) => result.push(d),
                None => {
                    return Err(Error::MergeShapeMismatch {
                        lhs: self.clone(),
                        rhs: other.clone(),
                        dim: i,
                    })
                }
            }
        }
        Ok(SymbolicShape::new(result))
    }
}

impl fmt::Display for SymbolicShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<SymDim>> for SymbolicShape {
    fn from(dims: Vec<SymDim>) -> Self {
        Self::new(dims)
    }
}

impl From<Vec<Option<usize>>> for SymbolicShape {
    fn from(dims: Vec<Option<usize>>) -> Self {
        Self::new(dims.into_iter().map(SymDim::from).collect())
    }
}

impl From<Shape> for SymbolicShape {
    fn from(shape: Shape) -> Self {
        Self::from_shape(&shape)
    }
}

impl From<&Shape> for SymbolicShape {
    fn from(shape: &Shape) -> Self {
        Self::from_shape(shape)
    }
}
