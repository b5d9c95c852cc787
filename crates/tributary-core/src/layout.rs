use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout: Memory layout of a tensor (shape + strides + offset)
//
// The Layout decouples the *logical* shape of a tensor from how its data is
// arranged in memory. Broadcasting is expressed purely through layouts:
// a [1, 3] tensor viewed as [2, 3] keeps its storage and gets a stride of 0
// along the broadcast dimension, so both rows read the same three values.
//
//   shape [1, 3], strides [3, 1]  →  broadcast_as([2, 3])  →  strides [0, 1]
//   shape [3],    strides [1]     →  broadcast_as([2, 3])  →  strides [0, 1]
//
// Backends walk layouts with StridedIter, so contiguous, broadcast and
// offset views all go through the same kernel path.

/// Layout describes how a tensor's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Offset into the storage buffer where this tensor's data starts.
    offset: usize,
}

impl Layout {
    /// Create a new contiguous layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Create a layout with explicit strides and offset (for views).
    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Layout {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// A layout is contiguous if its strides are the row-major strides of
    /// its shape and it starts at offset 0.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == self.shape.stride_contiguous()
    }

    /// View this layout as the (larger) broadcast `target` shape.
    ///
    /// Missing leading dimensions and size-1 dimensions that expand get
    /// stride 0. Every other dimension must match `target` exactly.
    pub fn broadcast_as(&self, target: &Shape) -> Result<Layout> {
        let src = self.dims();
        let dst = target.dims();
        if src.len() > dst.len() {
            return Err(Error::ShapeMismatch {
                expected: target.clone(),
                got: self.shape.clone(),
            });
        }
        let pad = dst.len() - src.len();
        let mut strides = vec![0usize; dst.len()];
        for (i, &d) in src.iter().enumerate() {
            if d == dst[i + pad] {
                strides[i + pad] = self.strides[i];
            } else if d != 1 {
                return Err(Error::BroadcastIncompatible {
                    lhs: self.shape.clone(),
                    rhs: target.clone(),
                    dim: src.len() - 1 - i,
                    lhs_dim: d,
                    rhs_dim: dst[i + pad],
                });
            }
        }
        Ok(Layout::new(target.clone(), strides, self.offset))
    }

    /// Iterator over all flat storage indices of this layout, in logical order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

/// Iterator that yields flat storage indices for each element of a Layout.
///
/// For a contiguous layout this counts 0, 1, 2, ...; for a broadcast view
/// it revisits the same storage slots along zero-stride dimensions.
pub struct StridedIter {
    /// Current multi-dimensional index (e.g., [0, 0, 0]).
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        StridedIter {
            current: vec![0; layout.rank()],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            offset: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    fn flat_index(&self) -> usize {
        self.current
            .iter()
            .zip(self.strides.iter())
            .fold(self.offset, |acc, (&i, &s)| acc + i * s)
    }

    /// Advance the multi-dimensional index by one (rightmost dimension first).
    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat_index())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}
