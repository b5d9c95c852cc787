// Op: Computational graph node for automatic differentiation
//
// Every tensor that results from a computation records HOW it was created.
// The records form a DAG that backward() walks in reverse.
//
// Example: c = minimum(a, b)
//   a.op = Op::None (leaf variable)
//   b.op = Op::None (leaf variable)
//   c.op = Op::Binary { lhs: a, rhs: b, op: Minimum }
//
// Each variant stores the input Tensor<B> handles themselves (Arc clones),
// so backward() can read input values (minimum needs them to decide which
// side receives the gradient) and the graph keeps its inputs alive.

use crate::backend::{Backend, BinaryOp};
use crate::dtype::DType;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Unique identifier for a tensor. Used as keys in GradStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(pub(crate) u64);

impl Default for TensorId {
    fn default() -> Self {
        Self::new()
    }
}

impl TensorId {
    /// Generate a new unique tensor ID (uses a global atomic counter).
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TensorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Records the operation that produced a tensor.
pub enum Op<B: Backend> {
    /// Leaf tensor (input data or trainable parameter).
    None,

    /// Element-wise binary with broadcasting: result = op(lhs, rhs).
    Binary {
        lhs: Tensor<B>,
        rhs: Tensor<B>,
        op: BinaryOp,
    },

    /// Sum over `dims` (all dims when empty).
    Sum {
        input: Tensor<B>,
        dims: Vec<usize>,
        keep_dim: bool,
    },

    /// Same data, different shape.
    Reshape { input: Tensor<B>, src_shape: Shape },

    /// Zero-copy broadcast view of `input` at a larger shape.
    Broadcast { input: Tensor<B>, src_shape: Shape },

    /// result = input * mul + add
    Affine { input: Tensor<B>, mul: f64, add: f64 },

    /// Contiguous copy; gradient passes through unchanged.
    Contiguous { input: Tensor<B> },

    /// Conditional select; the mask receives no gradient.
    WhereCond {
        mask: Tensor<B>,
        on_true: Tensor<B>,
        on_false: Tensor<B>,
    },

    /// Dtype conversion; the gradient is cast back to `src_dtype`.
    ToDtype { input: Tensor<B>, src_dtype: DType },
}

// All clones are cheap: Tensor clone is an Arc refcount increment.
impl<B: Backend> Clone for Op<B> {
    fn clone(&self) -> Self {
        match self {
            Op::None => Op::None,
            Op::Binary { lhs, rhs, op } => Op::Binary {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                op: *op,
            },
            Op::Sum {
                input,
                dims,
                keep_dim,
            } => Op::Sum {
                input: input.clone(),
                dims: dims.clone(),
                keep_dim: *keep_dim,
            },
            Op::Reshape { input, src_shape } => Op::Reshape {
                input: input.clone(),
                src_shape: src_shape.clone(),
            },
            Op::Broadcast { input, src_shape } => Op::Broadcast {
                input: input.clone(),
                src_shape: src_shape.clone(),
            },
            Op::Affine { input, mul, add } => Op::Affine {
                input: input.clone(),
                mul: *mul,
                add: *add,
            },
            Op::Contiguous { input } => Op::Contiguous {
                input: input.clone(),
            },
            Op::WhereCond {
                mask,
                on_true,
                on_false,
            } => Op::WhereCond {
                mask: mask.clone(),
                on_true: on_true.clone(),
                on_false: on_false.clone(),
            },
            Op::ToDtype { input, src_dtype } => Op::ToDtype {
                input: input.clone(),
                src_dtype: *src_dtype,
            },
        }
    }
}

// Concise Debug: op kind and input ids only.
impl<B: Backend> std::fmt::Debug for Op<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::None => write!(f, "None"),
            Op::Binary { lhs, rhs, op } => {
                write!(f, "Binary({:?}, id={:?}, id={:?})", op, lhs.id(), rhs.id())
            }
            Op::Sum { input, dims, .. } => {
                write!(f, "Sum(dims={:?}, id={:?})", dims, input.id())
            }
            Op::Reshape { input, src_shape } => {
                write!(f, "Reshape(from={}, id={:?})", src_shape, input.id())
            }
            Op::Broadcast { input, src_shape } => {
                write!(f, "Broadcast(from={}, id={:?})", src_shape, input.id())
            }
            Op::Affine { input, mul, add } => {
                write!(f, "Affine(mul={}, add={}, id={:?})", mul, add, input.id())
            }
            Op::Contiguous { input } => write!(f, "Contiguous(id={:?})", input.id()),
            Op::WhereCond {
                mask,
                on_true,
                on_false,
            } => write!(
                f,
                "WhereCond(mask={:?}, true={:?}, false={:?})",
                mask.id(),
                on_true.id(),
                on_false.id()
            ),
            Op::ToDtype { input, src_dtype } => {
                write!(f, "ToDtype(from={}, id={:?})", src_dtype, input.id())
            }
        }
    }
}

impl<B: Backend> Op<B> {
    /// Input tensors of this operation, in the order backward() visits them.
    pub fn inputs(&self) -> Vec<&Tensor<B>> {
        match self {
            Op::None => vec![],
            Op::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Op::Sum { input, .. }
            | Op::Reshape { input, .. }
            | Op::Broadcast { input, .. }
            | Op::Affine { input, .. }
            | Op::Contiguous { input }
            | Op::ToDtype { input, .. } => vec![input],
            Op::WhereCond {
                mask,
                on_true,
                on_false,
            } => vec![mask, on_true, on_false],
        }
    }
}
