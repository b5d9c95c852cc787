use crate::dtype::DType;
use crate::error::Result;
use crate::layout::Layout;
use crate::shape::Shape;
use std::fmt;

// Backend: Abstraction over compute devices
//
// The Backend trait is the seam between the tensor runtime (and everything
// built on it, merge layers included) and the code that actually touches
// buffers. A backend provides its own storage type and implements every
// kernel in terms of (storage, layout) pairs.
//
// BROADCASTING CONTRACT:
//
//   Binary, comparison and where_cond kernels receive the layouts of their
//   operands as-is. Operand shapes may differ; the backend broadcasts them
//   NumPy-style (see Shape::broadcast_shape) and returns contiguous storage
//   of the broadcast output shape.
//
// Tensor<B> is generic over the backend, so merge layers compiled against
// this trait run unchanged on any implementation.

/// Identifies a compute device (e.g., "cpu").
pub trait BackendDevice: Clone + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device.
    fn name(&self) -> String;
}

/// A storage buffer that holds tensor data on a specific device.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Operation enums
//
// They parameterize the backend kernels and are recorded in Op so that
// backward() knows which gradient rule to apply.

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Minimum,
    Maximum,
}

impl BinaryOp {
    /// Apply the operation to two scalars.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            // NaN propagates, matching the usual tensor-library minimum/maximum
            BinaryOp::Minimum => {
                if a.is_nan() || a <= b {
                    a
                } else {
                    b
                }
            }
            BinaryOp::Maximum => {
                if a.is_nan() || a >= b {
                    a
                } else {
                    b
                }
            }
        }
    }
}

/// Comparison operations (produce U8 tensors holding 0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
        }
    }
}

/// The interface every compute backend implements.
///
/// All operations take storage + layout and return new storage; nothing is
/// mutated in place.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The device type for this backend.
    type Device: BackendDevice;
    /// The storage type for this backend.
    type Storage: BackendStorage;

    //  Creation

    /// Allocate storage filled with zeros.
    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage> {
        Self::full(shape, 0.0, dtype, device)
    }

    /// Allocate storage filled with ones.
    fn ones(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage> {
        Self::full(shape, 1.0, dtype, device)
    }

    /// Allocate storage filled with a constant value.
    fn full(shape: &Shape, val: f64, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from a flat f64 slice, converting to the target dtype.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    //  Element-wise

    /// result[i] = op(lhs[i], rhs[i]) over the broadcast shape of both layouts.
    fn binary_op(
        op: BinaryOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    /// Element-wise comparison over the broadcast shape, returns U8 storage.
    fn cmp_op(
        op: CmpOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    /// result[i] = if mask[i] != 0 { on_true[i] } else { on_false[i] },
    /// broadcasting all three operands together.
    fn where_cond(
        mask: &Self::Storage,
        mask_layout: &Layout,
        on_true: &Self::Storage,
        on_true_layout: &Layout,
        on_false: &Self::Storage,
        on_false_layout: &Layout,
    ) -> Result<Self::Storage>;

    /// Affine transform: result = input * mul + add.
    fn affine(input: &Self::Storage, layout: &Layout, mul: f64, add: f64) -> Result<Self::Storage>;

    //  Reductions

    /// Sum along `dims`; an empty `dims` sums every element into a scalar.
    fn sum(
        input: &Self::Storage,
        layout: &Layout,
        dims: &[usize],
        keep_dim: bool,
    ) -> Result<Self::Storage>;

    //  Data movement

    /// Make a contiguous copy of the storage following the given layout.
    fn to_contiguous(input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    /// Copy data to a host Vec<f64> in logical order.
    fn to_f64_vec(input: &Self::Storage, layout: &Layout) -> Result<Vec<f64>>;

    /// Cast storage to a different dtype.
    ///
    /// The default goes through the host via `to_f64_vec`; backends with a
    /// native conversion kernel should override it.
    fn cast(
        input: &Self::Storage,
        layout: &Layout,
        dtype: DType,
        device: &Self::Device,
    ) -> Result<Self::Storage> {
        let data = Self::to_f64_vec(input, layout)?;
        Self::from_f64_slice(&data, dtype, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_maximum_scalars() {
        assert_eq!(BinaryOp::Minimum.apply(1.0, 5.0), 1.0);
        assert_eq!(BinaryOp::Minimum.apply(5.0, 1.0), 1.0);
        assert_eq!(BinaryOp::Maximum.apply(5.0, 1.0), 5.0);
        assert!(BinaryOp::Minimum.apply(f64::NAN, 1.0).is_nan());
        assert!(BinaryOp::Minimum.apply(1.0, f64::NAN).is_nan());
        assert!(BinaryOp::Maximum.apply(1.0, f64::NAN).is_nan());
    }

    #[test]
    fn test_cmp_scalars() {
        assert!(CmpOp::Le.apply(2.0, 2.0));
        assert!(!CmpOp::Lt.apply(2.0, 2.0));
        assert!(CmpOp::Ne.apply(0.0, 1.0));
    }
}
