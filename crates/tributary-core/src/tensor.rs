use std::sync::Arc;

use crate::backend::{Backend, BinaryOp, CmpOp};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::op::{Op, TensorId};
use crate::shape::Shape;

// Tensor: The fundamental data structure
//
// A Tensor is an n-dimensional array on a specific backend:
//
//   1. Holds data on a device through B::Storage
//   2. Has a concrete shape (via its Layout)
//   3. Has a dtype (f32, f64, u8 masks, ...)
//   4. Records the operation that created it (for autograd)
//
// MEMORY MODEL:
//
//   Tensor is a handle around Arc<TensorInner>, and the storage itself sits
//   behind its own Arc. Cloning a tensor is O(1); views (reshape of a
//   contiguous tensor, broadcast_as) share storage with their source and
//   only carry a different Layout. Storage is never mutated after creation,
//   so handles can be shared freely across threads.

struct TensorInner<B: Backend> {
    id: TensorId,
    storage: Arc<B::Storage>,
    layout: Layout,
    dtype: DType,
    device: B::Device,
    /// None for leaf tensors (inputs, parameters).
    op: Op<B>,
    /// Only variables accumulate gradients during backward().
    is_variable: bool,
}

/// An n-dimensional array of numbers on a specific backend.
///
/// # Example
/// ```ignore
/// let a = Tensor::<CpuBackend>::from_f64_slice(&[1.0, 5.0, 3.0], 3, DType::F32, &CpuDevice)?;
/// let b = Tensor::<CpuBackend>::from_f64_slice(&[4.0, 2.0, 6.0], 3, DType::F32, &CpuDevice)?;
/// let c = a.minimum(&b)?; // [1, 2, 3]
/// ```
pub struct Tensor<B: Backend> {
    inner: Arc<TensorInner<B>>,
}

impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(id={:?}, shape={}, dtype={}, device={:?})",
            self.inner.id,
            self.inner.layout.shape(),
            self.inner.dtype,
            self.inner.device,
        )
    }
}

impl<B: Backend> Tensor<B> {
    // Internal constructors

    /// Create a tensor from existing storage and layout.
    pub(crate) fn from_storage(
        storage: B::Storage,
        layout: Layout,
        dtype: DType,
        device: B::Device,
        op: Op<B>,
    ) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                storage: Arc::new(storage),
                layout,
                dtype,
                device,
                op,
                is_variable: false,
            }),
        }
    }

    /// Create a view sharing this tensor's storage with a different layout.
    fn view_with_layout(&self, layout: Layout, op: Op<B>) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                storage: Arc::clone(&self.inner.storage),
                layout,
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                op,
                is_variable: false,
            }),
        }
    }

    /// Same id, storage and op, with a different variable flag.
    fn with_variable(&self, is_variable: bool) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                id: self.inner.id,
                storage: Arc::clone(&self.inner.storage),
                layout: self.inner.layout.clone(),
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                op: self.inner.op.clone(),
                is_variable,
            }),
        }
    }

    // Accessors

    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    /// The memory layout (shape + strides + offset).
    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether this tensor tracks gradients.
    pub fn is_variable(&self) -> bool {
        self.inner.is_variable
    }

    /// Backend storage backing this tensor (possibly shared with views).
    pub fn storage(&self) -> &B::Storage {
        &self.inner.storage
    }

    /// The op that created this tensor.
    pub fn op(&self) -> &Op<B> {
        &self.inner.op
    }

    // Creation methods

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
            Op::None,
        ))
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::ones(&shape, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
            Op::None,
        ))
    }

    /// Create a tensor filled with a constant value.
    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let storage = B::full(&shape, val, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
            Op::None,
        ))
    }

    /// Create a tensor from a flat slice of f64 values (row-major).
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.elem_count(),
                got: data.len(),
            });
        }
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
            Op::None,
        ))
    }

    /// Create a boolean mask (U8 storage) from a slice of bools.
    pub fn from_bools(data: &[bool], shape: impl Into<Shape>, device: &B::Device) -> Result<Self> {
        let values: Vec<f64> = data.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
        Self::from_f64_slice(&values, shape, DType::U8, device)
    }

    pub fn zeros_like(other: &Self) -> Result<Self> {
        Self::zeros(other.shape().clone(), other.dtype(), other.device())
    }

    pub fn ones_like(other: &Self) -> Result<Self> {
        Self::ones(other.shape().clone(), other.dtype(), other.device())
    }

    /// Mark this tensor as a variable; variables accumulate gradients.
    pub fn set_variable(self) -> Self {
        self.with_variable(true)
    }

    /// Same data and id, but excluded from gradient accumulation.
    pub fn freeze(&self) -> Self {
        self.with_variable(false)
    }

    /// Same data, fresh id, no autograd history.
    pub fn detach(&self) -> Self {
        self.view_with_layout(self.layout().clone(), Op::None)
    }

    // Shape manipulation

    /// Reshape to a new shape with the same element count.
    /// Non-contiguous tensors are copied to contiguous storage first.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Self> {
        let new_shape = new_shape.into();
        let current_count = self.elem_count();
        let new_count = new_shape.elem_count();
        if current_count != new_count {
            return Err(Error::ReshapeElementMismatch {
                src: current_count,
                dst: new_count,
                dst_shape: new_shape,
            });
        }
        let tensor = self.contiguous()?;
        let op = Op::Reshape {
            input: tensor.clone(),
            src_shape: tensor.shape().clone(),
        };
        Ok(tensor.view_with_layout(Layout::contiguous(new_shape), op))
    }

    /// Copy into contiguous storage if needed (cheap clone otherwise).
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let new_storage = B::to_contiguous(self.storage(), &self.inner.layout)?;
        Ok(Self::from_storage(
            new_storage,
            Layout::contiguous(self.shape().clone()),
            self.inner.dtype,
            self.inner.device.clone(),
            Op::Contiguous {
                input: self.clone(),
            },
        ))
    }

    /// Zero-copy broadcast view at `target` (NumPy rules, see Layout::broadcast_as).
    pub fn broadcast_as(&self, target: impl Into<Shape>) -> Result<Self> {
        let target = target.into();
        if &target == self.shape() {
            return Ok(self.clone());
        }
        let layout = self.inner.layout.broadcast_as(&target)?;
        let op = Op::Broadcast {
            input: self.clone(),
            src_shape: self.shape().clone(),
        };
        Ok(self.view_with_layout(layout, op))
    }

    // Arithmetic operations

    /// Element-wise addition: self + rhs.
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Add)
    }

    /// Element-wise subtraction: self - rhs.
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Sub)
    }

    /// Element-wise multiplication: self * rhs.
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Mul)
    }

    /// Element-wise division: self / rhs.
    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Div)
    }

    /// Element-wise minimum. NaN in either operand propagates.
    ///
    /// Gradient: flows to `self` where `self <= rhs`, to `rhs` elsewhere.
    /// On ties the left operand receives the whole gradient.
    pub fn minimum(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Minimum)
    }

    /// Element-wise maximum. Ties route the gradient to `self`.
    pub fn maximum(&self, rhs: &Self) -> Result<Self> {
        self.binary_op(rhs, BinaryOp::Maximum)
    }

    fn binary_op(&self, rhs: &Self, op: BinaryOp) -> Result<Self> {
        if self.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            });
        }
        let result_shape = Shape::broadcast_shape(self.shape(), rhs.shape())?;
        let result = B::binary_op(
            op,
            self.storage(),
            &self.inner.layout,
            rhs.storage(),
            &rhs.inner.layout,
        )?;
        let result_op = Op::Binary {
            lhs: self.clone(),
            rhs: rhs.clone(),
            op,
        };
        Ok(Self::from_storage(
            result,
            Layout::contiguous(result_shape),
            self.inner.dtype,
            self.inner.device.clone(),
            result_op,
        ))
    }

    // Comparison operations

    pub fn eq(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Eq)
    }

    pub fn ne(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Ne)
    }

    pub fn gt(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Gt)
    }

    pub fn ge(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Ge)
    }

    pub fn lt(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Lt)
    }

    pub fn le(&self, rhs: &Self) -> Result<Self> {
        self.cmp_op(rhs, CmpOp::Le)
    }

    /// Produces a U8 tensor over the broadcast shape. Not differentiable.
    fn cmp_op(&self, rhs: &Self, op: CmpOp) -> Result<Self> {
        let result_shape = Shape::broadcast_shape(self.shape(), rhs.shape())?;
        let result = B::cmp_op(
            op,
            self.storage(),
            &self.inner.layout,
            rhs.storage(),
            &rhs.inner.layout,
        )?;
        Ok(Self::from_storage(
            result,
            Layout::contiguous(result_shape),
            DType::U8,
            self.inner.device.clone(),
            Op::None,
        ))
    }

    // Boolean masks

    /// Normalise to a U8 mask: 1 where the element is non-zero.
    pub fn to_mask(&self) -> Result<Self> {
        let zero = Tensor::<B>::zeros((), self.dtype(), self.device())?;
        self.ne(&zero)
    }

    /// Position-wise logical AND of two masks, with broadcasting.
    pub fn logical_and(&self, rhs: &Self) -> Result<Self> {
        // on {0, 1}, minimum is AND
        Ok(self.to_mask()?.minimum(&rhs.to_mask()?)?.detach())
    }

    /// Position-wise logical OR of two masks, with broadcasting.
    pub fn logical_or(&self, rhs: &Self) -> Result<Self> {
        Ok(self.to_mask()?.maximum(&rhs.to_mask()?)?.detach())
    }

    /// U8 mask with 1 where the element is NaN.
    pub fn is_nan(&self) -> Result<Self> {
        // NaN is the only value unequal to itself
        self.ne(self)
    }

    /// Conditional select: result[i] = if mask[i] != 0 { on_true[i] } else { on_false[i] }.
    /// All three operands broadcast together.
    pub fn where_cond(mask: &Self, on_true: &Self, on_false: &Self) -> Result<Self> {
        if on_true.dtype() != on_false.dtype() {
            return Err(Error::DTypeMismatch {
                expected: on_true.dtype(),
                got: on_false.dtype(),
            });
        }
        let result_shape = Shape::broadcast_all([mask.shape(), on_true.shape(), on_false.shape()])?;
        let result = B::where_cond(
            mask.storage(),
            &mask.inner.layout,
            on_true.storage(),
            &on_true.inner.layout,
            on_false.storage(),
            &on_false.inner.layout,
        )?;
        let result_op = Op::WhereCond {
            mask: mask.clone(),
            on_true: on_true.clone(),
            on_false: on_false.clone(),
        };
        Ok(Self::from_storage(
            result,
            Layout::contiguous(result_shape),
            on_true.inner.dtype,
            on_true.inner.device.clone(),
            result_op,
        ))
    }

    // Reductions

    /// Sum all elements, returning a scalar tensor.
    pub fn sum_all(&self) -> Result<Self> {
        self.sum_dims(&[], false)
    }

    /// Sum along a specific dimension.
    pub fn sum(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.sum_dims(&[dim], keep_dim)
    }

    fn sum_dims(&self, dims: &[usize], keep_dim: bool) -> Result<Self> {
        for &d in dims {
            if d >= self.rank() {
                return Err(Error::DimOutOfRange {
                    dim: d,
                    rank: self.rank(),
                });
            }
        }
        let result = B::sum(self.storage(), &self.inner.layout, dims, keep_dim)?;

        let result_shape = if dims.is_empty() {
            Shape::from(())
        } else if keep_dim {
            let mut new_dims = self.dims().to_vec();
            for &d in dims {
                new_dims[d] = 1;
            }
            Shape::new(new_dims)
        } else {
            Shape::new(
                self.dims()
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !dims.contains(i))
                    .map(|(_, &d)| d)
                    .collect(),
            )
        };

        let result_op = Op::Sum {
            input: self.clone(),
            dims: dims.to_vec(),
            keep_dim,
        };
        Ok(Self::from_storage(
            result,
            Layout::contiguous(result_shape),
            self.inner.dtype,
            self.inner.device.clone(),
            result_op,
        ))
    }

    /// Affine transform: result[i] = self[i] * mul + add.
    pub fn affine(&self, mul: f64, add: f64) -> Result<Self> {
        let result = B::affine(self.storage(), &self.inner.layout, mul, add)?;
        let result_op = Op::Affine {
            input: self.clone(),
            mul,
            add,
        };
        Ok(Self::from_storage(
            result,
            Layout::contiguous(self.shape().clone()),
            self.inner.dtype,
            self.inner.device.clone(),
            result_op,
        ))
    }

    // Data extraction

    /// Extract all elements as a flat Vec<f64> in logical order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        B::to_f64_vec(self.storage(), &self.inner.layout)
    }

    /// Extract a mask as a flat Vec<bool>.
    pub fn to_bool_vec(&self) -> Result<Vec<bool>> {
        Ok(self.to_f64_vec()?.into_iter().map(|v| v != 0.0).collect())
    }

    /// Extract a scalar value (tensor must have exactly 1 element).
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        Ok(self.to_f64_vec()?[0])
    }

    /// Convert to a different dtype. Gradients are cast back on the way down.
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        let storage = B::cast(self.storage(), &self.inner.layout, dtype, self.device())?;
        let op = Op::ToDtype {
            input: self.clone(),
            src_dtype: self.dtype(),
        };
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(self.shape().clone()),
            dtype,
            self.device().clone(),
            op,
        ))
    }

    // Autograd

    /// Reverse-mode autodiff from this scalar tensor.
    ///
    /// ```ignore
    /// let a = Tensor::from_f64_slice(&[2.0], 1, DType::F32, &dev)?.set_variable();
    /// let b = Tensor::from_f64_slice(&[3.0], 1, DType::F32, &dev)?.set_variable();
    /// let grads = a.minimum(&b)?.sum_all()?.backward()?;
    /// // grad_a = 1.0, grad_b = 0.0
    /// ```
    pub fn backward(&self) -> Result<crate::backprop::GradStore<B>> {
        crate::backprop::backward(self)
    }
}
