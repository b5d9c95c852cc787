// CPU Backend: Host-memory compute backend
//
// ARCHITECTURE:
// - CpuDevice is a unit struct; there is exactly one host device
// - CpuStorage is an enum over Vec<T> for each supported dtype
// - Kernels read their operands through a Layout (so broadcast and strided
//   views need no copy), compute in f64 and write contiguous output
// - Large buffers are processed in parallel with rayon
//
// USAGE:
//   let a = CpuTensor::from_f64_slice(&[1.0, 5.0], 2, DType::F32, &CpuDevice)?;
//   let b = CpuTensor::from_f64_slice(&[4.0, 2.0], 2, DType::F32, &CpuDevice)?;
//   let m = a.minimum(&b)?; // [1, 2]

mod ops;

use std::fmt;

use half::{bf16, f16};

use tributary_core::backend::{Backend, BackendDevice, BackendStorage, BinaryOp, CmpOp};
use tributary_core::dtype::{DType, WithDType};
use tributary_core::error::{Error, Result};
use tributary_core::layout::Layout;
use tributary_core::shape::Shape;
use tributary_core::tensor::Tensor;

/// The host CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        "cpu".to_string()
    }
}

/// Host-side storage, one variant per dtype.
#[derive(Clone)]
pub enum CpuStorage {
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
}

// Run `$body` with `$v` bound to the typed buffer, whatever the variant.
macro_rules! with_buffer {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::F16($v) => $body,
            CpuStorage::BF16($v) => $body,
            CpuStorage::F32($v) => $body,
            CpuStorage::F64($v) => $body,
            CpuStorage::U8($v) => $body,
        }
    };
}

// Like with_buffer!, but wraps the result back into the same variant.
macro_rules! map_buffer {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::F16($v) => CpuStorage::F16($body),
            CpuStorage::BF16($v) => CpuStorage::BF16($body),
            CpuStorage::F32($v) => CpuStorage::F32($body),
            CpuStorage::F64($v) => CpuStorage::F64($body),
            CpuStorage::U8($v) => CpuStorage::U8($body),
        }
    };
}

impl fmt::Debug for CpuStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuStorage::{}(len={})", self.dtype(), self.len())
    }
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::BF16(_) => DType::BF16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
        }
    }

    fn len(&self) -> usize {
        with_buffer!(self, v => v.len())
    }
}

fn convert<T: WithDType>(data: &[f64]) -> Vec<T> {
    ops::unary_map(data, T::from_f64)
}

impl CpuStorage {
    /// Build storage of `dtype` from f64 values.
    pub fn from_f64_vec(data: &[f64], dtype: DType) -> Self {
        match dtype {
            DType::F16 => CpuStorage::F16(convert(data)),
            DType::BF16 => CpuStorage::BF16(convert(data)),
            DType::F32 => CpuStorage::F32(convert(data)),
            DType::F64 => CpuStorage::F64(data.to_vec()),
            DType::U8 => CpuStorage::U8(convert(data)),
        }
    }

    /// Read the elements addressed by `layout`, in logical order, as f64.
    fn read_f64(&self, layout: &Layout) -> Result<Vec<f64>> {
        check_bounds(self, layout)?;
        Ok(with_buffer!(self, v => layout
            .strided_indices()
            .map(|i| v[i].to_f64())
            .collect::<Vec<f64>>()))
    }
}

/// Every index a layout can produce must fall inside the buffer.
fn check_bounds(storage: &CpuStorage, layout: &Layout) -> Result<()> {
    if layout.elem_count() == 0 {
        return Ok(());
    }
    let last = layout.dims().iter().zip(layout.strides()).fold(
        layout.offset(),
        |acc, (&d, &s)| acc + (d - 1) * s,
    );
    if last >= storage.len() {
        return Err(Error::msg(format!(
            "layout {:?} addresses element {} of a {}-element buffer",
            layout,
            last,
            storage.len()
        )));
    }
    Ok(())
}

fn check_same_dtype(lhs: &CpuStorage, rhs: &CpuStorage) -> Result<()> {
    if lhs.dtype() != rhs.dtype() {
        return Err(Error::DTypeMismatch {
            expected: lhs.dtype(),
            got: rhs.dtype(),
        });
    }
    Ok(())
}

/// Broadcast two layouts to their common shape.
fn broadcast_pair(lhs: &Layout, rhs: &Layout) -> Result<(Layout, Layout)> {
    let out = Shape::broadcast_shape(lhs.shape(), rhs.shape())?;
    Ok((lhs.broadcast_as(&out)?, rhs.broadcast_as(&out)?))
}

/// The CPU compute backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

/// Convenience alias: a tensor on the CPU backend.
pub type CpuTensor = Tensor<CpuBackend>;

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    fn full(shape: &Shape, val: f64, dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        Ok(match dtype {
            DType::F16 => CpuStorage::F16(vec![f16::from_f64(val); n]),
            DType::BF16 => CpuStorage::BF16(vec![bf16::from_f64(val); n]),
            DType::F32 => CpuStorage::F32(vec![val as f32; n]),
            DType::F64 => CpuStorage::F64(vec![val; n]),
            DType::U8 => CpuStorage::U8(vec![u8::from_f64(val); n]),
        })
    }

    fn from_f64_slice(data: &[f64], dtype: DType, _device: &CpuDevice) -> Result<CpuStorage> {
        Ok(CpuStorage::from_f64_vec(data, dtype))
    }

    fn binary_op(
        op: BinaryOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        check_same_dtype(lhs, rhs)?;
        let (l, r) = broadcast_pair(lhs_layout, rhs_layout)?;
        let a = lhs.read_f64(&l)?;
        let b = rhs.read_f64(&r)?;
        let out: Vec<f64> = ops::zip_map(&a, &b, |x, y| op.apply(x, y));
        Ok(CpuStorage::from_f64_vec(&out, lhs.dtype()))
    }

    fn cmp_op(
        op: CmpOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        let (l, r) = broadcast_pair(lhs_layout, rhs_layout)?;
        let a = lhs.read_f64(&l)?;
        let b = rhs.read_f64(&r)?;
        Ok(CpuStorage::U8(ops::zip_map(&a, &b, |x, y| {
            op.apply(x, y) as u8
        })))
    }

    fn where_cond(
        mask: &CpuStorage,
        mask_layout: &Layout,
        on_true: &CpuStorage,
        on_true_layout: &Layout,
        on_false: &CpuStorage,
        on_false_layout: &Layout,
    ) -> Result<CpuStorage> {
        check_same_dtype(on_true, on_false)?;
        let out = Shape::broadcast_all([
            mask_layout.shape(),
            on_true_layout.shape(),
            on_false_layout.shape(),
        ])?;
        let m = mask.read_f64(&mask_layout.broadcast_as(&out)?)?;
        let t = on_true.read_f64(&on_true_layout.broadcast_as(&out)?)?;
        let f = on_false.read_f64(&on_false_layout.broadcast_as(&out)?)?;
        Ok(CpuStorage::from_f64_vec(
            &ops::select(&m, &t, &f),
            on_true.dtype(),
        ))
    }

    fn affine(input: &CpuStorage, layout: &Layout, mul: f64, add: f64) -> Result<CpuStorage> {
        let a = input.read_f64(layout)?;
        let out: Vec<f64> = ops::unary_map(&a, |x| x * mul + add);
        Ok(CpuStorage::from_f64_vec(&out, input.dtype()))
    }

    fn sum(
        input: &CpuStorage,
        layout: &Layout,
        dims: &[usize],
        _keep_dim: bool,
    ) -> Result<CpuStorage> {
        if let Some(&d) = dims.iter().find(|&&d| d >= layout.rank()) {
            return Err(Error::DimOutOfRange {
                dim: d,
                rank: layout.rank(),
            });
        }
        let a = input.read_f64(layout)?;
        let out = ops::sum_dims(&a, layout.shape(), dims);
        Ok(CpuStorage::from_f64_vec(&out, input.dtype()))
    }

    fn to_contiguous(input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        check_bounds(input, layout)?;
        Ok(map_buffer!(input, v => layout.strided_indices().map(|i| v[i]).collect()))
    }

    fn to_f64_vec(input: &CpuStorage, layout: &Layout) -> Result<Vec<f64>> {
        input.read_f64(layout)
    }

    fn cast(
        input: &CpuStorage,
        layout: &Layout,
        dtype: DType,
        _device: &CpuDevice,
    ) -> Result<CpuStorage> {
        if input.dtype() == dtype {
            return Self::to_contiguous(input, layout);
        }
        let data = input.read_f64(layout)?;
        Ok(CpuStorage::from_f64_vec(&data, dtype))
    }
}
