// Element kernels shared by every CPU dtype
//
// Storage is read through a Layout into a logical-order Vec<f64>, combined
// here, and written back to the target dtype. All supported dtypes embed
// exactly in f64, so minimum/maximum and comparisons give the same answer
// they would on the native type.
//
// Buffers at or above PAR_THRESHOLD elements are processed with rayon.

use rayon::prelude::*;

use tributary_core::layout::Layout;
use tributary_core::shape::Shape;

/// Element count from which kernels switch to rayon.
pub(crate) const PAR_THRESHOLD: usize = 16 * 1024;

pub(crate) fn unary_map<R, F>(a: &[f64], f: F) -> Vec<R>
where
    R: Send,
    F: Fn(f64) -> R + Sync + Send,
{
    if a.len() >= PAR_THRESHOLD {
        a.par_iter().map(|&x| f(x)).collect()
    } else {
        a.iter().map(|&x| f(x)).collect()
    }
}

pub(crate) fn zip_map<R, F>(a: &[f64], b: &[f64], f: F) -> Vec<R>
where
    R: Send,
    F: Fn(f64, f64) -> R + Sync + Send,
{
    debug_assert_eq!(a.len(), b.len());
    if a.len() >= PAR_THRESHOLD {
        a.par_iter()
            .zip(b.par_iter())
            .map(|(&x, &y)| f(x, y))
            .collect()
    } else {
        a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect()
    }
}

pub(crate) fn select(mask: &[f64], on_true: &[f64], on_false: &[f64]) -> Vec<f64> {
    let pick = |((&m, &t), &f): ((&f64, &f64), &f64)| if m != 0.0 { t } else { f };
    if mask.len() >= PAR_THRESHOLD {
        mask.par_iter()
            .zip(on_true.par_iter())
            .zip(on_false.par_iter())
            .map(pick)
            .collect()
    } else {
        mask.iter()
            .zip(on_true.iter())
            .zip(on_false.iter())
            .map(pick)
            .collect()
    }
}

/// Sum `data` (logical order over `shape`) along `dims`.
///
/// The output is laid out as the keep-dim shape; dropping the reduced dims
/// does not change the element order, so the caller's `keep_dim` only
/// affects the tensor shape.
pub(crate) fn sum_dims(data: &[f64], shape: &Shape, dims: &[usize]) -> Vec<f64> {
    if dims.is_empty() {
        return vec![data.iter().sum()];
    }
    let out_dims: Vec<usize> = shape
        .dims()
        .iter()
        .enumerate()
        .map(|(i, &d)| if dims.contains(&i) { 1 } else { d })
        .collect();
    let out_shape = Shape::new(out_dims);
    let mut strides = out_shape.stride_contiguous();
    for &d in dims {
        strides[d] = 0;
    }
    // the input shape walked with the output strides gives each element's slot
    let scatter = Layout::new(shape.clone(), strides, 0);
    let mut out = vec![0.0; out_shape.elem_count()];
    for (&v, slot) in data.iter().zip(scatter.strided_indices()) {
        out[slot] += v;
    }
    out
}
