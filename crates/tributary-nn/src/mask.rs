// Mask propagation: combine per-input validity masks
//
// A mask marks which positions of an input hold real values. Merged outputs
// are valid only where every input is valid, so masks combine with a
// position-wise AND after broadcasting to the merged output shape.
//
// A missing mask means "every position is valid", the identity of AND, so
// it drops out of the combination. When no input carries a mask the output
// has none either.

use tributary_core::backend::Backend;
use tributary_core::error::Result;
use tributary_core::shape::Shape;
use tributary_core::tensor::Tensor;

/// Combine optional masks into one U8 mask of `output_shape`.
///
/// Mask values are normalised to booleans first (non-zero = valid), so
/// float 0/1 masks are accepted as well. Masks never carry gradients.
pub fn combine_masks<B: Backend>(
    masks: &[Option<Tensor<B>>],
    output_shape: &Shape,
) -> Result<Option<Tensor<B>>> {
    let mut combined: Option<Tensor<B>> = None;
    for mask in masks.iter().flatten() {
        let mask = mask.to_mask()?.broadcast_as(output_shape.clone())?;
        combined = Some(match combined {
            Some(acc) => acc.logical_and(&mask)?,
            None => mask,
        });
    }
    match combined {
        Some(mask) => Ok(Some(mask.contiguous()?.detach())),
        None => Ok(None),
    }
}
