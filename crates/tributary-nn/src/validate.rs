// Shape validation: broadcast compatibility across all merge inputs
//
// The merged output shape is the left fold of SymbolicShape::broadcast over
// the input shapes. The fold is order-independent in its result; the order
// only decides which incompatible pair is reported first.
//
//   [2, 3], [1, 3]        → [2, 3]
//   [?, 8], [4, 8], [8]   → [4, 8]
//   [3], [4]              → MergeShapeMismatch at dim 0

use tributary_core::dynamic_shape::SymbolicShape;
use tributary_core::error::{Error, Result};

/// Check that `shapes` can be merged and return the merged output shape.
///
/// `layer` names the calling layer in arity errors.
pub fn validate_shapes(layer: &str, shapes: &[SymbolicShape]) -> Result<SymbolicShape> {
    if shapes.len() < 2 {
        return Err(Error::Arity {
            layer: layer.to_string(),
            got: shapes.len(),
        });
    }
    shapes[1..]
        .iter()
        .try_fold(shapes[0].clone(), |acc, s| acc.broadcast(s))
}
