//! # tributary-nn
//!
//! Merge layers for Tributary: combine the outputs of sibling branches into
//! one tensor with an elementwise n-ary operation.
//!
//! 1. **MergeLayer trait**: `build()`, `forward()`, `forward_masked()`, ...
//! 2. **MergeEngine**: shape validation (cached per signature), the
//!    left-to-right fold, and mask propagation
//! 3. **Reduction**: the pluggable fold: minimum, maximum, add, subtract,
//!    multiply, average
//! 4. **Layers**: `Minimum`, `Maximum`, `Add`, `Subtract`, `Multiply`,
//!    `Average`, plus functional forms (`minimum(&inputs, config)`, ...)
//! 5. **LayerConfig**: name / trainable / dtype, serializable to JSON
//!
//! Layers are generic over `Backend` (like `Tensor<B>`), so the same layer
//! runs on any backend.

pub mod config;
pub mod layers;
pub mod mask;
pub mod merge;
pub mod module;
pub mod reduction;
pub mod validate;

pub use config::{unique_name, LayerConfig};
pub use layers::{
    add, average, maximum, minimum, multiply, subtract, Add, Average, Maximum, Minimum, Multiply,
    Subtract,
};
pub use mask::combine_masks;
pub use merge::MergeEngine;
pub use module::MergeLayer;
pub use reduction::{FinalizeFn, FoldFn, Reduction};
pub use validate::validate_shapes;
