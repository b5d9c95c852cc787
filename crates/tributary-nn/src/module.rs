// MergeLayer trait: The interface every merge layer implements
//
// A merge layer combines a list of same-role tensors from sibling branches
// into one tensor. All merge layers share the same machinery (MergeEngine)
// and differ only in the reduction they fold, so the trait needs a single
// required method: access to the engine. Everything else has a default.
//
// GENERIC OVER BACKEND:
//
// Like Tensor<B>, merge layers are generic over B: Backend, so the same
// layer runs on any backend that implements the binary kernels.

use tributary_core::backend::Backend;
use tributary_core::dynamic_shape::SymbolicShape;
use tributary_core::error::Result;
use tributary_core::tensor::Tensor;

use crate::config::LayerConfig;
use crate::merge::MergeEngine;

/// The common surface of all merge layers.
///
/// - `build()` / `compute_output_shape()`: validate input shapes ahead of data
/// - `forward()`: merge a list of tensors
/// - `forward_masked()` / `compute_mask()`: merge with per-input masks
/// - `name()` / `config()`: layer bookkeeping
///
/// # Example
/// ```ignore
/// let layer = Minimum::<CpuBackend>::new();
/// layer.build(&[shape_a, shape_b])?;
/// let y = layer.forward(&[a, b])?;
/// ```
pub trait MergeLayer<B: Backend>: Send + Sync {
    /// The engine holding this layer's reduction, config and shape cache.
    fn engine(&self) -> &MergeEngine<B>;

    /// Validate the input shapes and fix the number of inputs.
    ///
    /// Calling `build` again with the same shapes returns the cached result.
    fn build(&self, input_shapes: &[SymbolicShape]) -> Result<SymbolicShape> {
        self.engine().build(input_shapes)
    }

    /// The merged output shape for these input shapes.
    fn compute_output_shape(&self, input_shapes: &[SymbolicShape]) -> Result<SymbolicShape> {
        self.engine().compute_output_shape(input_shapes)
    }

    /// Merge `inputs` (at least two) into one tensor.
    fn forward(&self, inputs: &[Tensor<B>]) -> Result<Tensor<B>> {
        Ok(self.engine().call(inputs, None)?.0)
    }

    /// Merge `inputs` and combine their masks (one entry per input; `None`
    /// means every position of that input is valid).
    fn forward_masked(
        &self,
        inputs: &[Tensor<B>],
        masks: &[Option<Tensor<B>>],
    ) -> Result<(Tensor<B>, Option<Tensor<B>>)> {
        self.engine().call(inputs, Some(masks))
    }

    /// The output mask for these inputs and masks, or `None` if no input
    /// has a mask.
    fn compute_mask(
        &self,
        inputs: &[Tensor<B>],
        masks: &[Option<Tensor<B>>],
    ) -> Result<Option<Tensor<B>>> {
        self.engine().compute_mask(inputs, masks)
    }

    fn name(&self) -> &str {
        self.engine().name()
    }

    /// The layer configuration, with the generated name filled in.
    fn config(&self) -> &LayerConfig {
        self.engine().config()
    }

    fn is_trainable(&self) -> bool {
        self.config().trainable
    }

    /// Merge layers own no weights.
    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![]
    }
}
