// MergeEngine: shared machinery behind every merge layer
//
// LIFECYCLE:
//
//   build(shapes)   validate a shape signature once, cache the output shape
//   call(inputs)    build from the concrete input shapes (cache hit after the
//                   first call), fold the reduction left to right, combine
//                   the masks independently
//
// The first successful build fixes the number of inputs the engine accepts.
//
// The cache is keyed by the exact signature, so every distinct concrete
// shape seen by call() adds an entry (one per batch size or sequence length).
// Entries are never evicted on their own; clear_cache() drops them all and
// keeps the fixed arity.
//
// CONCURRENCY:
//
//   The engine is shared by reference across threads (Send + Sync). Its only
//   state is the validated-shape cache and the fixed arity.
//
//   - cache hits take the read lock only
//   - a new signature is validated with no lock held, then inserted under
//     the write lock with entry().or_insert(), so a racing duplicate keeps
//     the first value and readers never see a partial entry
//   - the arity is a OnceLock, set at most once

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use tracing::{debug, trace};

use tributary_core::backend::Backend;
use tributary_core::dynamic_shape::SymbolicShape;
use tributary_core::error::{Error, Result};
use tributary_core::shape::Shape;
use tributary_core::tensor::Tensor;

use crate::config::LayerConfig;
use crate::mask::combine_masks;
use crate::reduction::Reduction;
use crate::validate::validate_shapes;

/// Validated output shapes keyed by input shape signature.
type ShapeCache = HashMap<Vec<SymbolicShape>, SymbolicShape>;

/// Validation, caching, folding and mask propagation for one merge layer.
///
/// Validated signatures are cached exactly as given. A layer fed many
/// distinct concrete shapes keeps one entry per shape until
/// [`MergeEngine::clear_cache`] is called.
pub struct MergeEngine<B: Backend> {
    reduction: Reduction<B>,
    config: LayerConfig,
    cache: RwLock<ShapeCache>,
    arity: OnceLock<usize>,
}

impl<B: Backend> std::fmt::Debug for MergeEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine")
            .field("name", &self.name())
            .field("reduction", &self.reduction.name())
            .field("arity", &self.arity.get())
            .finish()
    }
}

impl<B: Backend> MergeEngine<B> {
    /// Create an engine; an unnamed config gets a unique name derived from
    /// the reduction ("minimum", "minimum_1", ...).
    pub fn new(reduction: Reduction<B>, config: LayerConfig) -> Self {
        let config = config.resolve_name(reduction.name());
        MergeEngine {
            reduction,
            config,
            cache: RwLock::new(HashMap::new()),
            arity: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or(self.reduction.name())
    }

    /// The resolved configuration (name always set).
    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn reduction(&self) -> &Reduction<B> {
        &self.reduction
    }

    /// Number of inputs fixed by the first successful build.
    pub fn arity(&self) -> Option<usize> {
        self.arity.get().copied()
    }

    pub fn is_built(&self) -> bool {
        self.arity.get().is_some()
    }

    /// Number of distinct shape signatures validated so far.
    pub fn cached_signatures(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Forget every validated signature. The arity fixed by the first build
    /// stays, so the engine remains built.
    pub fn clear_cache(&self) -> Result<()> {
        self.cache
            .write()
            .map_err(|_| Error::msg("merge shape cache lock poisoned"))?
            .clear();
        debug!(layer = %self.name(), "shape cache cleared");
        Ok(())
    }

    fn arity_mismatch(&self, expected: usize, got: usize) -> Error {
        Error::ArityMismatch {
            layer: self.name().to_string(),
            expected,
            got,
        }
    }

    fn check_arity(&self, got: usize) -> Result<()> {
        if got < 2 {
            return Err(Error::Arity {
                layer: self.name().to_string(),
                got,
            });
        }
        if let Some(expected) = self.reduction.exact_arity() {
            if got != expected {
                return Err(self.arity_mismatch(expected, got));
            }
        }
        match self.arity.get() {
            Some(&expected) if expected != got => Err(self.arity_mismatch(expected, got)),
            _ => Ok(()),
        }
    }

    /// Validate `input_shapes` and return the merged output shape.
    ///
    /// Known signatures are answered from the cache. Building again with
    /// the same signature is a no-op that returns the same shape.
    pub fn build(&self, input_shapes: &[SymbolicShape]) -> Result<SymbolicShape> {
        self.check_arity(input_shapes.len())?;

        let cached = self
            .cache
            .read()
            .map_err(|_| Error::msg("merge shape cache lock poisoned"))?
            .get(input_shapes)
            .cloned();
        if let Some(shape) = cached {
            trace!(layer = %self.name(), output = %shape, "shape cache hit");
            return Ok(shape);
        }

        let shape = validate_shapes(self.name(), input_shapes)?;
        let fixed = *self.arity.get_or_init(|| input_shapes.len());
        if fixed != input_shapes.len() {
            return Err(self.arity_mismatch(fixed, input_shapes.len()));
        }
        debug!(
            layer = %self.name(),
            signature = ?input_shapes,
            output = %shape,
            "validated new shape signature"
        );

        let mut cache = self
            .cache
            .write()
            .map_err(|_| Error::msg("merge shape cache lock poisoned"))?;
        Ok(cache.entry(input_shapes.to_vec()).or_insert(shape).clone())
    }

    /// Output shape for `input_shapes`; goes through the same cache as `build`.
    pub fn compute_output_shape(&self, input_shapes: &[SymbolicShape]) -> Result<SymbolicShape> {
        self.build(input_shapes)
    }

    /// Cast to the configured compute dtype, then build from the concrete shapes.
    fn prepare(&self, inputs: &[Tensor<B>]) -> Result<(Vec<Tensor<B>>, Shape)> {
        self.check_arity(inputs.len())?;
        let inputs = match self.config.dtype {
            Some(dtype) => inputs
                .iter()
                .map(|x| x.to_dtype(dtype))
                .collect::<Result<Vec<_>>>()?,
            None => inputs.to_vec(),
        };
        let signature: Vec<SymbolicShape> = inputs.iter().map(|x| x.shape().into()).collect();
        let output = self.build(&signature)?;
        let output = output.to_shape().ok_or_else(|| {
            Error::msg(format!(
                "layer `{}`: concrete inputs produced unknown output shape {output}",
                self.name()
            ))
        })?;
        Ok((inputs, output))
    }

    fn check_masks(&self, inputs: &[Tensor<B>], masks: &[Option<Tensor<B>>]) -> Result<()> {
        if masks.len() != inputs.len() {
            return Err(self.arity_mismatch(inputs.len(), masks.len()));
        }
        Ok(())
    }

    /// Merge `inputs`, combining `masks` (one per input) when given.
    pub fn call(
        &self,
        inputs: &[Tensor<B>],
        masks: Option<&[Option<Tensor<B>>]>,
    ) -> Result<(Tensor<B>, Option<Tensor<B>>)> {
        if let Some(masks) = masks {
            self.check_masks(inputs, masks)?;
        }
        let (inputs, output_shape) = self.prepare(inputs)?;
        let output = self.reduction.apply(&inputs)?;
        let mask = match masks {
            Some(masks) => combine_masks(masks, &output_shape)?,
            None => None,
        };
        trace!(
            layer = %self.name(),
            inputs = inputs.len(),
            output = %output.shape(),
            masked = mask.is_some(),
            "merge call"
        );
        Ok((output, mask))
    }

    /// The mask `call` would return for these inputs, without merging them.
    pub fn compute_mask(
        &self,
        inputs: &[Tensor<B>],
        masks: &[Option<Tensor<B>>],
    ) -> Result<Option<Tensor<B>>> {
        self.check_masks(inputs, masks)?;
        let (_, output_shape) = self.prepare(inputs)?;
        combine_masks(masks, &output_shape)
    }
}
