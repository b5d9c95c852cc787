// Merge layers: one MergeEngine per layer, differing only in the reduction
//
//   Minimum    elementwise minimum of all inputs
//   Maximum    elementwise maximum of all inputs
//   Add        sum of all inputs
//   Subtract   inputs[0] - inputs[1] (exactly two inputs)
//   Multiply   product of all inputs
//   Average    mean of all inputs
//
// Each layer also has a functional form that builds a layer for a single
// call:
//
//   let y = minimum(&[a, b, c], LayerConfig::default())?;
//   // same as Minimum::from_config(LayerConfig::default()).forward(&[a, b, c])

use tributary_core::backend::Backend;
use tributary_core::error::Result;
use tributary_core::tensor::Tensor;

use crate::config::LayerConfig;
use crate::merge::MergeEngine;
use crate::module::MergeLayer;
use crate::reduction::Reduction;

/// Computes the elementwise minimum of a list of inputs.
///
/// Inputs must be broadcast-compatible; the output has their broadcast
/// shape. NaN in any input propagates to the output.
///
/// Gradients reach only the input that supplied the minimum at each
/// position. When several inputs tie, the earliest of them receives it.
///
/// # Examples
/// ```ignore
/// let layer = Minimum::<CpuBackend>::new();
/// let y = layer.forward(&[a, b])?; // [[1, 5, 3]], [[4, 2, 6]] → [[1, 2, 3]]
/// ```
pub struct Minimum<B: Backend> {
    engine: MergeEngine<B>,
}

impl<B: Backend> Minimum<B> {
    /// Create a Minimum layer with a generated name ("minimum", "minimum_1", ...).
    pub fn new() -> Self {
        Self::from_config(LayerConfig::default())
    }

    /// Rebuild a layer from its configuration.
    pub fn from_config(config: LayerConfig) -> Self {
        Minimum {
            engine: MergeEngine::new(Reduction::minimum(), config),
        }
    }
}

impl<B: Backend> Default for Minimum<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MergeLayer<B> for Minimum<B> {
    fn engine(&self) -> &MergeEngine<B> {
        &self.engine
    }
}

/// Elementwise maximum of a list of inputs. Ties route the gradient to the
/// earliest input.
pub struct Maximum<B: Backend> {
    engine: MergeEngine<B>,
}

impl<B: Backend> Maximum<B> {
    pub fn new() -> Self {
        Self::from_config(LayerConfig::default())
    }

    pub fn from_config(config: LayerConfig) -> Self {
        Maximum {
            engine: MergeEngine::new(Reduction::maximum(), config),
        }
    }
}

impl<B: Backend> Default for Maximum<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MergeLayer<B> for Maximum<B> {
    fn engine(&self) -> &MergeEngine<B> {
        &self.engine
    }
}

/// Sum of a list of inputs.
pub struct Add<B: Backend> {
    engine: MergeEngine<B>,
}

impl<B: Backend> Add<B> {
    pub fn new() -> Self {
        Self::from_config(LayerConfig::default())
    }

    pub fn from_config(config: LayerConfig) -> Self {
        Add {
            engine: MergeEngine::new(Reduction::add(), config),
        }
    }
}

impl<B: Backend> Default for Add<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MergeLayer<B> for Add<B> {
    fn engine(&self) -> &MergeEngine<B> {
        &self.engine
    }
}

/// Difference of exactly two inputs: `inputs[0] - inputs[1]`.
///
/// Building or calling with any other number of inputs is an
/// `ArityMismatch` error.
pub struct Subtract<B: Backend> {
    engine: MergeEngine<B>,
}

impl<B: Backend> Subtract<B> {
    pub fn new() -> Self {
        Self::from_config(LayerConfig::default())
    }

    pub fn from_config(config: LayerConfig) -> Self {
        Subtract {
            engine: MergeEngine::new(Reduction::subtract(), config),
        }
    }
}

impl<B: Backend> Default for Subtract<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MergeLayer<B> for Subtract<B> {
    fn engine(&self) -> &MergeEngine<B> {
        &self.engine
    }
}

/// Elementwise product of a list of inputs.
pub struct Multiply<B: Backend> {
    engine: MergeEngine<B>,
}

impl<B: Backend> Multiply<B> {
    pub fn new() -> Self {
        Self::from_config(LayerConfig::default())
    }

    pub fn from_config(config: LayerConfig) -> Self {
        Multiply {
            engine: MergeEngine::new(Reduction::multiply(), config),
        }
    }
}

impl<B: Backend> Default for Multiply<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MergeLayer<B> for Multiply<B> {
    fn engine(&self) -> &MergeEngine<B> {
        &self.engine
    }
}

/// Elementwise mean of a list of inputs.
pub struct Average<B: Backend> {
    engine: MergeEngine<B>,
}

impl<B: Backend> Average<B> {
    pub fn new() -> Self {
        Self::from_config(LayerConfig::default())
    }

    pub fn from_config(config: LayerConfig) -> Self {
        Average {
            engine: MergeEngine::new(Reduction::average(), config),
        }
    }
}

impl<B: Backend> Default for Average<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> MergeLayer<B> for Average<B> {
    fn engine(&self) -> &MergeEngine<B> {
        &self.engine
    }
}

// Functional interface

/// Elementwise minimum of `inputs` through a one-off [`Minimum`] layer.
pub fn minimum<B: Backend>(inputs: &[Tensor<B>], config: LayerConfig) -> Result<Tensor<B>> {
    Minimum::from_config(config).forward(inputs)
}

/// Elementwise maximum of `inputs` through a one-off [`Maximum`] layer.
pub fn maximum<B: Backend>(inputs: &[Tensor<B>], config: LayerConfig) -> Result<Tensor<B>> {
    Maximum::from_config(config).forward(inputs)
}

pub fn add<B: Backend>(inputs: &[Tensor<B>], config: LayerConfig) -> Result<Tensor<B>> {
    Add::from_config(config).forward(inputs)
}

pub fn subtract<B: Backend>(inputs: &[Tensor<B>], config: LayerConfig) -> Result<Tensor<B>> {
    Subtract::from_config(config).forward(inputs)
}

pub fn multiply<B: Backend>(inputs: &[Tensor<B>], config: LayerConfig) -> Result<Tensor<B>> {
    Multiply::from_config(config).forward(inputs)
}

pub fn average<B: Backend>(inputs: &[Tensor<B>], config: LayerConfig) -> Result<Tensor<B>> {
    Average::from_config(config).forward(inputs)
}
