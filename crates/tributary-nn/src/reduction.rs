// Reduction: the elementwise operation a merge layer folds over its inputs
//
// A Reduction is a plain value: a name, a binary fold function, an optional
// finaliser applied once after the fold, and an optional exact arity.
//
//   minimum   fold = min(a, b)
//   maximum   fold = max(a, b)
//   add       fold = a + b
//   multiply  fold = a * b
//   average   fold = a + b,  finalise = acc * (1 / n)
//   subtract  fold = a - b,  exactly 2 inputs
//
// Every MergeEngine runs the same fold loop regardless of which reduction
// it carries; adding a merge variant means adding a constructor here.

use std::fmt;

use tributary_core::backend::Backend;
use tributary_core::error::{Error, Result};
use tributary_core::tensor::Tensor;

/// `(accumulator, next) -> accumulator`
pub type FoldFn<B> = fn(&Tensor<B>, &Tensor<B>) -> Result<Tensor<B>>;

/// `(accumulator, input count) -> output`
pub type FinalizeFn<B> = fn(Tensor<B>, usize) -> Result<Tensor<B>>;

/// A pluggable n-ary elementwise reduction.
pub struct Reduction<B: Backend> {
    name: &'static str,
    fold: FoldFn<B>,
    finalize: Option<FinalizeFn<B>>,
    exact_arity: Option<usize>,
}

impl<B: Backend> Clone for Reduction<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Reduction<B> {}

impl<B: Backend> fmt::Debug for Reduction<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reduction")
            .field("name", &self.name)
            .field("finalize", &self.finalize.is_some())
            .field("exact_arity", &self.exact_arity)
            .finish()
    }
}

impl<B: Backend> Reduction<B> {
    /// A reduction from a bare fold function.
    pub fn new(name: &'static str, fold: FoldFn<B>) -> Self {
        Reduction {
            name,
            fold,
            finalize: None,
            exact_arity: None,
        }
    }

    /// Run `finalize` on the folded result.
    pub fn with_finalize(mut self, finalize: FinalizeFn<B>) -> Self {
        self.finalize = Some(finalize);
        self
    }

    /// Require exactly `n` inputs.
    pub fn with_exact_arity(mut self, n: usize) -> Self {
        self.exact_arity = Some(n);
        self
    }

    /// Elementwise minimum. Ties send the gradient to the earlier input.
    pub fn minimum() -> Self {
        Self::new("minimum", Tensor::<B>::minimum)
    }

    /// Elementwise maximum. Ties send the gradient to the earlier input.
    pub fn maximum() -> Self {
        Self::new("maximum", Tensor::<B>::maximum)
    }

    pub fn add() -> Self {
        Self::new("add", Tensor::<B>::add)
    }

    pub fn multiply() -> Self {
        Self::new("multiply", Tensor::<B>::mul)
    }

    /// Sum of the inputs scaled by `1 / n`.
    pub fn average() -> Self {
        Self::new("average", Tensor::<B>::add)
            .with_finalize(|acc, n| acc.affine(1.0 / n as f64, 0.0))
    }

    /// `inputs[0] - inputs[1]`.
    pub fn subtract() -> Self {
        Self::new("subtract", Tensor::<B>::sub).with_exact_arity(2)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The exact number of inputs this reduction accepts, if restricted.
    pub fn exact_arity(&self) -> Option<usize> {
        self.exact_arity
    }

    /// Fold the reduction over `inputs` left to right, then finalise.
    pub fn apply(&self, inputs: &[Tensor<B>]) -> Result<Tensor<B>> {
        let (first, rest) = match inputs.split_first() {
            Some(split) => split,
            None => {
                return Err(Error::Arity {
                    layer: self.name.to_string(),
                    got: 0,
                })
            }
        };
        let acc = rest
            .iter()
            .try_fold(first.clone(), |acc, x| (self.fold)(&acc, x))?;
        match self.finalize {
            Some(finalize) => finalize(acc, inputs.len()),
            None => Ok(acc),
        }
    }
}
