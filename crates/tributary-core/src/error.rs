use crate::dynamic_shape::SymbolicShape;
use crate::shape::Shape;

/// All errors that can occur within Tributary.
///
/// Tensor-level failures (dtype, element count, broadcasting) and the
/// structural failures of merge layers share one enum so that `?` works
/// across the backend, the tensor runtime and the layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A merge layer received fewer than two inputs.
    #[error("layer `{layer}` must be called on a list of at least 2 inputs, got {got}")]
    Arity { layer: String, got: usize },

    /// The number of inputs (or masks) differs from what the layer was built with.
    #[error("layer `{layer}` expects {expected} inputs, got {got}")]
    ArityMismatch {
        layer: String,
        expected: usize,
        got: usize,
    },

    /// Two merge inputs have incompatible concrete dimensions.
    ///
    /// `dim` indexes the right-aligned (broadcast) output shape.
    #[error("cannot merge shapes {lhs} and {rhs}: incompatible sizes at dimension {dim}")]
    MergeShapeMismatch {
        lhs: SymbolicShape,
        rhs: SymbolicShape,
        dim: usize,
    },

    /// Two concrete tensor shapes cannot be broadcast together.
    #[error("shapes {lhs} and {rhs} are not broadcast-compatible (dim {dim} from right: {lhs_dim} vs {rhs_dim})")]
    BroadcastIncompatible {
        lhs: Shape,
        rhs: Shape,
        dim: usize,
        lhs_dim: usize,
        rhs_dim: usize,
    },

    /// Shape mismatch between two tensors where an exact match is required.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// DType mismatch between tensors in a binary operation.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Tried to access a scalar from a non-scalar tensor.
    #[error("not a scalar: tensor has shape {shape}")]
    NotAScalar { shape: Shape },

    /// Element count mismatch when creating from a vec.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Cannot reshape because element counts differ.
    #[error(
        "cannot reshape: source has {src} elements, target shape {dst_shape} has {dst} elements"
    )]
    ReshapeElementMismatch {
        src: usize,
        dst: usize,
        dst_shape: Shape,
    },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Tributary.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
