//! # Tributary
//!
//! Merge layers that combine the outputs of sibling branches into a single
//! tensor, on top of a small backend-generic tensor runtime.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use tributary::prelude::*;
//!
//! # fn main() -> tributary::Result<()> {
//! let a = CpuTensor::from_f64_slice(&[1.0, 5.0, 3.0], (1, 3), DType::F32, &CpuDevice)?;
//! let b = CpuTensor::from_f64_slice(&[4.0, 2.0, 6.0], (1, 3), DType::F32, &CpuDevice)?;
//! let y = Minimum::<CpuBackend>::new().forward(&[a, b])?;
//! assert_eq!(y.to_f64_vec()?, vec![1.0, 2.0, 3.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `tributary-core` | Tensor, Shape, SymbolicShape, DType, Layout, Backend trait, Autograd |
//! | `tributary-cpu` | CPU backend with rayon parallelism |
//! | `tributary-nn` | Merge layers (Minimum, Maximum, Add, Subtract, Multiply, Average) |

/// Re-export core types.
pub use tributary_core::{
    backend::{Backend, BackendDevice, BackendStorage, BinaryOp, CmpOp},
    op::{Op, TensorId},
    DType, Error, GradStore, Layout, Result, Shape, SymDim, SymbolicShape, Tensor, WithDType,
};

/// Re-export CPU backend.
pub use tributary_cpu::{CpuBackend, CpuDevice, CpuStorage, CpuTensor};

/// Re-export merge layers.
pub mod nn {
    pub use tributary_nn::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::nn::{
        Add, Average, LayerConfig, Maximum, MergeEngine, MergeLayer, Minimum, Multiply, Reduction,
        Subtract,
    };
    pub use crate::{
        CpuBackend, CpuDevice, CpuTensor, DType, GradStore, Shape, SymDim, SymbolicShape, Tensor,
    };
}
