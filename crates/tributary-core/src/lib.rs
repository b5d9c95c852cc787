//! # tributary-core
//!
//! Core tensor primitives, types, backend traits, and autograd for Tributary.
//!
//! This crate provides:
//! - [`Tensor`]: n-dimensional array with automatic differentiation
//! - [`Shape`] / [`Layout`]: shape, strides, and memory layout
//! - [`SymbolicShape`] / [`SymDim`]: build-time shapes with unknown dims
//! - [`DType`]: data types (F16, BF16, F32, F64, U8)
//! - [`Backend`] trait: abstraction over compute backends
//! - [`GradStore`]: gradient storage returned by `backward()`

pub mod backend;
pub mod backprop;
pub mod dtype;
pub mod dynamic_shape;
pub mod error;
pub mod layout;
pub mod op;
pub mod shape;
pub mod tensor;

pub use backend::{Backend, BackendDevice, BackendStorage, BinaryOp, CmpOp};
pub use backprop::GradStore;
pub use dtype::{DType, WithDType};
pub use dynamic_shape::{SymDim, SymbolicShape};
pub use error::{Error, Result};
pub use layout::{Layout, StridedIter};
pub use op::{Op, TensorId};
pub use shape::Shape;
pub use tensor::Tensor;
