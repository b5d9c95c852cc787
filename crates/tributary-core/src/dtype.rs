use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// DType: Supported numeric data types
//
// Every tensor has a DType that determines its element size and numeric
// behavior. We support the most common types for deep learning:
//
//   F16  16-bit IEEE half float, for mixed-precision training
//   BF16 16-bit brain float, for mixed-precision training
//   F32  32-bit float, the default workhorse
//   F64  64-bit float, for high-precision work
//   U8   unsigned byte, the storage type of boolean masks
//
// DType is part of a layer's configuration. It serializes to the short
// names used by Display ("f32", "bf16", ...) and parses both those and the
// long spellings found in exported model configs ("float32", "bfloat16").

/// Enum of all supported element data types.
///
/// This is stored inside every tensor so we can dispatch operations
/// to the correct typed implementation at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
}

impl DType {
    /// Whether this dtype is a floating-point type (needed for gradient tracking).
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32 | DType::F64)
    }

    /// Whether this is a half-precision type (F16 or BF16).
    pub fn is_half(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16)
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "f16" | "float16" | "half" => Ok(DType::F16),
            "bf16" | "bfloat16" => Ok(DType::BF16),
            "f32" | "float32" | "float" => Ok(DType::F32),
            "f64" | "float64" | "double" => Ok(DType::F64),
            "u8" | "uint8" | "bool" => Ok(DType::U8),
            other => Err(Error::msg(format!("unknown dtype `{other}`"))),
        }
    }
}

impl TryFrom<String> for DType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<DType> for String {
    fn from(dtype: DType) -> String {
        dtype.to_string()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
        };
        write!(f, "{}", s)
    }
}

// WithDType: maps Rust element types onto DType
//
// Backends store typed buffers (Vec<f32>, Vec<half::bf16>, ...) and go
// through f64 for the generic elementwise kernels.

/// Trait implemented by Rust types that can be stored in a tensor.
///
/// Provides the mapping between the concrete Rust type and the DType enum,
/// plus conversions to/from f64 for numeric operations.
pub trait WithDType: Copy + Send + Sync + 'static + num_traits::NumCast + std::fmt::Debug {
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// The zero value.
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    /// The one value.
    fn one() -> Self {
        Self::from_f64(1.0)
    }
}

impl WithDType for f32 {
    const DTYPE: DType = DType::F32;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
}

impl WithDType for f64 {
    const DTYPE: DType = DType::F64;
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
}

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}

impl WithDType for u8 {
    const DTYPE: DType = DType::U8;
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_is_half() {
        assert!(DType::F16.is_half());
        assert!(DType::BF16.is_half());
        assert!(!DType::F32.is_half());
        assert!(!DType::F64.is_half());
    }

    #[test]
    fn test_parse_long_and_short_names() {
        assert_eq!("float32".parse::<DType>().unwrap(), DType::F32);
        assert_eq!("bf16".parse::<DType>().unwrap(), DType::BF16);
        assert_eq!("bool".parse::<DType>().unwrap(), DType::U8);
        assert!("complex64".parse::<DType>().is_err());
        for dtype in [DType::F16, DType::BF16, DType::F32, DType::F64, DType::U8] {
            assert_eq!(dtype.to_string().parse::<DType>().unwrap(), dtype);
        }
    }

    #[test]
    fn test_with_dtype_f32_precision() {
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(f32::from_f64(0.1).to_f64(), 0.10000000149011612);
    }

    #[test]
    fn test_mask_dtype_is_not_float() {
        assert!(!DType::U8.is_float());
        assert_eq!(u8::from_f64(1.0).to_f64(), 1.0);
    }
}
