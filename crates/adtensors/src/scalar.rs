//! Scalar trait for tensor element types.

use faer_traits::ComplexField;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Element type tag, queryable at runtime.
///
/// The footprint accountant sizes reclaimable memory through this tag; a
/// type can only obtain a `DType` by implementing [`Scalar`], so every
/// tensor has a known element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn bytes_per_element(&self) -> u64 {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// Lowercase type name.
    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

/// Trait for scalar types supported by adtensors.
///
/// This wraps faer's `ComplexField` (so tensors can flow into faer's GEMM)
/// with the element-wise float math the forward kernels and VJPs need.
pub trait Scalar:
    ComplexField
    + Copy
    + Debug
    + Default
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + 'static
{
    /// Runtime type tag.
    const DTYPE: DType;

    /// Returns the additive identity (zero).
    fn zero() -> Self {
        Self::default()
    }

    /// Returns the multiplicative identity (one).
    fn one() -> Self;

    /// Lossy conversion from `f64`, used for op attributes and constants.
    fn from_f64(v: f64) -> Self;

    /// Lossy conversion to `f64`, used for accounting and diagnostics.
    fn to_f64(self) -> f64;

    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn tanh(self) -> Self;
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
}

impl Scalar for f32 {
    const DTYPE: DType = DType::F32;

    fn one() -> Self {
        1.0
    }

    fn from_f64(v: f64) -> Self {
        v as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn exp(self) -> Self {
        f32::exp(self)
    }

    fn ln(self) -> Self {
        f32::ln(self)
    }

    fn tanh(self) -> Self {
        f32::tanh(self)
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    fn abs(self) -> Self {
        f32::abs(self)
    }
}

impl Scalar for f64 {
    const DTYPE: DType = DType::F64;

    fn one() -> Self {
        1.0
    }

    fn from_f64(v: f64) -> Self {
        v
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn tanh(self) -> Self {
        f64::tanh(self)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(DType::F32.bytes_per_element(), 4);
        assert_eq!(DType::F64.bytes_per_element(), 8);
        assert_eq!(<f32 as Scalar>::DTYPE, DType::F32);
        assert_eq!(<f64 as Scalar>::DTYPE, DType::F64);
    }

    #[test]
    fn test_zero_one() {
        assert_eq!(<f64 as Scalar>::zero(), 0.0);
        assert_eq!(<f64 as Scalar>::one(), 1.0);
        assert_eq!(<f32 as Scalar>::one(), 1.0f32);
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(<f32 as Scalar>::from_f64(0.5), 0.5f32);
        assert_eq!(<f64 as Scalar>::from_f64(0.5), 0.5);
    }
}
