//! Element type abstraction for f32/f64 support.
//!
//! The transform engine, the phase corrector and the correction driver are
//! all generic over [`CtfFloat`], so correction runs at the precision of the
//! input data.

use num_traits::Float;
use rustfft::FftNum;
use std::fmt::Debug;

/// Floating point types accepted by the correction stage.
///
/// Combines the bounds needed by rustfft plans ([`FftNum`]), the sign test
/// and normalisation done generically by the engine and the phase flip
/// ([`Float`]) and the `Send + Sync` required to share plans across rayon
/// workers. The CTF model itself computes in f64 and narrows each value
/// with [`CtfFloat::from_f64_c`].
pub trait CtfFloat: Float + FftNum + Debug + Send + Sync + 'static {
    /// Convert an f64 constant into this type.
    fn from_f64_c(val: f64) -> Self;

    /// Convert a usize count into this type.
    fn usize_as(val: usize) -> Self;
}

impl CtfFloat for f32 {
    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }
}

impl CtfFloat for f64 {
    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_conversions() {
        let val: f32 = CtfFloat::from_f64_c(std::f64::consts::PI);
        assert!((val - std::f32::consts::PI).abs() < 1e-6);
        let n: f32 = CtfFloat::usize_as(4096);
        assert_eq!(n, 4096.0f32);
    }

    #[test]
    fn test_f64_conversions() {
        let val: f64 = CtfFloat::from_f64_c(std::f64::consts::E);
        assert_eq!(val, std::f64::consts::E);
        let n: f64 = CtfFloat::usize_as(7);
        assert_eq!(n, 7.0f64);
    }
}
