//! Affine quantization and the fixed-point arithmetic the int8 kernels use.
//!
//! `real = scale * (q - zero_point)`.  Requantization between tensors is done
//! entirely in integer arithmetic: a real multiplier `M` is represented as a
//! Q31 mantissa plus a power-of-two exponent, and applied with a saturating
//! rounding doubling high multiply followed by a rounding right shift.

use serde::{Deserialize, Serialize};

/// Per-tensor affine quantization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub const fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// Quantize a real value into the signed 8-bit range.
    ///
    /// Rounds half to even, matching the C `lrintf` default rounding mode.
    pub fn quantize_i8(&self, real: f32) -> i8 {
        let q = (real / self.scale + self.zero_point as f32).round_ties_even();
        q.clamp(i8::MIN as f32, i8::MAX as f32) as i8
    }

    pub fn dequantize(&self, q: i32) -> f32 {
        (q - self.zero_point) as f32 * self.scale
    }

    pub fn is_valid(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0
    }
}

/// A real multiplier encoded as `mantissa * 2^shift`, mantissa in Q31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedMultiplier {
    pub mantissa: i32,
    pub shift: i32,
}

impl FixedMultiplier {
    /// Decompose `real` into a Q31 mantissa in [0.5, 1) and an exponent.
    pub fn from_real(real: f64) -> Self {
        if real <= 0.0 || !real.is_finite() {
            return Self::default();
        }
        let mut q = real;
        let mut shift = 0i32;
        while q >= 1.0 {
            q /= 2.0;
            shift += 1;
        }
        while q < 0.5 {
            q *= 2.0;
            shift -= 1;
        }
        let mut mantissa = (q * f64::from(1u32 << 31)).round() as i64;
        if mantissa == 1i64 << 31 {
            mantissa /= 2;
            shift += 1;
        }
        if shift < -31 {
            return Self::default();
        }
        if shift > 30 {
            // Saturates every non-zero input anyway.
            return Self {
                mantissa: i32::MAX,
                shift: 30,
            };
        }
        Self {
            mantissa: mantissa as i32,
            shift,
        }
    }

    /// `round(x * real)` in pure integer arithmetic.
    pub fn apply(self, x: i32) -> i32 {
        let left = self.shift.clamp(0, 30);
        let right = (-self.shift).max(0);
        let scaled = x.saturating_mul(1i32 << left);
        rounding_divide_by_pot(saturating_rounding_doubling_high_mul(scaled, self.mantissa), right)
    }
}

/// High 32 bits of `2 * a * b`, rounded, saturating the single overflow case.
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let ab = i64::from(a) * i64::from(b);
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Arithmetic right shift rounding to nearest, ties away from zero.
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    if exponent <= 0 {
        return x;
    }
    let exponent = exponent.min(31);
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + i32::from(x < 0);
    (x >> exponent) + i32::from(remainder > threshold)
}

/// Storage type of a tensor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    Int8,
    UInt8,
    /// Bias vectors only; never an activation.
    Int32,
    /// Dequantized graph outputs only.
    Float32,
}

impl DType {
    pub const fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int32 | Self::Float32 => 4,
        }
    }

    /// Representable range of an 8-bit activation.
    pub const fn range(self) -> (i32, i32) {
        match self {
            Self::Int8 => (i8::MIN as i32, i8::MAX as i32),
            Self::UInt8 => (0, u8::MAX as i32),
            Self::Int32 | Self::Float32 => (i32::MIN, i32::MAX),
        }
    }

    pub const fn is_activation(self) -> bool {
        matches!(self, Self::Int8 | Self::UInt8)
    }

    /// Widen one stored activation byte.
    #[inline]
    pub fn load(self, byte: u8) -> i32 {
        match self {
            Self::Int8 => i32::from(byte as i8),
            _ => i32::from(byte),
        }
    }

    /// Narrow a value already clamped into [`Self::range`].
    #[inline]
    pub fn store(self, value: i32) -> u8 {
        match self {
            Self::Int8 => value as i8 as u8,
            _ => value as u8,
        }
    }
}

/// Fused activation applied by a kernel before narrowing to 8 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    None,
    Relu,
    Relu6,
}

impl Activation {
    /// Clamp bounds in the output tensor's quantized domain.
    pub fn clamp_range(self, out: QuantParams, dtype: DType) -> (i32, i32) {
        let q = |real: f32| out.zero_point.saturating_add((real / out.scale).round() as i32);
        let (lo, hi) = dtype.range();
        match self {
            Self::None => (lo, hi),
            Self::Relu => (q(0.0).max(lo), hi),
            Self::Relu6 => (q(0.0).max(lo), q(6.0).min(hi)),
        }
    }
}

/// Lookup table mapping an 8-bit channel value (0–255) to the model input.
///
/// Built once from the input tensor's parameters; the per-pixel hot loop is a
/// table read instead of a float divide.
#[derive(Clone)]
pub struct InputQuantizer {
    lut: [i8; 256],
}

impl InputQuantizer {
    pub fn new(params: QuantParams) -> Self {
        let mut lut = [0i8; 256];
        for (value, slot) in lut.iter_mut().enumerate() {
            *slot = params.quantize_i8(value as f32 / 255.0);
        }
        Self { lut }
    }

    #[inline]
    pub fn quantize(&self, channel: u8) -> i8 {
        self.lut[channel as usize]
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn quantize_round_trip_within_one_step(
            v in 0.0f32..=1.0,
            scale in (1.0f32 / 255.0)..=(1.0f32 / 100.0),
            zero_point in -128i32..=-27,
        ) {
            let p = QuantParams::new(scale, zero_point);
            let q = p.quantize_i8(v);
            let back = p.dequantize(i32::from(q));
            prop_assert!((back - v).abs() <= scale,
                "v={} q={} back={} scale={}", v, q, back, scale);
        }

        #[test]
        fn fixed_multiplier_within_one_of_float(
            real in 0.0001f64..64.0,
            x in -1_000_000i32..1_000_000,
        ) {
            let m = FixedMultiplier::from_real(real);
            let expected = (f64::from(x) * real).round();
            let got = f64::from(m.apply(x));
            prop_assert!((got - expected).abs() <= 1.0);
        }
    }
}
