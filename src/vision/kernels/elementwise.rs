//! Element-wise arithmetic and requantization.
//!
//! Binary ops take their second operand either from the arena or straight
//! from a constant in the blob. It may match the first operand element for
//! element, hold one value per channel (last axis), or be a single scalar.

use super::{Activ, io};
use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef};
use crate::vision::quant::{Activation, DType, FixedMultiplier};

/// Headroom given to both addends before they are rescaled to a common scale.
const ADD_LEFT_SHIFT: u32 = 20;

/// Second operand of a binary op.
struct Operand<'m> {
    activ: Activ,
    constant: Option<&'m [u8]>,
    len: usize,
}

impl Operand<'_> {
    fn bytes<'a>(&'a self, aux: Option<&'a [u8]>) -> Option<&'a [u8]> {
        self.constant.or(aux)?.get(..self.len)
    }
}

struct Binary<'m> {
    lhs: Activ,
    rhs: Operand<'m>,
    output: Activ,
    len: usize,
    clamp: (i32, i32),
}

impl<'m> Binary<'m> {
    fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef, activation: Activation) -> Result<Self, VisionError> {
        let (lhs_t, out_t) = io(graph, op)?;
        let rhs_t = graph.tensor(op.inputs[1]);
        if !rhs_t.dtype.is_activation() || !rhs_t.quant.is_valid() {
            return Err(VisionError::ModelInvalid("binary operand must be an 8-bit tensor"));
        }
        let len = lhs_t.elements();
        if out_t.elements() != len {
            return Err(VisionError::ModelInvalid("operator output shape mismatch"));
        }
        let rhs_len = rhs_t.elements();
        let channels = lhs_t.shape.last().map_or(1, |&c| c as usize);
        if rhs_len != len && rhs_len != channels && rhs_len != 1 {
            return Err(VisionError::ModelInvalid("operands cannot be broadcast"));
        }
        let output = Activ::of(out_t)?;
        Ok(Self {
            lhs: Activ::of(lhs_t)?,
            rhs: Operand {
                activ: Activ {
                    dtype: rhs_t.dtype,
                    quant: rhs_t.quant,
                },
                constant: rhs_t.data,
                len: rhs_len,
            },
            output,
            len,
            clamp: activation.clamp_range(output.quant, output.dtype),
        })
    }

    /// Zero-centred operand pairs, the second one broadcast.
    fn pairs<'a>(
        &'a self,
        lhs: &'a [u8],
        aux: Option<&'a [u8]>,
    ) -> Option<impl Iterator<Item = (i32, i32)> + 'a> {
        let rhs = self.rhs.bytes(aux)?;
        let lhs = lhs.get(..self.len)?;
        Some(lhs.iter().enumerate().map(move |(i, &a)| {
            let b = rhs[i % rhs.len()];
            (
                self.lhs.dtype.load(a) - self.lhs.quant.zero_point,
                self.rhs.activ.dtype.load(b) - self.rhs.activ.quant.zero_point,
            )
        }))
    }

    #[inline]
    fn store(&self, value: i32) -> u8 {
        let (lo, hi) = self.clamp;
        self.output.dtype.store((value + self.output.quant.zero_point).clamp(lo, hi))
    }
}

// ── Add ──

/// Both addends are lifted by [`ADD_LEFT_SHIFT`], rescaled to twice the
/// larger input scale, summed, then rescaled to the output.
pub struct Add<'m> {
    operands: Binary<'m>,
    lhs_multiplier: FixedMultiplier,
    rhs_multiplier: FixedMultiplier,
    out_multiplier: FixedMultiplier,
}

impl<'m> Add<'m> {
    pub fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef, activation: Activation) -> Result<Self, VisionError> {
        let operands = Binary::prepare(graph, op, activation)?;
        let lhs_scale = f64::from(operands.lhs.quant.scale);
        let rhs_scale = f64::from(operands.rhs.activ.quant.scale);
        let out_scale = f64::from(operands.output.quant.scale);
        let twice_max = 2.0 * lhs_scale.max(rhs_scale);
        Ok(Self {
            lhs_multiplier: FixedMultiplier::from_real(lhs_scale / twice_max),
            rhs_multiplier: FixedMultiplier::from_real(rhs_scale / twice_max),
            out_multiplier: FixedMultiplier::from_real(twice_max / (f64::from(1u32 << ADD_LEFT_SHIFT) * out_scale)),
            operands,
        })
    }

    pub fn eval(&self, lhs: &[u8], rhs: Option<&[u8]>, output: &mut [u8]) {
        let Some(pairs) = self.operands.pairs(lhs, rhs) else {
            return;
        };
        for (out, (a, b)) in output.iter_mut().zip(pairs) {
            let a = self.lhs_multiplier.apply(a << ADD_LEFT_SHIFT);
            let b = self.rhs_multiplier.apply(b << ADD_LEFT_SHIFT);
            *out = self.operands.store(self.out_multiplier.apply(a + b));
        }
    }
}

// ── Mul ──

pub struct Mul<'m> {
    operands: Binary<'m>,
    multiplier: FixedMultiplier,
}

impl<'m> Mul<'m> {
    pub fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef, activation: Activation) -> Result<Self, VisionError> {
        let operands = Binary::prepare(graph, op, activation)?;
        let real = f64::from(operands.lhs.quant.scale) * f64::from(operands.rhs.activ.quant.scale)
            / f64::from(operands.output.quant.scale);
        Ok(Self {
            multiplier: FixedMultiplier::from_real(real),
            operands,
        })
    }

    pub fn eval(&self, lhs: &[u8], rhs: Option<&[u8]>, output: &mut [u8]) {
        let Some(pairs) = self.operands.pairs(lhs, rhs) else {
            return;
        };
        for (out, (a, b)) in output.iter_mut().zip(pairs) {
            *out = self.operands.store(self.multiplier.apply(a * b));
        }
    }
}

// ── Quantize ──

/// Rescale an 8-bit tensor to another scale, zero point or signedness.
pub struct Quantize {
    input: Activ,
    output: Activ,
    multiplier: FixedMultiplier,
}

impl Quantize {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        if input_t.elements() != output_t.elements() {
            return Err(VisionError::ModelInvalid("operator output shape mismatch"));
        }
        let input = Activ::of(input_t)?;
        let output = Activ::of(output_t)?;
        Ok(Self {
            input,
            output,
            multiplier: FixedMultiplier::from_real(f64::from(input.quant.scale) / f64::from(output.quant.scale)),
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let (lo, hi) = self.output.dtype.range();
        for (out, &b) in output.iter_mut().zip(input) {
            let v = self.multiplier.apply(self.input.dtype.load(b) - self.input.quant.zero_point);
            *out = self.output.dtype.store((v + self.output.quant.zero_point).clamp(lo, hi));
        }
    }
}

// ── Dequantize ──

/// 8-bit tensor to little-endian `f32`.
pub struct Dequantize {
    input: Activ,
}

impl Dequantize {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef) -> Result<Self, VisionError> {
        let input_t = graph.tensor(op.inputs[0]);
        let output_t = graph.tensor(op.output);
        if output_t.dtype != DType::Float32 || output_t.is_constant() {
            return Err(VisionError::ModelInvalid("dequantize output must be a float tensor"));
        }
        if input_t.elements() != output_t.elements() {
            return Err(VisionError::ModelInvalid("operator output shape mismatch"));
        }
        Ok(Self {
            input: Activ::of(input_t)?,
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        for (out, &b) in output.chunks_exact_mut(4).zip(input) {
            let real = self.input.quant.dequantize(self.input.dtype.load(b));
            out.copy_from_slice(&real.to_le_bytes());
        }
    }
}
