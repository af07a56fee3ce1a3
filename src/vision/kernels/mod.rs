//! Int8 reference kernels.
//!
//! Every kernel is split in two: `prepare` runs once at engine init,
//! validating shapes against the graph and precomputing requantization
//! multipliers; `eval` runs per inference over raw arena bytes and cannot
//! fail.

pub mod conv;
pub mod elementwise;
pub mod fully_connected;
pub mod layout;
pub mod pooling;
pub mod reduce;
pub mod softmax;

use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef, Padding, TensorDef};
use crate::vision::quant::{DType, FixedMultiplier, QuantParams};

/// Dimensions of an NHWC tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape4 {
    pub n: usize,
    pub h: usize,
    pub w: usize,
    pub c: usize,
}

impl Shape4 {
    pub fn of(t: &TensorDef<'_>) -> Result<Self, VisionError> {
        match t.shape.as_slice() {
            &[n, h, w, c] => Ok(Self {
                n: n as usize,
                h: h as usize,
                w: w as usize,
                c: c as usize,
            }),
            _ => Err(VisionError::ModelInvalid("expected rank-4 NHWC tensor")),
        }
    }

    #[inline]
    pub fn index(&self, b: usize, y: usize, x: usize, c: usize) -> usize {
        ((b * self.h + y) * self.w + x) * self.c + c
    }
}

/// Element type and quantization of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activ {
    pub dtype: DType,
    pub quant: QuantParams,
}

impl Activ {
    pub fn of(t: &TensorDef<'_>) -> Result<Self, VisionError> {
        if !t.dtype.is_activation() || t.is_constant() {
            return Err(VisionError::ModelInvalid("operator activation must be a non-constant 8-bit tensor"));
        }
        Ok(Self {
            dtype: t.dtype,
            quant: t.quant,
        })
    }

    /// Like [`Activ::of`], but also admits the float tensor a trailing
    /// dequantize produces.
    pub fn output_of(t: &TensorDef<'_>) -> Result<Self, VisionError> {
        if t.dtype == DType::Float32 && !t.is_constant() {
            return Ok(Self {
                dtype: t.dtype,
                quant: t.quant,
            });
        }
        Self::of(t)
    }

    /// Real value of the element stored in `bytes`.
    #[inline]
    pub fn real(&self, bytes: &[u8]) -> f32 {
        match self.dtype {
            DType::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            dtype => self.quant.dequantize(dtype.load(bytes[0])),
        }
    }
}

/// The operator's activation input and output tensors.
pub fn io<'g, 'm>(graph: &'g ModelGraph<'m>, op: &OperatorDef) -> Result<(&'g TensorDef<'m>, &'g TensorDef<'m>), VisionError> {
    let input = graph.tensor(op.inputs[0]);
    let output = graph.tensor(op.output);
    Activ::of(input)?;
    Activ::of(output)?;
    Ok((input, output))
}

/// Ops that only move bytes require matching element types and scales.
pub fn require_same_quant(a: &TensorDef<'_>, b: &TensorDef<'_>) -> Result<(), VisionError> {
    if a.dtype != b.dtype || a.quant != b.quant {
        return Err(VisionError::ModelInvalid("input and output quantization differ"));
    }
    Ok(())
}

/// Output extent and leading padding along one spatial axis.
pub fn window_geometry(input: usize, filter: usize, stride: usize, padding: Padding) -> Result<(usize, usize), VisionError> {
    if stride == 0 || filter == 0 {
        return Err(VisionError::ModelInvalid("zero stride or filter"));
    }
    match padding {
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = ((out - 1) * stride + filter).saturating_sub(input);
            Ok((out, needed / 2))
        }
        Padding::Valid => {
            if filter > input {
                return Err(VisionError::ModelInvalid("filter larger than input"));
            }
            Ok(((input - filter) / stride + 1, 0))
        }
    }
}

/// Symmetric int8 filter: constant data plus one scale per output channel.
pub struct Filter<'m> {
    pub data: &'m [u8],
    pub scales: Vec<f32>,
}

impl<'m> Filter<'m> {
    pub fn of(t: &TensorDef<'m>, channels: usize) -> Result<Self, VisionError> {
        let data = t.data.ok_or(VisionError::ModelInvalid("filter must be constant"))?;
        if t.dtype != DType::Int8 {
            return Err(VisionError::ModelInvalid("filter must be int8"));
        }
        if t.quant.zero_point != 0 {
            return Err(VisionError::ModelInvalid("filter must be symmetric"));
        }
        let scales = match &t.channel_scales {
            Some(s) if s.len() == channels => s.clone(),
            Some(_) => return Err(VisionError::ModelInvalid("per-channel scale count")),
            None => vec![t.quant.scale; channels],
        };
        if scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(VisionError::ModelInvalid("filter scale must be positive"));
        }
        Ok(Self { data, scales })
    }

    #[inline]
    pub fn at(&self, i: usize) -> i32 {
        i32::from(self.data[i] as i8)
    }

    /// `in_scale * filter_scale[c] / out_scale` for every output channel.
    pub fn multipliers(&self, input: QuantParams, output: QuantParams) -> Vec<FixedMultiplier> {
        self.scales
            .iter()
            .map(|&s| {
                FixedMultiplier::from_real(f64::from(input.scale) * f64::from(s) / f64::from(output.scale))
            })
            .collect()
    }
}

/// Decode an optional int32 bias vector of `len` entries.
pub fn bias(graph: &ModelGraph<'_>, op: &OperatorDef, len: usize) -> Result<Vec<i32>, VisionError> {
    let Some(&idx) = op.inputs.get(2) else {
        return Ok(vec![0; len]);
    };
    let t = graph.tensor(idx);
    let data = t.data.ok_or(VisionError::ModelInvalid("bias must be constant"))?;
    if t.dtype != DType::Int32 || t.elements() != len {
        return Err(VisionError::ModelInvalid("bias must be int32 with one entry per channel"));
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

pub fn expect_shape(t: &TensorDef<'_>, want: Shape4) -> Result<(), VisionError> {
    if Shape4::of(t)? != want {
        log::error!("output shape {:?} but kernel produces {:?}", t.shape, want);
        return Err(VisionError::ModelInvalid("operator output shape mismatch"));
    }
    Ok(())
}
