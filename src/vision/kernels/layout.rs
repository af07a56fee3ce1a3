//! Byte-moving operators: spatial zero padding and reshape.

use super::{Shape4, expect_shape, io, require_same_quant};
use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef, PadAmounts};

/// Pads H and W of an NHWC tensor with the quantized zero.
pub struct Pad {
    in_shape: Shape4,
    out_shape: Shape4,
    top: usize,
    left: usize,
    fill: u8,
}

impl Pad {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef, amounts: PadAmounts) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        require_same_quant(input_t, output_t)?;
        let in_shape = Shape4::of(input_t)?;
        let out_shape = Shape4 {
            h: in_shape.h + usize::from(amounts.top) + usize::from(amounts.bottom),
            w: in_shape.w + usize::from(amounts.left) + usize::from(amounts.right),
            ..in_shape
        };
        expect_shape(output_t, out_shape)?;
        let (lo, hi) = output_t.dtype.range();
        let fill = output_t.dtype.store(output_t.quant.zero_point.clamp(lo, hi));
        Ok(Self {
            in_shape,
            out_shape,
            top: usize::from(amounts.top),
            left: usize::from(amounts.left),
            fill,
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        output.fill(self.fill);
        let (is, os) = (self.in_shape, self.out_shape);
        let row = is.w * is.c;
        for b in 0..is.n {
            for y in 0..is.h {
                let src = is.index(b, y, 0, 0);
                let dst = os.index(b, y + self.top, self.left, 0);
                output[dst..dst + row].copy_from_slice(&input[src..src + row]);
            }
        }
    }
}

/// Same bytes, new shape.
pub struct Reshape {
    len: usize,
}

impl Reshape {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        require_same_quant(input_t, output_t)?;
        if input_t.elements() != output_t.elements() {
            return Err(VisionError::ModelInvalid("reshape changes element count"));
        }
        Ok(Self {
            len: output_t.byte_len(),
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        output[..self.len].copy_from_slice(&input[..self.len]);
    }
}
