use super::{Activ, Shape4, io};
use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef};
use crate::vision::quant::FixedMultiplier;

/// Spatial mean of an NHWC tensor, `[n, h, w, c] → [n, c]` (any shape with
/// `n * c` elements is accepted as output).
pub struct Mean {
    input: Activ,
    output: Activ,
    in_shape: Shape4,
    multiplier: FixedMultiplier,
}

impl Mean {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        let in_shape = Shape4::of(input_t)?;
        if output_t.elements() != in_shape.n * in_shape.c {
            return Err(VisionError::ModelInvalid("operator output shape mismatch"));
        }
        let input = Activ::of(input_t)?;
        let output = Activ::of(output_t)?;
        let count = (in_shape.h * in_shape.w) as f64;
        let multiplier =
            FixedMultiplier::from_real(f64::from(input.quant.scale) / (f64::from(output.quant.scale) * count));
        Ok(Self {
            input,
            output,
            in_shape,
            multiplier,
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let s = self.in_shape;
        let (lo, hi) = self.output.dtype.range();
        for b in 0..s.n {
            for c in 0..s.c {
                let mut sum = 0i32;
                for y in 0..s.h {
                    for x in 0..s.w {
                        sum += self.input.dtype.load(input[s.index(b, y, x, c)]) - self.input.quant.zero_point;
                    }
                }
                let v = self.multiplier.apply(sum) + self.output.quant.zero_point;
                output[b * s.c + c] = self.output.dtype.store(v.clamp(lo, hi));
            }
        }
    }
}
