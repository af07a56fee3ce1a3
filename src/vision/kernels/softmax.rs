use super::{Activ, io};
use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef};

/// Softmax over the innermost axis. Computed in float and requantized to the
/// output tensor; the output may be int8 or uint8.
pub struct Softmax {
    input: Activ,
    output: Activ,
    rows: usize,
    depth: usize,
    beta: f32,
}

impl Softmax {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef, beta: f32) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        if input_t.shape != output_t.shape {
            return Err(VisionError::ModelInvalid("softmax changes shape"));
        }
        if !beta.is_finite() || beta <= 0.0 {
            return Err(VisionError::ModelInvalid("softmax beta must be positive"));
        }
        let depth = input_t.shape.last().copied().unwrap_or(1) as usize;
        Ok(Self {
            input: Activ::of(input_t)?,
            output: Activ::of(output_t)?,
            rows: input_t.elements() / depth,
            depth,
            beta,
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let (lo, hi) = self.output.dtype.range();
        let (in_q, out_q) = (self.input.quant, self.output.quant);
        for r in 0..self.rows {
            let row = &input[r * self.depth..(r + 1) * self.depth];
            let max = row.iter().map(|&b| self.input.dtype.load(b)).max().unwrap_or(0);
            let exps = row
                .iter()
                .map(|&b| (self.beta * in_q.scale * (self.input.dtype.load(b) - max) as f32).exp());
            let total: f32 = exps.clone().sum();
            for (d, e) in exps.enumerate() {
                let q = (e / total / out_q.scale).round() as i32 + out_q.zero_point;
                output[r * self.depth + d] = self.output.dtype.store(q.clamp(lo, hi));
            }
        }
    }
}
