use super::{Activ, Filter, bias, io};
use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef};
use crate::vision::quant::{Activation, FixedMultiplier};

/// `out[b][u] = requant(bias[u] + Σ_d (x[b][d] - zp) * w[u][d])`.
pub struct FullyConnected<'m> {
    input: Activ,
    output: Activ,
    batches: usize,
    depth: usize,
    units: usize,
    filter: Filter<'m>,
    bias: Vec<i32>,
    multipliers: Vec<FixedMultiplier>,
    clamp: (i32, i32),
}

impl<'m> FullyConnected<'m> {
    pub fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef, activation: Activation) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        let filter_t = graph.tensor(op.inputs[1]);
        let &[units, depth] = filter_t.shape.as_slice() else {
            return Err(VisionError::ModelInvalid("fully connected filter must be [units, depth]"));
        };
        let (units, depth) = (units as usize, depth as usize);
        if input_t.elements() % depth != 0 {
            return Err(VisionError::ModelInvalid("fully connected input not a multiple of depth"));
        }
        let batches = input_t.elements() / depth;
        if output_t.elements() != batches * units {
            return Err(VisionError::ModelInvalid("operator output shape mismatch"));
        }

        let input = Activ::of(input_t)?;
        let output = Activ::of(output_t)?;
        let filter = Filter::of(filter_t, units)?;
        let multipliers = filter.multipliers(input.quant, output.quant);
        Ok(Self {
            input,
            output,
            batches,
            depth,
            units,
            bias: bias(graph, op, units)?,
            filter,
            multipliers,
            clamp: activation.clamp_range(output.quant, output.dtype),
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let in_zp = self.input.quant.zero_point;
        for b in 0..self.batches {
            let row = &input[b * self.depth..(b + 1) * self.depth];
            for u in 0..self.units {
                let weights = u * self.depth;
                let acc = row.iter().enumerate().fold(self.bias[u], |acc, (d, &x)| {
                    acc.wrapping_add((self.input.dtype.load(x) - in_zp) * self.filter.at(weights + d))
                });
                let v = self.multipliers[u].apply(acc) + self.output.quant.zero_point;
                output[b * self.units + u] = self.output.dtype.store(v.clamp(self.clamp.0, self.clamp.1));
            }
        }
    }
}
