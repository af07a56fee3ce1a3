//! Average and max pooling. Input and output share quantization, so both
//! operate directly on quantized values.

use super::{Activ, Shape4, expect_shape, io, require_same_quant, window_geometry};
use crate::error::VisionError;
use crate::vision::model::{ModelGraph, OperatorDef, PoolOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Average,
    Max,
}

pub struct Pool {
    kind: PoolKind,
    act: Activ,
    in_shape: Shape4,
    out_shape: Shape4,
    filter: (usize, usize),
    stride: (usize, usize),
    pad: (usize, usize),
    clamp: (i32, i32),
}

impl Pool {
    pub fn prepare(graph: &ModelGraph<'_>, op: &OperatorDef, opts: PoolOptions, kind: PoolKind) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        require_same_quant(input_t, output_t)?;
        let in_shape = Shape4::of(input_t)?;
        let (fh, fw) = (usize::from(opts.filter_h), usize::from(opts.filter_w));
        let (sh, sw) = (usize::from(opts.stride_h), usize::from(opts.stride_w));
        let (oh, pad_top) = window_geometry(in_shape.h, fh, sh, opts.padding)?;
        let (ow, pad_left) = window_geometry(in_shape.w, fw, sw, opts.padding)?;
        let out_shape = Shape4 {
            h: oh,
            w: ow,
            ..in_shape
        };
        expect_shape(output_t, out_shape)?;
        let act = Activ::of(output_t)?;
        Ok(Self {
            kind,
            act,
            in_shape,
            out_shape,
            filter: (fh, fw),
            stride: (sh, sw),
            pad: (pad_top, pad_left),
            clamp: opts.activation.clamp_range(act.quant, act.dtype),
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let (is, os) = (self.in_shape, self.out_shape);
        for b in 0..os.n {
            for oy in 0..os.h {
                // Window clipped to the input; padding never contributes.
                let y0 = (oy * self.stride.0).saturating_sub(self.pad.0);
                let y1 = (oy * self.stride.0 + self.filter.0).saturating_sub(self.pad.0).min(is.h);
                for ox in 0..os.w {
                    let x0 = (ox * self.stride.1).saturating_sub(self.pad.1);
                    let x1 = (ox * self.stride.1 + self.filter.1).saturating_sub(self.pad.1).min(is.w);
                    for c in 0..os.c {
                        let mut sum = 0i32;
                        let mut max = i32::MIN;
                        let mut count = 0i32;
                        for iy in y0..y1 {
                            for ix in x0..x1 {
                                let v = self.act.dtype.load(input[is.index(b, iy, ix, c)]);
                                sum += v;
                                max = max.max(v);
                                count += 1;
                            }
                        }
                        let v = match self.kind {
                            _ if count == 0 => self.act.quant.zero_point,
                            PoolKind::Max => max,
                            PoolKind::Average if sum >= 0 => (sum + count / 2) / count,
                            PoolKind::Average => (sum - count / 2) / count,
                        };
                        output[os.index(b, oy, ox, c)] = self.act.dtype.store(v.clamp(self.clamp.0, self.clamp.1));
                    }
                }
            }
        }
    }
}
