//! Standard and depthwise 2-D convolution.

use super::{Activ, Filter, Shape4, bias, expect_shape, io, window_geometry};
use crate::error::VisionError;
use crate::vision::model::{ConvOptions, DepthwiseOptions, ModelGraph, OperatorDef};
use crate::vision::quant::FixedMultiplier;

/// Spatial walk shared by both convolutions.
#[derive(Debug, Clone, Copy)]
struct Window {
    kh: usize,
    kw: usize,
    stride_h: usize,
    stride_w: usize,
    pad_top: usize,
    pad_left: usize,
}

impl Window {
    /// Input coordinate for output `o` and tap `k`, if inside the frame.
    #[inline]
    fn source(o: usize, k: usize, stride: usize, pad: usize, extent: usize) -> Option<usize> {
        (o * stride + k).checked_sub(pad).filter(|&i| i < extent)
    }
}

pub struct Conv2D<'m> {
    input: Activ,
    output: Activ,
    in_shape: Shape4,
    out_shape: Shape4,
    window: Window,
    filter: Filter<'m>,
    bias: Vec<i32>,
    multipliers: Vec<FixedMultiplier>,
    clamp: (i32, i32),
}

impl<'m> Conv2D<'m> {
    pub fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef, opts: ConvOptions) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        let in_shape = Shape4::of(input_t)?;
        let filter_t = graph.tensor(op.inputs[1]);
        let fs = Shape4::of(filter_t)?;
        if fs.c != in_shape.c {
            return Err(VisionError::ModelInvalid("conv filter depth differs from input channels"));
        }
        let (oh, pad_top) = window_geometry(in_shape.h, fs.h, usize::from(opts.stride_h), opts.padding)?;
        let (ow, pad_left) = window_geometry(in_shape.w, fs.w, usize::from(opts.stride_w), opts.padding)?;
        let out_shape = Shape4 {
            n: in_shape.n,
            h: oh,
            w: ow,
            c: fs.n,
        };
        expect_shape(output_t, out_shape)?;

        let input = Activ::of(input_t)?;
        let output = Activ::of(output_t)?;
        let filter = Filter::of(filter_t, fs.n)?;
        let multipliers = filter.multipliers(input.quant, output.quant);
        Ok(Self {
            input,
            output,
            in_shape,
            out_shape,
            window: Window {
                kh: fs.h,
                kw: fs.w,
                stride_h: usize::from(opts.stride_h),
                stride_w: usize::from(opts.stride_w),
                pad_top,
                pad_left,
            },
            bias: bias(graph, op, fs.n)?,
            filter,
            multipliers,
            clamp: opts.activation.clamp_range(output.quant, output.dtype),
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let (is, os, w) = (self.in_shape, self.out_shape, self.window);
        let in_zp = self.input.quant.zero_point;
        let taps = w.kh * w.kw * is.c;

        for b in 0..os.n {
            for oy in 0..os.h {
                for ox in 0..os.w {
                    for oc in 0..os.c {
                        let mut acc = self.bias[oc];
                        for ky in 0..w.kh {
                            let Some(iy) = Window::source(oy, ky, w.stride_h, w.pad_top, is.h) else {
                                continue;
                            };
                            for kx in 0..w.kw {
                                let Some(ix) = Window::source(ox, kx, w.stride_w, w.pad_left, is.w) else {
                                    continue;
                                };
                                let src = is.index(b, iy, ix, 0);
                                let tap = oc * taps + (ky * w.kw + kx) * is.c;
                                for ic in 0..is.c {
                                    let x = self.input.dtype.load(input[src + ic]) - in_zp;
                                    acc = acc.wrapping_add(x * self.filter.at(tap + ic));
                                }
                            }
                        }
                        let v = self.multipliers[oc].apply(acc) + self.output.quant.zero_point;
                        output[os.index(b, oy, ox, oc)] =
                            self.output.dtype.store(v.clamp(self.clamp.0, self.clamp.1));
                    }
                }
            }
        }
    }
}

pub struct DepthwiseConv2D<'m> {
    input: Activ,
    output: Activ,
    in_shape: Shape4,
    out_shape: Shape4,
    window: Window,
    depth_multiplier: usize,
    filter: Filter<'m>,
    bias: Vec<i32>,
    multipliers: Vec<FixedMultiplier>,
    clamp: (i32, i32),
}

impl<'m> DepthwiseConv2D<'m> {
    pub fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef, opts: DepthwiseOptions) -> Result<Self, VisionError> {
        let (input_t, output_t) = io(graph, op)?;
        let in_shape = Shape4::of(input_t)?;
        let filter_t = graph.tensor(op.inputs[1]);
        let fs = Shape4::of(filter_t)?;
        let depth_multiplier = usize::from(opts.depth_multiplier.max(1));
        if fs.n != 1 || fs.c != in_shape.c * depth_multiplier {
            return Err(VisionError::ModelInvalid("depthwise filter must be [1, kh, kw, in_c * multiplier]"));
        }
        let (oh, pad_top) = window_geometry(in_shape.h, fs.h, usize::from(opts.stride_h), opts.padding)?;
        let (ow, pad_left) = window_geometry(in_shape.w, fs.w, usize::from(opts.stride_w), opts.padding)?;
        let out_shape = Shape4 {
            n: in_shape.n,
            h: oh,
            w: ow,
            c: fs.c,
        };
        expect_shape(output_t, out_shape)?;

        let input = Activ::of(input_t)?;
        let output = Activ::of(output_t)?;
        let filter = Filter::of(filter_t, fs.c)?;
        let multipliers = filter.multipliers(input.quant, output.quant);
        Ok(Self {
            input,
            output,
            in_shape,
            out_shape,
            window: Window {
                kh: fs.h,
                kw: fs.w,
                stride_h: usize::from(opts.stride_h),
                stride_w: usize::from(opts.stride_w),
                pad_top,
                pad_left,
            },
            depth_multiplier,
            bias: bias(graph, op, fs.c)?,
            filter,
            multipliers,
            clamp: opts.activation.clamp_range(output.quant, output.dtype),
        })
    }

    pub fn eval(&self, input: &[u8], output: &mut [u8]) {
        let (is, os, w) = (self.in_shape, self.out_shape, self.window);
        let in_zp = self.input.quant.zero_point;

        for b in 0..os.n {
            for oy in 0..os.h {
                for ox in 0..os.w {
                    for oc in 0..os.c {
                        let ic = oc / self.depth_multiplier;
                        let mut acc = self.bias[oc];
                        for ky in 0..w.kh {
                            let Some(iy) = Window::source(oy, ky, w.stride_h, w.pad_top, is.h) else {
                                continue;
                            };
                            for kx in 0..w.kw {
                                let Some(ix) = Window::source(ox, kx, w.stride_w, w.pad_left, is.w) else {
                                    continue;
                                };
                                let x = self.input.dtype.load(input[is.index(b, iy, ix, ic)]) - in_zp;
                                let tap = (ky * w.kw + kx) * os.c + oc;
                                acc = acc.wrapping_add(x * self.filter.at(tap));
                            }
                        }
                        let v = self.multipliers[oc].apply(acc) + self.output.quant.zero_point;
                        output[os.index(b, oy, ox, oc)] =
                            self.output.dtype.store(v.clamp(self.clamp.0, self.clamp.1));
                    }
                }
            }
        }
    }
}
