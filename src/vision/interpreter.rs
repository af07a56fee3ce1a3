//! Graph interpreter bound to one arena.
//!
//! Construction resolves every operator against an [`OpResolver`], prepares
//! its kernel, and plans every activation tensor into the arena. After that
//! `invoke` only walks the prepared steps.

use core::ops::Range;

use log::{debug, error};

use super::arena::{ArenaStorage, BufferRequest, as_i8_mut, plan_offsets};
use super::kernels::{
    Activ,
    conv::{Conv2D, DepthwiseConv2D},
    elementwise::{Add, Dequantize, Mul, Quantize},
    fully_connected::FullyConnected,
    layout::{Pad, Reshape},
    pooling::{Pool, PoolKind},
    reduce::Mean,
    softmax::Softmax,
};
use super::model::{ModelGraph, Op, OpKind, OperatorDef, Shape};
use crate::error::VisionError;

// ---------------------------------------------------------------------------
// Operator registration
// ---------------------------------------------------------------------------

/// Set of operators the interpreter is allowed to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpResolver {
    registered: u16,
}

impl OpResolver {
    pub const fn new() -> Self {
        Self { registered: 0 }
    }

    pub const fn with(mut self, kind: OpKind) -> Self {
        self.registered |= 1 << kind as u8;
        self
    }

    /// Operators used by the pest classifier.
    pub const fn classifier() -> Self {
        Self::new()
            .with(OpKind::Conv2D)
            .with(OpKind::DepthwiseConv2D)
            .with(OpKind::AveragePool2D)
            .with(OpKind::MaxPool2D)
            .with(OpKind::FullyConnected)
            .with(OpKind::Mean)
            .with(OpKind::Reshape)
            .with(OpKind::Pad)
            .with(OpKind::Softmax)
            .with(OpKind::Add)
            .with(OpKind::Mul)
            .with(OpKind::Quantize)
            .with(OpKind::Dequantize)
    }

    pub const fn contains(&self, kind: OpKind) -> bool {
        self.registered & (1 << kind as u8) != 0
    }
}

// ---------------------------------------------------------------------------
// Prepared steps
// ---------------------------------------------------------------------------

enum Kernel<'m> {
    Conv2D(Conv2D<'m>),
    DepthwiseConv2D(DepthwiseConv2D<'m>),
    Pool(Pool),
    FullyConnected(FullyConnected<'m>),
    Mean(Mean),
    Reshape(Reshape),
    Pad(Pad),
    Softmax(Softmax),
    Add(Add<'m>),
    Mul(Mul<'m>),
    Quantize(Quantize),
    Dequantize(Dequantize),
}

impl<'m> Kernel<'m> {
    fn prepare(graph: &ModelGraph<'m>, op: &OperatorDef) -> Result<Self, VisionError> {
        Ok(match op.op {
            Op::Conv2D(o) => Self::Conv2D(Conv2D::prepare(graph, op, o)?),
            Op::DepthwiseConv2D(o) => Self::DepthwiseConv2D(DepthwiseConv2D::prepare(graph, op, o)?),
            Op::AveragePool2D(o) => Self::Pool(Pool::prepare(graph, op, o, PoolKind::Average)?),
            Op::MaxPool2D(o) => Self::Pool(Pool::prepare(graph, op, o, PoolKind::Max)?),
            Op::FullyConnected { activation } => {
                Self::FullyConnected(FullyConnected::prepare(graph, op, activation)?)
            }
            Op::Mean => Self::Mean(Mean::prepare(graph, op)?),
            Op::Reshape => Self::Reshape(Reshape::prepare(graph, op)?),
            Op::Pad(amounts) => Self::Pad(Pad::prepare(graph, op, amounts)?),
            Op::Softmax { beta } => Self::Softmax(Softmax::prepare(graph, op, beta)?),
            Op::Add { activation } => Self::Add(Add::prepare(graph, op, activation)?),
            Op::Mul { activation } => Self::Mul(Mul::prepare(graph, op, activation)?),
            Op::Quantize => Self::Quantize(Quantize::prepare(graph, op)?),
            Op::Dequantize => Self::Dequantize(Dequantize::prepare(graph, op)?),
        })
    }

    fn eval(&self, input: &[u8], aux: Option<&[u8]>, output: &mut [u8]) {
        match self {
            Self::Conv2D(k) => k.eval(input, output),
            Self::DepthwiseConv2D(k) => k.eval(input, output),
            Self::Pool(k) => k.eval(input, output),
            Self::FullyConnected(k) => k.eval(input, output),
            Self::Mean(k) => k.eval(input, output),
            Self::Reshape(k) => k.eval(input, output),
            Self::Pad(k) => k.eval(input, output),
            Self::Softmax(k) => k.eval(input, output),
            Self::Add(k) => k.eval(input, aux, output),
            Self::Mul(k) => k.eval(input, aux, output),
            Self::Quantize(k) => k.eval(input, output),
            Self::Dequantize(k) => k.eval(input, output),
        }
    }
}

struct Step<'m> {
    kind: OpKind,
    kernel: Kernel<'m>,
    input: Range<usize>,
    /// Second operand when it lives in the arena.
    aux: Option<Range<usize>>,
    output: Range<usize>,
}

/// Dequantizing view of the graph output.
pub struct OutputTensor<'a> {
    data: &'a [u8],
    activ: Activ,
}

impl OutputTensor<'_> {
    pub fn len(&self) -> usize {
        self.data.len() / self.activ.dtype.size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn scores(&self) -> impl Iterator<Item = f32> + '_ {
        self.data
            .chunks_exact(self.activ.dtype.size())
            .map(|bytes| self.activ.real(bytes))
    }
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

pub struct Interpreter<'m> {
    arena: ArenaStorage,
    steps: Vec<Step<'m>>,
    input: Range<usize>,
    input_activ: Activ,
    input_shape: Shape,
    output: Range<usize>,
    output_activ: Activ,
    arena_used: usize,
}

impl<'m> Interpreter<'m> {
    pub fn new(graph: &ModelGraph<'m>, resolver: &OpResolver, arena: ArenaStorage) -> Result<Self, VisionError> {
        let mut kernels = Vec::with_capacity(graph.operators.len());
        for (i, op) in graph.operators.iter().enumerate() {
            let kind = op.op.kind();
            if !resolver.contains(kind) {
                error!("operator #{} ({:?}) is not registered", i, kind);
                return Err(VisionError::ModelInvalid("unregistered operator"));
            }
            kernels.push((kind, Kernel::prepare(graph, op)?));
        }

        let lifetimes = tensor_lifetimes(graph)?;
        let planned: Vec<(usize, BufferRequest)> = lifetimes
            .iter()
            .enumerate()
            .filter_map(|(t, span)| {
                span.map(|(first_use, last_use)| {
                    (t, BufferRequest {
                        size: graph.tensors[t].byte_len(),
                        first_use,
                        last_use,
                    })
                })
            })
            .collect();
        let requests: Vec<BufferRequest> = planned.iter().map(|&(_, r)| r).collect();
        let (offsets, used) = plan_offsets(&requests);
        if used > arena.len() {
            error!("tensor plan needs {} bytes, arena holds {}", used, arena.len());
            return Err(VisionError::OutOfMemory { requested: used });
        }
        debug!("tensor plan: {} buffers, {} of {} arena bytes", requests.len(), used, arena.len());

        let mut regions = vec![0..0; graph.tensors.len()];
        for ((t, req), offset) in planned.iter().zip(offsets) {
            regions[*t] = offset..offset + req.size;
        }

        let steps = kernels
            .into_iter()
            .zip(&graph.operators)
            .map(|((kind, kernel), op)| Step {
                kind,
                kernel,
                input: regions[op.inputs[0] as usize].clone(),
                aux: arena_inputs(graph, op).nth(1).map(|t| regions[t].clone()),
                output: regions[op.output as usize].clone(),
            })
            .collect();

        let input_t = graph.tensor(graph.input);
        let output_t = graph.tensor(graph.output);
        Ok(Self {
            arena,
            steps,
            input: regions[graph.input as usize].clone(),
            input_activ: Activ::of(input_t)?,
            input_shape: input_t.shape.clone(),
            output: regions[graph.output as usize].clone(),
            output_activ: Activ::output_of(output_t)?,
            arena_used: used,
        })
    }

    pub fn input_activ(&self) -> Activ {
        self.input_activ
    }

    pub fn input_shape(&self) -> &[u32] {
        &self.input_shape
    }

    pub fn input_mut(&mut self) -> &mut [i8] {
        as_i8_mut(&mut self.arena[self.input.clone()])
    }

    pub fn output(&self) -> OutputTensor<'_> {
        OutputTensor {
            data: &self.arena[self.output.clone()],
            activ: self.output_activ,
        }
    }

    pub fn arena_used(&self) -> usize {
        self.arena_used
    }

    /// One forward pass over the current input tensor.
    pub fn invoke(&mut self) -> Result<(), VisionError> {
        for (i, step) in self.steps.iter().enumerate() {
            let Some((input, aux, output)) = split_io(&mut self.arena, &step.input, step.aux.as_ref(), &step.output)
            else {
                error!("operator #{} ({:?}): input and output regions overlap", i, step.kind);
                return Err(VisionError::InferenceFailed("arena regions overlap"));
            };
            step.kernel.eval(input, aux, output);
        }
        Ok(())
    }
}

/// First and last operator index during which each activation tensor is
/// live; `None` for constants and tensors the graph never touches.
fn tensor_lifetimes(graph: &ModelGraph<'_>) -> Result<Vec<Option<(usize, usize)>>, VisionError> {
    let last_op = graph.operators.len();
    let mut spans: Vec<Option<(usize, usize)>> = vec![None; graph.tensors.len()];
    spans[graph.input as usize] = Some((0, 0));

    for (i, op) in graph.operators.iter().enumerate() {
        for input in arena_inputs(graph, op) {
            match spans[input].as_mut() {
                Some(span) => span.1 = i,
                None => return Err(VisionError::ModelInvalid("tensor read before it is written")),
            }
        }
        let out = op.output as usize;
        if spans[out].is_some() {
            return Err(VisionError::ModelInvalid("tensor written twice"));
        }
        spans[out] = Some((i, i));
    }

    match spans[graph.output as usize].as_mut() {
        Some(span) if graph.output != graph.input => span.1 = last_op,
        _ => return Err(VisionError::ModelInvalid("graph output is never produced")),
    }
    Ok(spans)
}

/// Operator inputs that are activation tensors in the arena. The first one
/// always is; a binary op's second one is skipped when it is a constant.
fn arena_inputs<'g>(graph: &'g ModelGraph<'_>, op: &'g OperatorDef) -> impl Iterator<Item = usize> + 'g {
    op.inputs
        .iter()
        .take(op.op.activation_inputs())
        .enumerate()
        .filter(|&(n, &t)| n == 0 || !graph.tensor(t).is_constant())
        .map(|(_, &t)| t as usize)
}

/// Borrow the input regions immutably and the output region mutably from
/// the same arena. `None` if an input overlaps the output or a region falls
/// outside the arena.
fn split_io<'a>(
    arena: &'a mut [u8],
    input: &Range<usize>,
    aux: Option<&Range<usize>>,
    output: &Range<usize>,
) -> Option<(&'a [u8], Option<&'a [u8]>, &'a mut [u8])> {
    if output.end > arena.len() {
        return None;
    }
    let (lo, rest) = arena.split_at_mut(output.start);
    let (out, hi) = rest.split_at_mut(output.len());
    let (lo, hi): (&'a [u8], &'a [u8]) = (lo, hi);
    let pick = |r: &Range<usize>| {
        if r.end <= output.start {
            lo.get(r.clone())
        } else if r.start >= output.end {
            hi.get(r.start - output.end..r.end - output.end)
        } else {
            None
        }
    };
    let input = pick(input)?;
    let aux = match aux {
        Some(r) => Some(pick(r)?),
        None => None,
    };
    Some((input, aux, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::model::{ModelBuilder, PadAmounts, Padding, PoolOptions};
    use crate::vision::quant::{Activation, DType, QuantParams};

    fn q() -> QuantParams {
        QuantParams::new(1.0, 0)
    }

    /// pad → mean → fully connected → softmax
    fn chain_blob() -> Vec<u8> {
        let mut b = ModelBuilder::new();
        let x = b.activation(DType::Int8, &[1, 2, 2, 3], q());
        let padded = b.activation(DType::Int8, &[1, 4, 4, 3], q());
        let pooled = b.activation(DType::Int8, &[1, 3], q());
        let w = b.constant_i8(&[2, 3], q(), &[1, 0, 0, 0, 0, 1]);
        let logits = b.activation(DType::Int8, &[1, 2], QuantParams::new(0.1, 0));
        let probs = b.activation(DType::Int8, &[1, 2], QuantParams::new(1.0 / 256.0, -128));
        b.operator(
            Op::Pad(PadAmounts {
                top: 1,
                bottom: 1,
                left: 1,
                right: 1,
            }),
            &[x],
            padded,
        );
        b.operator(Op::Mean, &[padded], pooled);
        b.operator(Op::FullyConnected { activation: Activation::None }, &[pooled, w], logits);
        b.operator(Op::Softmax { beta: 1.0 }, &[logits], probs);
        b.build(x, probs).unwrap()
    }

    #[test]
    fn runs_a_small_chain() {
        let blob = chain_blob();
        let graph = ModelGraph::parse(&blob).unwrap();
        let arena = ArenaStorage::heap(4096).unwrap();
        let mut interp = Interpreter::new(&graph, &OpResolver::classifier(), arena).unwrap();
        assert_eq!(interp.input_shape(), &[1, 2, 2, 3]);

        // Red channel bright, blue channel dark.
        for px in interp.input_mut().chunks_exact_mut(3) {
            px.copy_from_slice(&[64, 0, -64]);
        }
        interp.invoke().unwrap();
        let scores: Vec<f32> = interp.output().scores().collect();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > 0.99, "{scores:?}");
        assert!(scores[1] < 0.01, "{scores:?}");
    }

    #[test]
    fn unregistered_operator_is_rejected() {
        let blob = chain_blob();
        let graph = ModelGraph::parse(&blob).unwrap();
        let arena = ArenaStorage::heap(4096).unwrap();
        let resolver = OpResolver::new()
            .with(OpKind::Pad)
            .with(OpKind::Mean)
            .with(OpKind::FullyConnected);
        assert_eq!(
            Interpreter::new(&graph, &resolver, arena).err(),
            Some(VisionError::ModelInvalid("unregistered operator"))
        );
    }

    #[test]
    fn plan_larger_than_arena_is_out_of_memory() {
        let blob = chain_blob();
        let graph = ModelGraph::parse(&blob).unwrap();
        let arena = ArenaStorage::heap(32).unwrap();
        assert!(matches!(
            Interpreter::new(&graph, &OpResolver::classifier(), arena),
            Err(VisionError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn out_of_order_graph_is_rejected() {
        let mut b = ModelBuilder::new();
        let x = b.activation(DType::Int8, &[1, 2, 2, 1], q());
        let mid = b.activation(DType::Int8, &[1, 2, 2, 1], q());
        let y = b.activation(DType::Int8, &[1, 4], q());
        b.operator(Op::Reshape, &[mid], y);
        b.operator(Op::Reshape, &[x], mid);
        let blob = b.build(x, y).unwrap();
        let graph = ModelGraph::parse(&blob).unwrap();
        let arena = ArenaStorage::heap(256).unwrap();
        assert!(Interpreter::new(&graph, &OpResolver::classifier(), arena).is_err());
    }

    #[test]
    fn split_io_rejects_overlap() {
        let mut arena = [0u8; 32];
        assert!(split_io(&mut arena, &(0..8), None, &(16..24)).is_some());
        assert!(split_io(&mut arena, &(16..24), None, &(0..8)).is_some());
        assert!(split_io(&mut arena, &(0..8), None, &(4..12)).is_none());
        assert!(split_io(&mut arena, &(0..8), None, &(30..40)).is_none());
        assert!(split_io(&mut arena, &(24..40), None, &(0..8)).is_none());
    }

    #[test]
    fn split_io_hands_out_both_operands() {
        let mut arena: Vec<u8> = (0..32).collect();
        let (a, b, out) = split_io(&mut arena, &(0..4), Some(&(24..28)), &(8..12)).unwrap();
        assert_eq!(a, &[0, 1, 2, 3]);
        assert_eq!(b, Some(&[24u8, 25, 26, 27][..]));
        assert_eq!(out.len(), 4);

        // The same tensor may feed both operands.
        assert!(split_io(&mut arena, &(0..4), Some(&(0..4)), &(8..12)).is_some());
        assert!(split_io(&mut arena, &(0..4), Some(&(6..10)), &(8..12)).is_none());
    }

    /// Two pooled branches summed, then dequantized to float.
    #[test]
    fn binary_graph_keeps_both_branches_live() {
        let mut b = ModelBuilder::new();
        let x = b.activation(DType::Int8, &[1, 2, 2, 2], q());
        let mean = b.activation(DType::Int8, &[1, 2], q());
        let maxed = b.activation(DType::Int8, &[1, 1, 1, 2], q());
        let sum = b.activation(DType::Int8, &[1, 2], q());
        let scaled = b.activation(DType::Int8, &[1, 2], q());
        let half = b.constant_i8(&[1], QuantParams::new(0.5, 0), &[1]);
        let real = b.activation(DType::Float32, &[1, 2], q());
        b.operator(Op::Mean, &[x], mean);
        b.operator(
            Op::MaxPool2D(PoolOptions {
                filter_h: 2,
                filter_w: 2,
                stride_h: 2,
                stride_w: 2,
                padding: Padding::Valid,
                activation: Activation::None,
            }),
            &[x],
            maxed,
        );
        b.operator(Op::Add { activation: Activation::None }, &[mean, maxed], sum);
        b.operator(Op::Mul { activation: Activation::None }, &[sum, half], scaled);
        b.operator(Op::Dequantize, &[scaled], real);
        let blob = b.build(x, real).unwrap();
        let graph = ModelGraph::parse(&blob).unwrap();
        let mut interp = Interpreter::new(&graph, &OpResolver::classifier(), ArenaStorage::heap(256).unwrap()).unwrap();

        // channel 0: 2, 4, 6, 12 → mean 6, max 12; channel 1: all -4
        interp.input_mut().copy_from_slice(&[2, -4, 4, -4, 6, -4, 12, -4]);
        interp.invoke().unwrap();
        let out = interp.output();
        assert_eq!(out.len(), 2);
        let scores: Vec<f32> = out.scores().collect();
        assert_eq!(scores, [9.0, -4.0]);
    }
}
