//! Embedded model blob: header validation, graph decoding and a builder.
//!
//! ```text
//!   0      4        8          12                      44
//!   ┌──────┬────────┬──────────┬───────────────────────┬──────────────┐
//!   │ LGQM │ schema │ payload  │ SHA-256(payload)      │ postcard     │
//!   │      │ u32 LE │ len u32  │ 32 bytes              │ ModelGraph   │
//!   └──────┴────────┴──────────┴───────────────────────┴──────────────┘
//! ```
//!
//! Constant tensor data is borrowed straight out of the blob; nothing is
//! copied at load time.

use serde::{Deserialize, Serialize};

use crate::error::VisionError;
use crate::vision::quant::{Activation, DType, QuantParams};

pub const MAGIC: [u8; 4] = *b"LGQM";
/// Graph schema this firmware can execute.
pub const SCHEMA_VERSION: u32 = 3;
pub const HEADER_LEN: usize = 44;

/// Maximum tensor rank.
pub const MAX_RANK: usize = 4;

pub type Shape = heapless::Vec<u32, MAX_RANK>;

// ---------------------------------------------------------------------------
// Graph schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    Same,
    Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvOptions {
    pub stride_h: u16,
    pub stride_w: u16,
    pub padding: Padding,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthwiseOptions {
    pub stride_h: u16,
    pub stride_w: u16,
    pub depth_multiplier: u16,
    pub padding: Padding,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolOptions {
    pub filter_h: u16,
    pub filter_w: u16,
    pub stride_h: u16,
    pub stride_w: u16,
    pub padding: Padding,
    pub activation: Activation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PadAmounts {
    pub top: u16,
    pub bottom: u16,
    pub left: u16,
    pub right: u16,
}

/// One graph operator with its options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// inputs: activation, filter `[out_c, kh, kw, in_c]`, optional bias.
    Conv2D(ConvOptions),
    /// inputs: activation, filter `[1, kh, kw, out_c]`, optional bias.
    DepthwiseConv2D(DepthwiseOptions),
    AveragePool2D(PoolOptions),
    MaxPool2D(PoolOptions),
    /// inputs: activation, filter `[units, depth]`, optional bias.
    FullyConnected { activation: Activation },
    /// Mean over the spatial axes of an NHWC tensor.
    Mean,
    Reshape,
    Pad(PadAmounts),
    Softmax { beta: f32 },
    /// inputs: activation, activation or constant (same size, one channel
    /// vector, or a scalar).
    Add { activation: Activation },
    /// Same operand rules as [`Op::Add`].
    Mul { activation: Activation },
    /// Requantize between 8-bit types or scales.
    Quantize,
    /// 8-bit to float; only valid as the graph output.
    Dequantize,
}

/// Operator identity without options, used for registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpKind {
    Conv2D = 0,
    DepthwiseConv2D = 1,
    AveragePool2D = 2,
    MaxPool2D = 3,
    FullyConnected = 4,
    Mean = 5,
    Reshape = 6,
    Pad = 7,
    Softmax = 8,
    Add = 9,
    Mul = 10,
    Quantize = 11,
    Dequantize = 12,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Conv2D(_) => OpKind::Conv2D,
            Self::DepthwiseConv2D(_) => OpKind::DepthwiseConv2D,
            Self::AveragePool2D(_) => OpKind::AveragePool2D,
            Self::MaxPool2D(_) => OpKind::MaxPool2D,
            Self::FullyConnected { .. } => OpKind::FullyConnected,
            Self::Mean => OpKind::Mean,
            Self::Reshape => OpKind::Reshape,
            Self::Pad(_) => OpKind::Pad,
            Self::Softmax { .. } => OpKind::Softmax,
            Self::Add { .. } => OpKind::Add,
            Self::Mul { .. } => OpKind::Mul,
            Self::Quantize => OpKind::Quantize,
            Self::Dequantize => OpKind::Dequantize,
        }
    }

    /// Leading inputs read from the arena rather than from the blob.
    pub fn activation_inputs(&self) -> usize {
        match self {
            Self::Add { .. } | Self::Mul { .. } => 2,
            _ => 1,
        }
    }

    /// Accepted number of inputs (min, max).
    fn arity(&self) -> (usize, usize) {
        match self {
            Self::Conv2D(_) | Self::DepthwiseConv2D(_) | Self::FullyConnected { .. } => (2, 3),
            Self::Add { .. } | Self::Mul { .. } => (2, 2),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorDef<'a> {
    pub dtype: DType,
    pub shape: Shape,
    pub quant: QuantParams,
    /// Per-output-channel filter scales; overrides `quant.scale` when set.
    pub channel_scales: Option<Vec<f32>>,
    /// Constant contents (little-endian). `None` for activations.
    #[serde(borrow)]
    pub data: Option<&'a [u8]>,
}

impl TensorDef<'_> {
    /// Element count of a validated tensor.
    pub fn elements(&self) -> usize {
        self.shape.iter().map(|&d| d as usize).product()
    }

    pub fn byte_len(&self) -> usize {
        self.elements() * self.dtype.size()
    }

    /// Byte size, or `None` if the shape overflows `usize`.
    fn checked_byte_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(self.dtype.size(), |acc, &d| acc.checked_mul(d as usize))
    }

    pub fn is_constant(&self) -> bool {
        self.data.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    pub op: Op,
    pub inputs: heapless::Vec<u16, 3>,
    pub output: u16,
}

/// Decoded model graph. Operators are stored in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGraph<'a> {
    #[serde(borrow)]
    pub tensors: Vec<TensorDef<'a>>,
    pub operators: Vec<OperatorDef>,
    pub input: u16,
    pub output: u16,
}

impl<'a> ModelGraph<'a> {
    /// Validate the header and decode the graph from an embedded blob.
    pub fn parse(blob: &'a [u8]) -> Result<Self, VisionError> {
        if blob.len() < HEADER_LEN {
            return Err(VisionError::ModelInvalid("blob shorter than header"));
        }
        if blob[0..4] != MAGIC {
            return Err(VisionError::ModelInvalid("bad magic"));
        }
        let version = read_u32(&blob[4..8]);
        if version != SCHEMA_VERSION {
            log::error!(
                "model schema version {} not equal to supported version {}",
                version,
                SCHEMA_VERSION
            );
            return Err(VisionError::ModelIncompatible {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        let len = read_u32(&blob[8..12]) as usize;
        let payload = blob
            .get(HEADER_LEN..HEADER_LEN.saturating_add(len))
            .ok_or(VisionError::ModelInvalid("payload truncated"))?;
        if hmac_sha256::Hash::hash(payload)[..] != blob[12..HEADER_LEN] {
            return Err(VisionError::ModelInvalid("payload digest mismatch"));
        }

        let graph: Self = postcard::from_bytes(payload)
            .map_err(|_| VisionError::ModelInvalid("graph decode failed"))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Structural checks that do not depend on operator semantics.
    fn validate(&self) -> Result<(), VisionError> {
        let count = self.tensors.len();
        let in_range = |idx: u16| (idx as usize) < count;

        if !in_range(self.input) || !in_range(self.output) {
            return Err(VisionError::ModelInvalid("graph I/O tensor index out of range"));
        }
        if self.operators.is_empty() {
            return Err(VisionError::ModelInvalid("graph has no operators"));
        }
        for t in &self.tensors {
            if t.shape.is_empty() || t.shape.contains(&0) {
                return Err(VisionError::ModelInvalid("tensor with empty shape"));
            }
            let Some(byte_len) = t.checked_byte_len() else {
                return Err(VisionError::ModelInvalid("tensor size overflows"));
            };
            if !t.quant.is_valid() && t.dtype.is_activation() {
                return Err(VisionError::ModelInvalid("tensor scale must be positive"));
            }
            match t.data {
                Some(data) if data.len() != byte_len => {
                    return Err(VisionError::ModelInvalid("constant size does not match shape"));
                }
                Some(_) if t.dtype == DType::Float32 => {
                    return Err(VisionError::ModelInvalid("float tensors cannot be constant"));
                }
                None if t.dtype == DType::Int32 => {
                    return Err(VisionError::ModelInvalid("int32 tensors must be constant"));
                }
                _ => {}
            }
        }
        for op in &self.operators {
            let (min, max) = op.op.arity();
            if op.inputs.len() < min || op.inputs.len() > max {
                return Err(VisionError::ModelInvalid("operator input count"));
            }
            if !op.inputs.iter().copied().all(in_range) || !in_range(op.output) {
                return Err(VisionError::ModelInvalid("operator tensor index out of range"));
            }
        }
        Ok(())
    }

    pub fn tensor(&self, idx: u16) -> &TensorDef<'a> {
        &self.tensors[idx as usize]
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct PendingTensor {
    dtype: DType,
    shape: Shape,
    quant: QuantParams,
    channel_scales: Option<Vec<f32>>,
    data: Option<Vec<u8>>,
}

/// Assembles a model blob in memory.
///
/// Used by host tooling and tests to produce blobs in exactly the format
/// [`ModelGraph::parse`] accepts.
///
/// ```
/// use lidguard::vision::model::{ModelBuilder, Op};
/// use lidguard::vision::quant::{DType, QuantParams};
///
/// let mut b = ModelBuilder::new();
/// let input = b.activation(DType::Int8, &[1, 2, 2, 3], QuantParams::new(1.0 / 255.0, -128));
/// let output = b.activation(DType::Int8, &[1, 3], QuantParams::new(1.0 / 255.0, -128));
/// b.operator(Op::Mean, &[input], output);
/// let blob = b.build(input, output).unwrap();
/// assert_eq!(&blob[..4], b"LGQM");
/// ```
pub struct ModelBuilder {
    tensors: Vec<PendingTensor>,
    operators: Vec<OperatorDef>,
    schema_version: u32,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            tensors: Vec::new(),
            operators: Vec::new(),
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Override the header's schema version (for compatibility tests).
    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    fn push(&mut self, t: PendingTensor) -> u16 {
        self.tensors.push(t);
        (self.tensors.len() - 1) as u16
    }

    fn shape(dims: &[u32]) -> Shape {
        Shape::from_slice(&dims[..dims.len().min(MAX_RANK)]).unwrap_or_default()
    }

    pub fn activation(&mut self, dtype: DType, shape: &[u32], quant: QuantParams) -> u16 {
        self.push(PendingTensor {
            dtype,
            shape: Self::shape(shape),
            quant,
            channel_scales: None,
            data: None,
        })
    }

    pub fn constant_i8(&mut self, shape: &[u32], quant: QuantParams, values: &[i8]) -> u16 {
        self.push(PendingTensor {
            dtype: DType::Int8,
            shape: Self::shape(shape),
            quant,
            channel_scales: None,
            data: Some(values.iter().map(|&v| v as u8).collect()),
        })
    }

    /// Symmetric int8 filter with one scale per output channel.
    pub fn constant_i8_per_channel(&mut self, shape: &[u32], scales: &[f32], values: &[i8]) -> u16 {
        let idx = self.constant_i8(shape, QuantParams::new(scales.first().copied().unwrap_or(1.0), 0), values);
        self.tensors[idx as usize].channel_scales = Some(scales.to_vec());
        idx
    }

    pub fn constant_i32(&mut self, shape: &[u32], values: &[i32]) -> u16 {
        self.push(PendingTensor {
            dtype: DType::Int32,
            shape: Self::shape(shape),
            quant: QuantParams::new(1.0, 0),
            channel_scales: None,
            data: Some(values.iter().flat_map(|v| v.to_le_bytes()).collect()),
        })
    }

    pub fn operator(&mut self, op: Op, inputs: &[u16], output: u16) -> &mut Self {
        self.operators.push(OperatorDef {
            op,
            inputs: heapless::Vec::from_slice(&inputs[..inputs.len().min(3)]).unwrap_or_default(),
            output,
        });
        self
    }

    /// Serialize the graph and wrap it in the blob header.
    pub fn build(&self, input: u16, output: u16) -> Result<Vec<u8>, VisionError> {
        let graph = ModelGraph {
            tensors: self
                .tensors
                .iter()
                .map(|t| TensorDef {
                    dtype: t.dtype,
                    shape: t.shape.clone(),
                    quant: t.quant,
                    channel_scales: t.channel_scales.clone(),
                    data: t.data.as_deref(),
                })
                .collect(),
            operators: self.operators.clone(),
            input,
            output,
        };
        let payload = postcard::to_allocvec(&graph)
            .map_err(|_| VisionError::ModelInvalid("graph encode failed"))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + payload.len());
        blob.extend_from_slice(&MAGIC);
        blob.extend_from_slice(&self.schema_version.to_le_bytes());
        blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        blob.extend_from_slice(&hmac_sha256::Hash::hash(&payload));
        blob.extend_from_slice(&payload);
        Ok(blob)
    }
}
