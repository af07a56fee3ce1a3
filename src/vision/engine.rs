//! The quantized classifier engine: one model, one arena, one interpreter,
//! created once at boot and owned by the caller.

use log::{debug, info, warn};

use super::arena::{MemoryPools, allocate_arena};
use super::interpreter::{Interpreter, OpResolver};
use super::labels::{Classification, LabelTable};
use super::model::ModelGraph;
use super::preprocess::{decode_rgb, fill_input};
use super::quant::{DType, InputQuantizer};
use crate::app::ports::ClassifierPort;
use crate::error::VisionError;
use crate::frame::FrameView;

/// Default arena size, sized for PSRAM.
pub const DEFAULT_ARENA_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub arena_size: usize,
    pub labels: LabelTable,
    pub resolver: OpResolver,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            arena_size: DEFAULT_ARENA_SIZE,
            labels: LabelTable::default(),
            resolver: OpResolver::classifier(),
        }
    }
}

struct Loaded<'m> {
    interpreter: Interpreter<'m>,
    quantizer: InputQuantizer,
    input_w: u32,
    input_h: u32,
    labels: LabelTable,
}

pub struct ClassifierEngine<'m> {
    loaded: Option<Loaded<'m>>,
}

impl<'m> ClassifierEngine<'m> {
    /// Load `blob` and bind it to a freshly allocated arena.
    ///
    /// A zero-length blob is not an error: the engine comes up degraded and
    /// reports UNKNOWN for every frame without allocating anything.
    pub fn new(blob: &'m [u8], config: EngineConfig, pools: &mut impl MemoryPools) -> Result<Self, VisionError> {
        if blob.is_empty() {
            warn!("no model embedded; vision will always return UNKNOWN");
            return Ok(Self { loaded: None });
        }

        let graph = ModelGraph::parse(blob)?;
        let (arena, _) = allocate_arena(pools, config.arena_size)?;
        let interpreter = Interpreter::new(&graph, &config.resolver, arena)?;

        let input = interpreter.input_activ();
        if input.dtype != DType::Int8 {
            warn!("expected int8 input, got {:?}", input.dtype);
            return Err(VisionError::ModelInvalid("input tensor must be int8"));
        }
        let &[batch, input_h, input_w, channels] = interpreter.input_shape() else {
            warn!("unexpected input rank {}", interpreter.input_shape().len());
            return Err(VisionError::ModelInvalid("input tensor must be rank 4"));
        };
        if channels != 3 {
            warn!("expected 3-channel input, got {}", channels);
            return Err(VisionError::ModelInvalid("input tensor must have 3 channels"));
        }
        if batch != 1 {
            return Err(VisionError::ModelInvalid("input batch must be 1"));
        }
        config.labels.validate_outputs(interpreter.output().len())?;

        info!(
            "vision model loaded ({} bytes, input {}x{}x{}, arena {}/{} bytes)",
            blob.len(),
            input_w,
            input_h,
            channels,
            interpreter.arena_used(),
            config.arena_size
        );
        Ok(Self {
            loaded: Some(Loaded {
                quantizer: InputQuantizer::new(input.quant),
                interpreter,
                input_w,
                input_h,
                labels: config.labels,
            }),
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.loaded.is_none()
    }

    /// Model input resolution as (width, height), if a model is loaded.
    pub fn input_size(&self) -> Option<(u32, u32)> {
        self.loaded.as_ref().map(|l| (l.input_w, l.input_h))
    }

    pub fn classify(&mut self, frame: &FrameView<'_>) -> Result<Classification, VisionError> {
        let Some(m) = self.loaded.as_mut() else {
            return Ok(Classification::UNKNOWN);
        };

        let raster = decode_rgb(frame)?;
        if raster.dimensions() != (u32::from(frame.width), u32::from(frame.height)) {
            debug!(
                "frame reports {}x{}, decoded {:?}",
                frame.width,
                frame.height,
                raster.dimensions()
            );
        }
        fill_input(&raster, m.input_w, m.input_h, &m.quantizer, m.interpreter.input_mut())?;
        drop(raster);

        m.interpreter.invoke()?;

        // First maximum wins ties.
        let mut best: Option<(usize, f32)> = None;
        for (i, score) in m.interpreter.output().scores().enumerate() {
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        }
        let (index, confidence) = best.ok_or(VisionError::InferenceFailed("empty output tensor"))?;
        Ok(Classification {
            label: m.labels.label(index),
            confidence,
        })
    }
}

impl ClassifierPort for ClassifierEngine<'_> {
    fn classify(&mut self, frame: &FrameView<'_>) -> Result<Classification, VisionError> {
        ClassifierEngine::classify(self, frame)
    }
}
