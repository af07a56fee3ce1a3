//! On-device pest classifier.
//!
//! ```text
//!  JPEG frame ─▶ decode RGB888 ─▶ centre crop ─▶ nearest resample ─▶ int8 input
//!                                                                      │
//!               (label, score) ◀─ argmax ◀─ dequantize ◀─ interpreter ◀┘
//! ```

pub mod arena;
pub mod engine;
pub mod interpreter;
pub mod kernels;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod quant;

pub use engine::{ClassifierEngine, EngineConfig};
pub use labels::{Classification, Label, LabelTable};

static MODEL_BLOB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/model_blob.bin"));

/// The model embedded at build time. Empty when the build had no model.
pub fn model_blob() -> &'static [u8] {
    MODEL_BLOB
}
