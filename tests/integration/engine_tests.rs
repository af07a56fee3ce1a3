//! Classifier engine construction and classification on real JPEG frames.

use lidguard::error::VisionError;
use lidguard::frame::FrameView;
use lidguard::vision::arena::{ArenaStorage, MemoryPool, MemoryPools};
use lidguard::vision::model::{ModelBuilder, Op};
use lidguard::vision::quant::{Activation, DType, QuantParams};
use lidguard::vision::{ClassifierEngine, EngineConfig, Label, LabelTable};

use crate::mock_hw::solid_jpeg;

const ARENA: usize = 4096;

/// Per-channel spatial mean: the brightest colour channel wins.
pub fn colour_model() -> Vec<u8> {
    let q = QuantParams::new(1.0 / 255.0, -128);
    let mut b = ModelBuilder::new();
    let input = b.activation(DType::Int8, &[1, 8, 8, 3], q);
    let output = b.activation(DType::Int8, &[1, 3], q);
    b.operator(Op::Mean, &[input], output);
    b.build(input, output).unwrap()
}

pub fn colour_config() -> EngineConfig {
    EngineConfig {
        arena_size: ARENA,
        labels: LabelTable::new(&[Label::Crow, Label::Bird, Label::Other]).unwrap(),
        ..EngineConfig::default()
    }
}

/// Pools that refuse the listed regions and record every request.
#[derive(Default)]
pub struct Pools {
    pub refuse: Vec<MemoryPool>,
    pub requests: Vec<MemoryPool>,
}

impl MemoryPools for Pools {
    fn allocate(&mut self, pool: MemoryPool, size: usize) -> Option<ArenaStorage> {
        self.requests.push(pool);
        if self.refuse.contains(&pool) {
            None
        } else {
            ArenaStorage::heap(size)
        }
    }
}

#[test]
fn classifies_dominant_colour() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    assert!(!engine.is_degraded());
    assert_eq!(engine.input_size(), Some((8, 8)));

    let red = solid_jpeg(64, 48, [255, 0, 0]);
    let c = engine.classify(&FrameView::jpeg(&red, 64, 48)).unwrap();
    assert_eq!(c.label, Label::Crow);
    assert!(c.confidence > 0.9, "{c:?}");

    let green = solid_jpeg(48, 64, [0, 255, 0]);
    let c = engine.classify(&FrameView::jpeg(&green, 48, 64)).unwrap();
    assert_eq!(c.label, Label::Bird);
}

/// Colour means plus a constant prior that favours the last label.
fn biased_colour_model() -> Vec<u8> {
    let q = QuantParams::new(1.0 / 255.0, -128);
    let mut b = ModelBuilder::new();
    let input = b.activation(DType::Int8, &[1, 8, 8, 3], q);
    let pooled = b.activation(DType::Int8, &[1, 3], q);
    let prior = b.constant_i8(&[3], q, &[-128, -128, 0]);
    let output = b.activation(DType::Int8, &[1, 3], QuantParams::new(2.0 / 255.0, -128));
    b.operator(Op::Mean, &[input], pooled);
    b.operator(Op::Add { activation: Activation::None }, &[pooled, prior], output);
    b.build(input, output).unwrap()
}

#[test]
fn additive_prior_shifts_the_decision() {
    let blob = biased_colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    assert!(!engine.is_degraded());

    let black = solid_jpeg(32, 32, [0, 0, 0]);
    let c = engine.classify(&FrameView::jpeg(&black, 32, 32)).unwrap();
    assert_eq!(c.label, Label::Other, "{c:?}");

    let red = solid_jpeg(32, 32, [255, 0, 0]);
    let c = engine.classify(&FrameView::jpeg(&red, 32, 32)).unwrap();
    assert_eq!(c.label, Label::Crow, "{c:?}");
    assert!(c.confidence > 0.9, "{c:?}");
}

#[test]
fn refused_psram_falls_back_to_internal() {
    let blob = colour_model();
    let mut pools = Pools {
        refuse: vec![MemoryPool::External],
        ..Pools::default()
    };
    let engine = ClassifierEngine::new(&blob, colour_config(), &mut pools).unwrap();
    assert!(!engine.is_degraded());
    assert_eq!(pools.requests, vec![MemoryPool::External, MemoryPool::Internal]);
}

#[test]
fn both_pools_refusing_is_out_of_memory() {
    let blob = colour_model();
    let mut pools = Pools {
        refuse: vec![MemoryPool::External, MemoryPool::Internal],
        ..Pools::default()
    };
    let err = ClassifierEngine::new(&blob, colour_config(), &mut pools).err();
    assert_eq!(err, Some(VisionError::OutOfMemory { requested: ARENA }));
}

#[test]
fn label_table_mismatch_is_invalid() {
    let blob = colour_model();
    let config = EngineConfig {
        arena_size: ARENA,
        ..EngineConfig::default()
    };
    let err = ClassifierEngine::new(&blob, config, &mut Pools::default()).err();
    assert!(matches!(err, Some(VisionError::ModelInvalid(_))), "{err:?}");
}

#[test]
fn newer_schema_is_incompatible() {
    let q = QuantParams::new(1.0 / 255.0, -128);
    let mut b = ModelBuilder::new().schema_version(99);
    let input = b.activation(DType::Int8, &[1, 8, 8, 3], q);
    let output = b.activation(DType::Int8, &[1, 3], q);
    b.operator(Op::Mean, &[input], output);
    let blob = b.build(input, output).unwrap();

    let err = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).err();
    assert!(matches!(err, Some(VisionError::ModelIncompatible { found: 99, .. })), "{err:?}");
}

#[test]
fn degraded_engine_never_touches_pools() {
    let mut pools = Pools::default();
    let mut engine = ClassifierEngine::new(&[], EngineConfig::default(), &mut pools).unwrap();
    assert!(engine.is_degraded());
    assert!(pools.requests.is_empty());

    let c = engine.classify(&FrameView::jpeg(b"not a jpeg", 160, 120)).unwrap();
    assert_eq!(c.label, Label::Unknown);
    assert_eq!(c.confidence, 0.0);
}

#[test]
fn undecodable_frame_fails_without_poisoning_engine() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    assert_eq!(
        engine.classify(&FrameView::jpeg(b"\xFF\xD8garbage", 160, 120)).err(),
        Some(VisionError::DecodeFailed)
    );
    assert!(matches!(
        engine.classify(&FrameView::raw(&[0; 12], 2, 2)),
        Err(VisionError::InvalidState(_))
    ));

    let red = solid_jpeg(32, 32, [255, 0, 0]);
    assert_eq!(engine.classify(&FrameView::jpeg(&red, 32, 32)).unwrap().label, Label::Crow);
}
