//! Fuzz target: `ClassifierEngine::classify`
//!
//! Pushes arbitrary bytes through JPEG decode, crop, resample and
//! inference on a tiny fixed model.  The first two bytes pick the frame
//! dimensions the camera claims, which need not match the payload.
//!
//! cargo fuzz run fuzz_classify

#![no_main]

use libfuzzer_sys::fuzz_target;
use lidguard::frame::FrameView;
use lidguard::vision::arena::SystemPools;
use lidguard::vision::model::{ModelBuilder, Op};
use lidguard::vision::quant::{DType, QuantParams};
use lidguard::vision::{ClassifierEngine, EngineConfig, Label, LabelTable};

fuzz_target!(|data: &[u8]| {
    let [w, h, payload @ ..] = data else {
        return;
    };

    let q = QuantParams::new(1.0 / 255.0, -128);
    let mut b = ModelBuilder::new();
    let input = b.activation(DType::Int8, &[1, 8, 8, 3], q);
    let output = b.activation(DType::Int8, &[1, 3], q);
    b.operator(Op::Mean, &[input], output);
    let Ok(blob) = b.build(input, output) else {
        return;
    };

    let Ok(labels) = LabelTable::new(&[Label::Crow, Label::Bird, Label::Other]) else {
        return;
    };
    let config = EngineConfig {
        arena_size: 4096,
        labels,
        ..EngineConfig::default()
    };
    let Ok(mut engine) = ClassifierEngine::new(&blob, config, &mut SystemPools) else {
        return;
    };

    if let Ok(c) = engine.classify(&FrameView::jpeg(payload, u16::from(*w), u16::from(*h))) {
        assert!(c.confidence.is_finite());
        assert!(c.label != Label::Unknown, "model emits exactly three known labels");
    }
});
