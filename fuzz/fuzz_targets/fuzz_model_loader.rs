//! Fuzz target: model blob loading
//!
//! Feeds arbitrary bytes to the blob parser and, when a graph parses, on
//! into interpreter construction with a small arena.  Loading must fail
//! with an error, never a panic or an out-of-bounds slice.
//!
//! cargo fuzz run fuzz_model_loader

#![no_main]

use libfuzzer_sys::fuzz_target;
use lidguard::vision::arena::SystemPools;
use lidguard::vision::model::ModelGraph;
use lidguard::vision::{ClassifierEngine, EngineConfig};

fuzz_target!(|data: &[u8]| {
    if ModelGraph::parse(data).is_err() {
        return;
    }
    let config = EngineConfig {
        arena_size: 64 * 1024,
        ..EngineConfig::default()
    };
    let _ = ClassifierEngine::new(data, config, &mut SystemPools);
});
