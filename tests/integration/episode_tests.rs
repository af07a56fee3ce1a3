//! Full detection episodes: real classifier engine, JPEG frames, mock
//! lid and a virtual clock.

use lidguard::app::events::AppEvent;
use lidguard::app::service::DetectionService;
use lidguard::config::SystemConfig;
use lidguard::error::CaptureError;
use lidguard::fsm::StateId;
use lidguard::vision::{ClassifierEngine, Label};

use crate::engine_tests::{Pools, colour_config, colour_model};
use crate::mock_hw::{LidCall, MockHardware, RecordingSink, solid_jpeg};

fn red() -> Vec<u8> {
    solid_jpeg(64, 48, [255, 0, 0])
}

fn blue() -> Vec<u8> {
    solid_jpeg(64, 48, [0, 0, 255])
}

/// Crow is a threat by default; Other (blue) is not.
fn config() -> SystemConfig {
    SystemConfig::default()
}

#[test]
fn threat_seals_once_then_reopens_after_cooldown() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(red());
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    assert!(svc.start(&mut hw, &mut sink));
    let summary = svc.run_episode(&mut hw, &mut engine, &mut sink);

    // settle 0 → 100, samples every 300 ms from 100 to 4900.
    assert_eq!(summary.sealed_at_ms, Some(400));
    assert_eq!(summary.reopened_at_ms, Some(10_200));
    assert_eq!(summary.seal_attempts, 1);
    assert_eq!(summary.frames_classified, 17);
    assert_eq!(summary.threat_samples, 17);
    assert_eq!(summary.max_consecutive, 17);
    assert_eq!(hw.seals(), vec![400]);
    assert_eq!(hw.exposes(), vec![0, 10_200]);
    assert_eq!(svc.state(), StateId::Idle);

    let sealed = sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::LidSealed { .. }))
        .count();
    assert_eq!(sealed, 1);
}

#[test]
fn harmless_visitor_leaves_lid_open() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(blue());
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    let summary = svc.run_episode(&mut hw, &mut engine, &mut sink);
    assert_eq!(summary.sealed_at_ms, None);
    assert_eq!(summary.threat_samples, 0);
    assert!(hw.lid.is_empty());
    assert_eq!(summary.ended_ms, 5_200);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::Classified { classification, threat: false, .. } if classification.label == Label::Other
    )));
}

#[test]
fn interleaved_non_threat_breaks_the_run() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(blue());
    // settle, then threat / clear alternating
    hw.frames = [red(), red(), blue(), red(), blue(), red()].into_iter().map(Ok).collect();
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    let summary = svc.run_episode(&mut hw, &mut engine, &mut sink);
    assert_eq!(summary.threat_samples, 3);
    assert_eq!(summary.max_consecutive, 1);
    assert_eq!(summary.seal_attempts, 0);
}

#[test]
fn failed_seal_is_retried_on_next_confirmed_sample() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(red());
    hw.failing_seals = 1;
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    let summary = svc.run_episode(&mut hw, &mut engine, &mut sink);
    assert_eq!(
        &hw.lid[..2],
        &[LidCall::Seal { at_ms: 400, ok: false }, LidCall::Seal { at_ms: 700, ok: true }]
    );
    assert_eq!(summary.seal_attempts, 2);
    assert_eq!(summary.sealed_at_ms, Some(700));
    assert!(sink.events.iter().any(|e| matches!(e, AppEvent::ActuationFailed { seal: true, .. })));
}

#[test]
fn capture_failures_back_off_and_frames_balance() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(blue());
    hw.frames = [
        Err(CaptureError::BufferUnavailable),
        Ok(red()),
        Err(CaptureError::Driver(-1)),
        Ok(red()),
        Ok(red()),
    ]
    .into_iter()
    .collect();
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    let summary = svc.run_episode(&mut hw, &mut engine, &mut sink);
    // 0 fail → 200 settle → 300 red → 600 fail → 800 red (run 2) seals.
    assert_eq!(summary.capture_failures, 2);
    assert_eq!(summary.sealed_at_ms, Some(800));
    assert_eq!(hw.acquired, hw.released);
    assert_eq!(summary.frames_acquired, summary.frames_released);
    assert_eq!(hw.max_outstanding, 1);
    assert_eq!(hw.outstanding, 0);
}

#[test]
fn degraded_engine_never_seals() {
    let mut engine = ClassifierEngine::new(&[], colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(red());
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    let summary = svc.run_episode(&mut hw, &mut engine, &mut sink);
    assert_eq!(summary.frames_classified, 17);
    assert_eq!(summary.threat_samples, 0);
    assert_eq!(summary.sealed_at_ms, None);
}

#[test]
fn back_to_back_episodes_start_fresh() {
    let blob = colour_model();
    let mut engine = ClassifierEngine::new(&blob, colour_config(), &mut Pools::default()).unwrap();
    let mut hw = MockHardware::new(red());
    let mut sink = RecordingSink::default();
    let mut svc = DetectionService::new(config());

    let first = svc.run_episode(&mut hw, &mut engine, &mut sink);
    hw.now += 2_000;
    hw.pending_triggers = 3;
    let second = svc.run_episode(&mut hw, &mut engine, &mut sink);

    assert_eq!(first.episode, 1);
    assert_eq!(second.episode, 2);
    assert_eq!(second.ignored_triggers, 3);
    // The second episode discards its own settling frame and seals again.
    assert_eq!(second.sealed_at_ms, Some(second.started_ms + 400));
    assert_eq!(hw.seals().len(), 2);
}
