//! Property and fuzz-style tests for robustness of core data structures.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use std::collections::VecDeque;

use lidguard::adapters::fram_store::{CHECKSUM_LEN, HEADER_LEN, decode_body, encode_record, payload_len};
use lidguard::app::events::{AppEvent, EpisodeSummary};
use lidguard::app::ports::{
    ClassifierPort, ClockPort, ConfigError, EventSink, FramePort, LidPort, MotionPort, MotionWait,
};
use lidguard::app::service::DetectionService;
use lidguard::config::SystemConfig;
use lidguard::error::{ActuatorError, CaptureError, VisionError};
use lidguard::frame::{CapturedFrame, FrameView};
use lidguard::vision::preprocess::center_crop;
use lidguard::vision::quant::QuantParams;
use lidguard::vision::{Classification, Label};
use proptest::prelude::*;

// ── Quantization ──────────────────────────────────────────────

proptest! {
    /// Any in-range real value survives quantize → dequantize to within
    /// half a quantization step.
    #[test]
    fn quantize_round_trip_within_half_step(
        scale in 0.001f32..1.0,
        zero_point in -128i32..=127,
        steps in -128i32..=127,
        frac in -0.49f32..0.49,
    ) {
        let p = QuantParams::new(scale, zero_point);
        let q = (zero_point + steps).clamp(-128, 127);
        let real = (q - zero_point) as f32 * scale + frac * scale;
        let back = p.dequantize(i32::from(p.quantize_i8(real)));
        prop_assert!((back - real).abs() <= scale * 0.5 + 1e-4, "real {real} back {back}");
    }
}

// ── Center crop ───────────────────────────────────────────────

proptest! {
    #[test]
    fn crop_is_centred(width in 1u32..4096, height in 1u32..4096) {
        let c = center_crop(width, height);
        let right = width - c.x - c.size;
        let bottom = height - c.y - c.size;
        prop_assert!(right == c.x || right == c.x + 1);
        prop_assert!(bottom == c.y || bottom == c.y + 1);
        prop_assert!(c.x == 0 || c.y == 0);
    }
}

// ── Config record ─────────────────────────────────────────────

fn arb_config() -> impl Strategy<Value = SystemConfig> {
    (500u32..=15_000, 1u8..=10, 0.05f32..=1.0, 0u32..=10_000).prop_map(
        |(window_ms, consecutive_needed, threat_confidence, cooldown)| SystemConfig {
            window_ms,
            sample_interval_ms: 50.max(window_ms / 10),
            consecutive_needed,
            threat_confidence,
            reopen_cooldown_ms: cooldown.min(25_000 - window_ms),
            ..SystemConfig::default()
        },
    )
}

proptest! {
    /// Flipping any payload or checksum bit is always detected.
    #[test]
    fn any_flipped_bit_is_corrupted(cfg in arb_config(), pos in any::<prop::sample::Index>(), bit in 0u8..8) {
        let mut record = encode_record(&cfg).unwrap();
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&record[..HEADER_LEN]);
        let len = payload_len(&header).unwrap().unwrap();
        prop_assert_eq!(record.len(), HEADER_LEN + len + CHECKSUM_LEN);
        prop_assert_eq!(decode_body(&record[HEADER_LEN..]).unwrap(), cfg);

        let at = HEADER_LEN + pos.index(len + CHECKSUM_LEN);
        record[at] ^= 1 << bit;
        prop_assert_eq!(decode_body(&record[HEADER_LEN..]), Err(ConfigError::Corrupted));
    }
}

// ── Episode hysteresis ────────────────────────────────────────

struct Frame;

impl CapturedFrame for Frame {
    fn view(&self) -> FrameView<'_> {
        FrameView::jpeg(&[], 160, 120)
    }
}

#[derive(Default)]
struct Rig {
    now: u64,
    seals: u32,
    exposes: u32,
}

impl FramePort for Rig {
    type Frame = Frame;

    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame)
    }

    fn release(&mut self, _frame: Frame) {}
}

impl LidPort for Rig {
    fn actuate(&mut self, seal: bool) -> Result<(), ActuatorError> {
        if seal {
            self.seals += 1;
        } else {
            self.exposes += 1;
        }
        Ok(())
    }
}

impl ClockPort for Rig {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }
}

impl MotionPort for Rig {
    fn wait_for_motion(&mut self, _timeout_ms: Option<u32>) -> MotionWait {
        MotionWait::Detected
    }

    fn discard_pending(&mut self) -> usize {
        0
    }
}

struct Script(VecDeque<Classification>);

impl ClassifierPort for Script {
    fn classify(&mut self, _frame: &FrameView<'_>) -> Result<Classification, VisionError> {
        Ok(self.0.pop_front().unwrap_or(Classification::UNKNOWN))
    }
}

#[derive(Default)]
struct Sink(Vec<AppEvent>);

impl EventSink for Sink {
    fn emit(&mut self, event: &AppEvent) {
        self.0.push(event.clone());
    }
}

fn arb_classification() -> impl Strategy<Value = Classification> {
    let label = prop::sample::select(vec![
        Label::Crow,
        Label::Squirrel,
        Label::Rat,
        Label::Magpie,
        Label::Bird,
        Label::Other,
        Label::Unknown,
    ]);
    (label, 0.0f32..=1.0).prop_map(|(label, confidence)| Classification { label, confidence })
}

fn longest_threat_run(cfg: &SystemConfig, samples: &[Classification]) -> usize {
    samples
        .split(|c| !cfg.is_threat(c.label, c.confidence))
        .map(<[Classification]>::len)
        .max()
        .unwrap_or(0)
}

fn run(samples: &[Classification], consecutive_needed: u8) -> (SystemConfig, EpisodeSummary, Rig) {
    let cfg = SystemConfig {
        consecutive_needed,
        ..SystemConfig::default()
    };
    let mut svc = DetectionService::new(cfg.clone());
    let mut rig = Rig::default();
    let mut script = Script(samples.iter().copied().collect());
    let summary = svc.run_episode(&mut rig, &mut script, &mut Sink::default());
    (cfg, summary, rig)
}

proptest! {
    /// The lid seals at most once per episode, and exactly when some run
    /// of consecutive threats reached the threshold.
    #[test]
    fn seals_iff_threshold_reached(
        samples in proptest::collection::vec(arb_classification(), 0..17),
        needed in 1u8..=4,
    ) {
        let (cfg, summary, rig) = run(&samples, needed);
        let reached = longest_threat_run(&cfg, &samples) >= usize::from(needed);

        prop_assert!(rig.seals <= 1);
        prop_assert_eq!(rig.seals == 1, reached);
        prop_assert_eq!(summary.sealed_at_ms.is_some(), reached);
        prop_assert_eq!(summary.reopened_at_ms.is_some(), reached);
        prop_assert_eq!(rig.exposes, rig.seals);
        if let (Some(sealed), Some(reopened)) = (summary.sealed_at_ms, summary.reopened_at_ms) {
            prop_assert!(reopened >= sealed + u64::from(cfg.reopen_cooldown_ms));
        }
    }

    /// Sampling never runs past the window, and every acquired frame is
    /// handed back.
    #[test]
    fn window_bounds_sampling(samples in proptest::collection::vec(arb_classification(), 0..17)) {
        let (cfg, summary, _) = run(&samples, 2);
        prop_assert_eq!(summary.frames_acquired, summary.frames_released);
        // One settling frame plus one sample per interval after it.
        let budget = 1 + (cfg.window_ms - cfg.settle_delay_ms).div_ceil(cfg.sample_interval_ms);
        prop_assert!(summary.frames_acquired <= budget);
        prop_assert_eq!(summary.max_consecutive as usize, longest_threat_run(&cfg, &samples));
    }
}
