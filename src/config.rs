//! System configuration parameters
//!
//! Every tunable of the detection policy and of the lid/PIR collaborators.
//! Values can be overridden by a record persisted in FRAM.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::vision::Label;

/// Task watchdog timeout. One episode must complete well inside it.
pub const WATCHDOG_TIMEOUT_MS: u32 = 30_000;

/// Headroom kept for capture, inference and actuation on top of the
/// window and cool-down sleeps.
pub const EPISODE_SLACK_MS: u32 = 5_000;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Episode timing ---
    /// Length of the sampling window opened by a motion event
    pub window_ms: u32,
    /// Sleep between two classified samples
    pub sample_interval_ms: u32,
    /// Backoff after a failed frame acquisition
    pub capture_backoff_ms: u32,
    /// Backoff after a failed classification
    pub classify_backoff_ms: u32,
    /// Delay after discarding the first (settling) frame
    pub settle_delay_ms: u32,

    // --- Threat decision ---
    /// Minimum score for a threat label to count
    pub threat_confidence: f32,
    /// Consecutive threat samples required before sealing
    pub consecutive_needed: u8,
    /// Labels treated as threats
    pub threat_labels: heapless::Vec<Label, { Label::COUNT }>,

    // --- Lid ---
    /// Wait after the window closes before reopening a sealed lid
    pub reopen_cooldown_ms: u32,
    /// Servo pulse width for the open (exposed) position
    pub servo_open_pulse_us: u16,
    /// Servo pulse width for the closed (sealed) position
    pub servo_closed_pulse_us: u16,

    // --- Motion trigger ---
    /// Quiet period after an episode before re-arming
    pub retrigger_quiet_ms: u32,
    /// Time the PIR line must stay high to count as motion
    pub motion_debounce_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Episode timing
            window_ms: 5_000,
            sample_interval_ms: 300,
            capture_backoff_ms: 200,
            classify_backoff_ms: 200,
            settle_delay_ms: 100,

            // Threat decision
            threat_confidence: 0.70,
            consecutive_needed: 2,
            threat_labels: heapless::Vec::from_slice(&[Label::Crow, Label::Squirrel, Label::Rat])
                .unwrap_or_default(),

            // Lid
            reopen_cooldown_ms: 5_000,
            servo_open_pulse_us: 800,
            servo_closed_pulse_us: 2_200,

            // Motion trigger
            retrigger_quiet_ms: 2_000,
            motion_debounce_ms: 150,
        }
    }
}

impl SystemConfig {
    /// Whether a sample with this label and score counts as a threat.
    pub fn is_threat(&self, label: Label, confidence: f32) -> bool {
        self.threat_labels.contains(&label) && confidence >= self.threat_confidence
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(500..=20_000).contains(&self.window_ms) {
            return Err(ConfigError::ValidationFailed("window_ms must be 500–20000"));
        }
        if !(50..=self.window_ms).contains(&self.sample_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "sample_interval_ms must be 50–window_ms",
            ));
        }
        for backoff in [
            self.capture_backoff_ms,
            self.classify_backoff_ms,
            self.settle_delay_ms,
        ] {
            if !(10..=2_000).contains(&backoff) {
                return Err(ConfigError::ValidationFailed(
                    "backoff and settle delays must be 10–2000 ms",
                ));
            }
        }
        if !(self.threat_confidence > 0.0 && self.threat_confidence <= 1.0) {
            return Err(ConfigError::ValidationFailed(
                "threat_confidence must be in (0, 1]",
            ));
        }
        if !(1..=10).contains(&self.consecutive_needed) {
            return Err(ConfigError::ValidationFailed(
                "consecutive_needed must be 1–10",
            ));
        }
        if self.threat_labels.is_empty() || self.threat_labels.contains(&Label::Unknown) {
            return Err(ConfigError::ValidationFailed(
                "threat_labels must be non-empty and exclude UNKNOWN",
            ));
        }
        if !crate::drivers::watchdog::episode_fits(self.window_ms, self.reopen_cooldown_ms) {
            return Err(ConfigError::ValidationFailed(
                "window_ms + reopen_cooldown_ms exceeds the watchdog budget",
            ));
        }
        for pulse in [self.servo_open_pulse_us, self.servo_closed_pulse_us] {
            if !(500..=2_500).contains(&pulse) {
                return Err(ConfigError::ValidationFailed(
                    "servo pulses must be 500–2500 µs",
                ));
            }
        }
        if self.servo_open_pulse_us == self.servo_closed_pulse_us {
            return Err(ConfigError::ValidationFailed(
                "servo open and closed pulses must differ",
            ));
        }
        if !(20..=2_000).contains(&self.motion_debounce_ms) {
            return Err(ConfigError::ValidationFailed(
                "motion_debounce_ms must be 20–2000",
            ));
        }
        if self.retrigger_quiet_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "retrigger_quiet_ms must be at most 60000",
            ));
        }
        Ok(())
    }
}
