//! Shared mutable context threaded through every FSM handler.
//!
//! `EpisodeContext` is the blackboard the state handlers read from and
//! write to.  The detection service fills in the clock and the outcome of
//! the latest sample before each tick; handlers leave behind a lid command
//! and the delay the service should sleep before the next tick.

use crate::config::SystemConfig;
use crate::vision::Classification;

// ---------------------------------------------------------------------------
// Inputs (written by the service before a tick)
// ---------------------------------------------------------------------------

/// What happened on the sample taken just before this tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SampleOutcome {
    /// No sample was taken (window already elapsed, or not sampling).
    #[default]
    None,
    /// Frame acquisition failed.
    CaptureFailed,
    /// First frame of the episode, released unclassified.
    Settling,
    /// The classifier rejected the frame.
    ClassifyFailed,
    Classified(Classification),
}

// ---------------------------------------------------------------------------
// Hysteresis
// ---------------------------------------------------------------------------

/// Run length of consecutive threat samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreatCounter {
    count: u8,
}

impl ThreatCounter {
    /// Count a threat, or reset on anything else. Returns the new run length.
    pub fn record(&mut self, threat: bool) -> u8 {
        self.count = if threat { self.count.saturating_add(1) } else { 0 };
        self.count
    }

    pub fn get(&self) -> u8 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

// ---------------------------------------------------------------------------
// Outputs (written by state handlers; consumed by the service)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidCommand {
    Seal,
    Expose,
}

/// Decision taken on a classified sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub classification: Classification,
    pub threat: bool,
    pub consecutive: u8,
}

// ---------------------------------------------------------------------------
// EpisodeContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct EpisodeContext {
    // -- Timing --
    /// Clock reading for the current tick (ms since boot).
    pub now_ms: u64,
    /// End of the sampling window.
    pub deadline_ms: u64,
    /// When a sealed lid is due to reopen.
    pub reopen_at_ms: u64,
    /// How long the service should sleep after this tick.
    pub delay_ms: u32,

    // -- Episode state --
    pub counter: ThreatCounter,
    /// Lid sealed during this episode. Set by the service once the seal
    /// command succeeds.
    pub lid_closed: bool,
    /// Next successful frame is the settling frame.
    pub discard_first: bool,

    // -- Tick I/O --
    pub sample: SampleOutcome,
    pub verdict: Option<Verdict>,
    pub command: Option<LidCommand>,

    // -- Configuration --
    pub config: SystemConfig,
}

impl EpisodeContext {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            now_ms: 0,
            deadline_ms: 0,
            reopen_at_ms: 0,
            delay_ms: 0,
            counter: ThreatCounter::default(),
            lid_closed: false,
            discard_first: true,
            sample: SampleOutcome::None,
            verdict: None,
            command: None,
            config,
        }
    }

    pub fn window_elapsed(&self) -> bool {
        self.now_ms >= self.deadline_ms
    }
}
