//! Outbound application events.
//!
//! The [`DetectionService`](super::service::DetectionService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them.

use serde::Serialize;

use super::ports::BatteryReading;
use crate::error::{ActuatorError, CaptureError, VisionError};
use crate::fsm::StateId;
use crate::vision::Classification;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The service is up; `lid_open` reports whether the boot open worked.
    Started { lid_open: bool },

    /// A motion trigger opened a sampling window.
    EpisodeOpened { episode: u32, deadline_ms: u64 },

    /// The settling frame was released unclassified.
    FrameDiscarded,

    CaptureFailed(CaptureError),

    ClassifyFailed(VisionError),

    /// A sample was classified and run through the threat predicate.
    Classified {
        classification: Classification,
        threat: bool,
        consecutive: u8,
    },

    LidSealed { at_ms: u64 },

    LidReopened { at_ms: u64 },

    /// A lid command failed; `seal` tells which direction.
    ActuationFailed { seal: bool, error: ActuatorError },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// End-of-episode summary.
    EpisodeClosed(EpisodeSummary),

    Battery(BatteryReading),
}

/// Counters for one episode, rendered as one JSON line by the log sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub episode: u32,
    pub started_ms: u64,
    pub ended_ms: u64,
    pub frames_acquired: u32,
    pub frames_released: u32,
    pub capture_failures: u32,
    pub classify_failures: u32,
    pub frames_classified: u32,
    pub threat_samples: u32,
    pub max_consecutive: u8,
    pub seal_attempts: u32,
    pub sealed_at_ms: Option<u64>,
    pub reopened_at_ms: Option<u64>,
    /// Deferred reopen was commanded and failed; retried next episode.
    pub reopen_failed: bool,
    /// Motion triggers that arrived during the episode and were dropped.
    pub ignored_triggers: u32,
}
