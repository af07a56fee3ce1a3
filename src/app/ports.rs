//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DetectionService (domain)
//! ```
//!
//! Driven adapters (camera, lid servo, PIR, clock, storage, event sinks)
//! implement these traits.  The [`DetectionService`](super::service::DetectionService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.

use crate::config::SystemConfig;
use crate::error::{ActuatorError, BusError, CaptureError, VisionError};
use crate::frame::{CapturedFrame, FrameView};
use crate::vision::Classification;

// ───────────────────────────────────────────────────────────────
// Frame source (driven adapter: camera → domain)
// ───────────────────────────────────────────────────────────────

/// Lends frames out of a small fixed buffer pool.
///
/// At most one frame per `acquire` call is outstanding; the caller must
/// hand it back with [`release`](Self::release) before the pool runs dry.
/// Frames are guards, so a dropped frame is returned as well and a double
/// release cannot be expressed.
pub trait FramePort {
    type Frame: CapturedFrame;

    fn acquire(&mut self) -> Result<Self::Frame, CaptureError>;

    fn release(&mut self, frame: Self::Frame);
}

// ───────────────────────────────────────────────────────────────
// Classifier (domain service port)
// ───────────────────────────────────────────────────────────────

/// Turns one frame into a label and score.
pub trait ClassifierPort {
    fn classify(&mut self, frame: &FrameView<'_>) -> Result<Classification, VisionError>;
}

// ───────────────────────────────────────────────────────────────
// Lid actuator (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Drives the lid. `seal = true` closes it, `false` exposes the bait.
pub trait LidPort {
    fn actuate(&mut self, seal: bool) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Motion trigger (driven adapter: PIR → domain)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionWait {
    Detected,
    TimedOut,
}

pub trait MotionPort {
    /// Block until debounced motion, or until `timeout_ms` elapses.
    /// `None` waits forever.
    fn wait_for_motion(&mut self, timeout_ms: Option<u32>) -> MotionWait;

    /// Drop triggers that queued up while nobody was waiting.
    /// Returns how many were dropped.
    fn discard_pending(&mut self) -> usize;
}

// ───────────────────────────────────────────────────────────────
// Clock (driven adapter: timer → domain)
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the calling task.
    fn sleep_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Power and battery (driven adapters)
// ───────────────────────────────────────────────────────────────

/// Boundary into the power subsystem after an episode.
pub trait PowerPort {
    fn prepare_sleep(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BatteryReading {
    pub millivolts: u16,
    pub percent: f32,
}

pub trait BatteryPort {
    fn read_battery(&mut self) -> Result<BatteryReading, BusError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&mut self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Record does not fit the storage device.
    StorageFull,
    /// Bus error from the storage backend.
    Io(BusError),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl From<BusError> for ConfigError {
    fn from(e: BusError) -> Self {
        Self::Io(e)
    }
}
