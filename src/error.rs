//! Unified error types for the LidGuard firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level boot path's error handling uniform. All variants are `Copy` so
//! they can be passed through the detection service and event sink without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The classifier engine failed to load or run.
    Vision(VisionError),
    /// A frame could not be acquired from the camera.
    Capture(CaptureError),
    /// A lid actuation command failed.
    Actuator(ActuatorError),
    /// An I²C collaborator (FRAM, fuel gauge) failed.
    Bus(BusError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vision(e) => write!(f, "vision: {e}"),
            Self::Capture(e) => write!(f, "capture: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Vision errors
// ---------------------------------------------------------------------------

/// Errors raised by the quantized classifier engine.
///
/// `ModelIncompatible`, `ModelInvalid` and `OutOfMemory` are init-time and
/// fatal: the engine is never constructed.  The rest are per-call and leave
/// the engine usable for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionError {
    /// The model blob carries a schema version this build cannot run.
    ModelIncompatible { found: u32, supported: u32 },
    /// The model blob is malformed or violates the input/output contract.
    ModelInvalid(&'static str),
    /// Neither memory pool could provide the arena, or the tensor plan
    /// does not fit in it.
    OutOfMemory { requested: usize },
    /// The frame cannot be classified by this engine (e.g. raw encoding).
    InvalidState(&'static str),
    /// The compressed frame could not be decoded.
    DecodeFailed,
    /// The forward pass failed; no partial result exists.
    InferenceFailed(&'static str),
}

impl fmt::Display for VisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelIncompatible { found, supported } => {
                write!(f, "model schema {found} != supported {supported}")
            }
            Self::ModelInvalid(msg) => write!(f, "model invalid: {msg}"),
            Self::OutOfMemory { requested } => write!(f, "out of memory ({requested} bytes)"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::DecodeFailed => write!(f, "JPEG to RGB888 conversion failed"),
            Self::InferenceFailed(msg) => write!(f, "inference failed: {msg}"),
        }
    }
}

impl From<VisionError> for Error {
    fn from(e: VisionError) -> Self {
        Self::Vision(e)
    }
}

// ---------------------------------------------------------------------------
// Capture errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// Camera driver was never initialised.
    NotInitialised,
    /// Every frame buffer is outstanding or the sensor produced nothing.
    BufferUnavailable,
    /// The camera driver returned an ESP-IDF error code.
    Driver(i32),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialised => write!(f, "camera not initialised"),
            Self::BufferUnavailable => write!(f, "no frame buffer available"),
            Self::Driver(rc) => write!(f, "camera driver error (rc={rc})"),
        }
    }
}

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Self::Capture(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Servo PWM channel was never configured.
    NotInitialised,
    /// LEDC duty write or update failed.
    PwmWriteFailed(i32),
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialised => write!(f, "servo not initialised"),
            Self::PwmWriteFailed(rc) => write!(f, "PWM write failed (rc={rc})"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The device did not acknowledge its address or data.
    Nack,
    /// Any other transfer failure reported by the HAL.
    Transfer,
    /// The request does not fit the device (address range, record size).
    OutOfRange,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack => write!(f, "I2C NACK"),
            Self::Transfer => write!(f, "I2C transfer failed"),
            Self::OutOfRange => write!(f, "request out of device range"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

impl BusError {
    /// Classify a HAL-specific I²C error.
    pub fn from_i2c<E: embedded_hal::i2c::Error>(e: &E) -> Self {
        use embedded_hal::i2c::ErrorKind;
        match e.kind() {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            _ => Self::Transfer,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
