//! Lid servo driver (SG90-class hobby servo on LEDC).
//!
//! Positions are expressed as pulse widths; the driver clamps them to the
//! servo's mechanical limits and converts them to LEDC duty.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: writes the servo LEDC channel via hw_init helpers.
//! On host/test: tracks the commanded position in memory only.

use log::{info, warn};

use crate::drivers::hw_init;
use crate::error::ActuatorError;
use crate::pins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LidPosition {
    Open,
    Closed,
}

pub fn clamp_pulse(pulse_us: u32) -> u32 {
    pulse_us.clamp(pins::SERVO_PULSE_MIN_US, pins::SERVO_PULSE_MAX_US)
}

/// `duty = pulse × freq × max_duty / 1e6`, truncating.
pub fn pulse_to_duty(pulse_us: u32) -> u32 {
    let max_duty = (1u64 << pins::SERVO_PWM_RESOLUTION_BITS) - 1;
    let duty = u64::from(clamp_pulse(pulse_us)) * u64::from(pins::SERVO_PWM_FREQ_HZ) * max_duty;
    (duty / 1_000_000) as u32
}

pub struct ServoDriver {
    open_pulse_us: u32,
    closed_pulse_us: u32,
    position: Option<LidPosition>,
}

impl ServoDriver {
    pub fn new(open_pulse_us: u32, closed_pulse_us: u32) -> Self {
        Self {
            open_pulse_us: clamp_pulse(open_pulse_us),
            closed_pulse_us: clamp_pulse(closed_pulse_us),
            position: None,
        }
    }

    pub fn set_position(&mut self, position: LidPosition) -> Result<(), ActuatorError> {
        if !hw_init::servo_ready() {
            return Err(ActuatorError::NotInitialised);
        }
        let pulse = match position {
            LidPosition::Open => self.open_pulse_us,
            LidPosition::Closed => self.closed_pulse_us,
        };
        if let Err(rc) = hw_init::servo_set_duty(pulse_to_duty(pulse)) {
            warn!("servo: duty write failed (rc={})", rc);
            return Err(ActuatorError::PwmWriteFailed(rc));
        }
        self.position = Some(position);
        info!("servo: moved to {:?} (pulse {}us)", position, pulse);
        Ok(())
    }

    /// Last position successfully commanded, `None` before the first move.
    pub fn position(&self) -> Option<LidPosition> {
        self.position
    }
}
