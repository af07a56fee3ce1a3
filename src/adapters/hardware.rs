//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the camera, the lid servo, the PIR driver and the clock, exposing
//! them through [`FramePort`], [`LidPort`], [`MotionPort`] and
//! [`ClockPort`].  The detection service takes all four from one value,
//! so an episode borrows the hardware exactly once.  On non-espidf
//! targets the underlying drivers use cfg-gated simulation stubs.

use crate::adapters::camera::{Camera, CameraFrame};
use crate::adapters::time::Esp32TimeAdapter;
use crate::app::ports::{ClockPort, FramePort, LidPort, MotionPort, MotionWait};
use crate::drivers::servo::{LidPosition, ServoDriver};
use crate::error::{ActuatorError, CaptureError};
use crate::sensors::pir::PirSensor;

/// Concrete adapter that combines the episode hardware behind port traits.
pub struct HardwareAdapter {
    camera: Camera,
    servo: ServoDriver,
    pir: PirSensor,
    clock: Esp32TimeAdapter,
}

impl HardwareAdapter {
    pub fn new(camera: Camera, servo: ServoDriver, pir: PirSensor, clock: Esp32TimeAdapter) -> Self {
        Self {
            camera,
            servo,
            pir,
            clock,
        }
    }

    pub fn lid_position(&self) -> Option<LidPosition> {
        self.servo.position()
    }

    /// Fuel-gauge alerts the PIR driver collected from the ISR queue.
    pub fn take_fuel_alerts(&mut self) -> u32 {
        self.pir.take_fuel_alerts()
    }
}

// ── FramePort implementation ──────────────────────────────────

impl FramePort for HardwareAdapter {
    type Frame = CameraFrame;

    fn acquire(&mut self) -> Result<CameraFrame, CaptureError> {
        self.camera.capture()
    }

    fn release(&mut self, frame: CameraFrame) {
        drop(frame);
    }
}

// ── LidPort implementation ────────────────────────────────────

impl LidPort for HardwareAdapter {
    fn actuate(&mut self, seal: bool) -> Result<(), ActuatorError> {
        let position = if seal { LidPosition::Closed } else { LidPosition::Open };
        self.servo.set_position(position)
    }
}

// ── MotionPort implementation ─────────────────────────────────

impl MotionPort for HardwareAdapter {
    fn wait_for_motion(&mut self, timeout_ms: Option<u32>) -> MotionWait {
        self.pir.wait_for_motion(&mut self.clock, timeout_ms)
    }

    fn discard_pending(&mut self) -> usize {
        self.pir.discard_pending()
    }
}

// ── ClockPort implementation ──────────────────────────────────

impl ClockPort for HardwareAdapter {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.clock.sleep_ms(ms);
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::sensors::pir;

    fn adapter() -> HardwareAdapter {
        HardwareAdapter::new(
            Camera::with_script(Vec::new()),
            ServoDriver::new(800, 2200),
            PirSensor::new(5),
            Esp32TimeAdapter::new(),
        )
    }

    #[test]
    fn lid_follows_seal_commands() {
        let mut hw = adapter();
        assert_eq!(hw.lid_position(), None);
        hw.actuate(true).unwrap();
        assert_eq!(hw.lid_position(), Some(LidPosition::Closed));
        hw.actuate(false).unwrap();
        assert_eq!(hw.lid_position(), Some(LidPosition::Open));
    }

    #[test]
    fn simulated_pir_level_drives_motion() {
        let mut hw = adapter();
        pir::sim_set_level(true);
        let held = hw.wait_for_motion(Some(50));
        pir::sim_set_level(false);
        assert_eq!(held, MotionWait::Detected);
        assert_eq!(hw.wait_for_motion(Some(30)), MotionWait::TimedOut);
    }
}
