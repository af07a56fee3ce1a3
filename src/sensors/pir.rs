//! Passive-infrared motion sensor (HC-SR501 / AM312 class).
//!
//! The sensor output goes HIGH while it sees motion.  A rising-edge ISR
//! pushes [`Event::MotionDetected`] into the event queue; this driver is
//! the queue's single consumer.  A trigger only counts once the line has
//! stayed high for the debounce interval.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the PIR GPIO level via hw_init helpers.
//! On host/test: reads a simulated level.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::app::ports::{ClockPort, MotionWait};
use crate::events::{Event, EventQueue, EVENTS};

/// How often the queue is polled while waiting.
const POLL_INTERVAL_MS: u32 = 20;

#[cfg(not(target_os = "espidf"))]
static SIM_PIR_LEVEL: AtomicBool = AtomicBool::new(false);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_level(high: bool) {
    SIM_PIR_LEVEL.store(high, Ordering::Relaxed);
}

pub struct PirSensor {
    debounce_ms: u32,
    queue: &'static EventQueue,
    #[cfg(not(target_os = "espidf"))]
    level: &'static AtomicBool,
    /// Fuel-gauge alerts popped while looking for motion.
    fuel_alerts: u32,
}

impl PirSensor {
    /// Driver over the global ISR queue.
    pub fn new(debounce_ms: u32) -> Self {
        Self::with_queue(debounce_ms, &EVENTS)
    }

    pub fn with_queue(debounce_ms: u32, queue: &'static EventQueue) -> Self {
        Self {
            debounce_ms,
            queue,
            #[cfg(not(target_os = "espidf"))]
            level: &SIM_PIR_LEVEL,
            fuel_alerts: 0,
        }
    }

    /// Route the level read to `level` instead of the pin (host tests).
    #[cfg(not(target_os = "espidf"))]
    pub fn with_level(mut self, level: &'static AtomicBool) -> Self {
        self.level = level;
        self
    }

    /// Block until debounced motion or until `timeout_ms` elapses.
    pub fn wait_for_motion(&mut self, clock: &mut impl ClockPort, timeout_ms: Option<u32>) -> MotionWait {
        let start = clock.now_ms();
        loop {
            if self.next_trigger() || self.is_high() {
                clock.sleep_ms(self.debounce_ms);
                if self.is_high() {
                    // The edge that got us here is consumed; later edges of the
                    // same pulse are not new motion.
                    self.discard_pending();
                    return MotionWait::Detected;
                }
                debug!("pir: trigger dropped by debounce");
            }
            if let Some(limit) = timeout_ms {
                if clock.now_ms().saturating_sub(start) >= u64::from(limit) {
                    return MotionWait::TimedOut;
                }
            }
            clock.sleep_ms(POLL_INTERVAL_MS);
        }
    }

    /// Drop queued motion edges. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while let Some(event) = self.queue.pop() {
            match event {
                Event::MotionDetected => dropped += 1,
                Event::FuelAlert => self.fuel_alerts += 1,
            }
        }
        dropped
    }

    /// Fuel-gauge alerts seen since the last call.
    pub fn take_fuel_alerts(&mut self) -> u32 {
        core::mem::take(&mut self.fuel_alerts)
    }

    fn next_trigger(&mut self) -> bool {
        while let Some(event) = self.queue.pop() {
            match event {
                Event::MotionDetected => return true,
                Event::FuelAlert => self.fuel_alerts += 1,
            }
        }
        false
    }

    #[cfg(target_os = "espidf")]
    fn is_high(&self) -> bool {
        crate::drivers::hw_init::gpio_read(crate::pins::PIR_GPIO)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_high(&self) -> bool {
        self.level.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock {
        now: u64,
    }

    impl ClockPort for Clock {
        fn now_ms(&self) -> u64 {
            self.now
        }
        fn sleep_ms(&mut self, ms: u32) {
            self.now += u64::from(ms);
        }
    }

    #[test]
    fn times_out_without_motion() {
        static Q: EventQueue = EventQueue::new();
        static LEVEL: AtomicBool = AtomicBool::new(false);
        let mut pir = PirSensor::with_queue(150, &Q).with_level(&LEVEL);
        let mut clk = Clock { now: 0 };
        assert_eq!(pir.wait_for_motion(&mut clk, Some(1000)), MotionWait::TimedOut);
        assert!(clk.now >= 1000);
    }

    #[test]
    fn sustained_motion_is_detected_after_debounce() {
        static Q: EventQueue = EventQueue::new();
        static LEVEL: AtomicBool = AtomicBool::new(false);
        Q.push(Event::MotionDetected);
        LEVEL.store(true, Ordering::Relaxed);
        let mut pir = PirSensor::with_queue(150, &Q).with_level(&LEVEL);
        let mut clk = Clock { now: 0 };
        assert_eq!(pir.wait_for_motion(&mut clk, None), MotionWait::Detected);
        assert_eq!(clk.now, 150);
    }

    #[test]
    fn glitch_is_rejected() {
        static Q: EventQueue = EventQueue::new();
        static LEVEL: AtomicBool = AtomicBool::new(false);
        // Edge fired but the line is already low again.
        Q.push(Event::MotionDetected);
        let mut pir = PirSensor::with_queue(150, &Q).with_level(&LEVEL);
        let mut clk = Clock { now: 0 };
        assert_eq!(pir.wait_for_motion(&mut clk, Some(500)), MotionWait::TimedOut);
    }

    /// Every sleep lets the ISR queue another edge while the line stays low.
    struct ChatteringClock {
        now: u64,
        queue: &'static EventQueue,
    }

    impl ClockPort for ChatteringClock {
        fn now_ms(&self) -> u64 {
            self.now
        }
        fn sleep_ms(&mut self, ms: u32) {
            self.now += u64::from(ms);
            self.queue.push(Event::MotionDetected);
        }
    }

    #[test]
    fn chattering_line_still_times_out() {
        static Q: EventQueue = EventQueue::new();
        static LEVEL: AtomicBool = AtomicBool::new(false);
        Q.push(Event::MotionDetected);
        let mut pir = PirSensor::with_queue(150, &Q).with_level(&LEVEL);
        let mut clk = ChatteringClock { now: 0, queue: &Q };
        assert_eq!(pir.wait_for_motion(&mut clk, Some(500)), MotionWait::TimedOut);
        assert!(clk.now >= 500 && clk.now < 500 + 150 + POLL_INTERVAL_MS as u64, "{}", clk.now);
    }

    #[test]
    fn alerts_are_kept_while_discarding_motion() {
        static Q: EventQueue = EventQueue::new();
        Q.push(Event::MotionDetected);
        Q.push(Event::FuelAlert);
        Q.push(Event::MotionDetected);
        let mut pir = PirSensor::with_queue(150, &Q);
        assert_eq!(pir.discard_pending(), 2);
        assert_eq!(pir.take_fuel_alerts(), 1);
        assert_eq!(pir.take_fuel_alerts(), 0);
        assert!(Q.is_empty());
    }
}
