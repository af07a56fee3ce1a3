//! LidGuard Firmware — Main Entry Point
//!
//! Hexagonal architecture: a PIR trigger opens a detection episode, the
//! classifier judges camera frames, the lid seals on a confirmed threat.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter            I2cAdapter         LogEventSink    │
//! │  (Frame+Lid+Motion+Clock)   (Battery+Config)   (EventSink)     │
//! │  PowerAdapter                                                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        DetectionService (episode FSM, hysteresis)      │    │
//! │  │        ClassifierEngine (int8 interpreter)             │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use log::{error, info, warn};

use lidguard::adapters::camera::Camera;
use lidguard::adapters::hardware::HardwareAdapter;
use lidguard::adapters::i2c::I2cAdapter;
use lidguard::adapters::log_sink::LogEventSink;
use lidguard::adapters::power::PowerAdapter;
use lidguard::adapters::time::Esp32TimeAdapter;
use lidguard::app::events::AppEvent;
use lidguard::app::ports::{
    BatteryPort, ClockPort, ConfigPort, EventSink, FramePort, MotionPort, MotionWait, PowerPort,
};
use lidguard::app::service::DetectionService;
use lidguard::config::SystemConfig;
use lidguard::drivers::hw_init;
use lidguard::drivers::servo::ServoDriver;
use lidguard::drivers::watchdog::Watchdog;
use lidguard::frame::CapturedFrame;
use lidguard::pins;
use lidguard::sensors::pir::PirSensor;
use lidguard::vision::arena::SystemPools;
use lidguard::vision::{model_blob, ClassifierEngine, EngineConfig};

/// Longest single motion wait; the watchdog is fed between waits.
const MOTION_WAIT_SLICE_MS: u32 = 10_000;

/// Settle time before the wiring-check capture.
const BOOT_CAPTURE_DELAY_MS: u32 = 200;

/// Stop here and let the task watchdog reset the device.
fn halt() -> ! {
    loop {
        FreeRtos::delay_ms(1_000);
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  LidGuard v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let watchdog = Watchdog::new();
    let peripherals = Peripherals::take()?;
    // SAFETY: the I2C pins are claimed by number exactly once, here; nothing
    // else takes them from `peripherals.pins`.
    let (sda, scl) = unsafe { (AnyIOPin::new(pins::I2C_SDA_GPIO), AnyIOPin::new(pins::I2C_SCL_GPIO)) };
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        sda,
        scl,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )?;
    let mut bus = I2cAdapter::new(i2c);
    info!("I2C bus initialized (SDA={} SCL={})", pins::I2C_SDA_GPIO, pins::I2C_SCL_GPIO);

    // ── 2. Load config from FRAM (or defaults) ────────────────
    let config = match bus.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("FRAM config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    if let Err(e) = hw_init::init_peripherals(u32::from(config.servo_open_pulse_us)) {
        // Without the servo the device cannot do its job.
        error!("HAL init failed: {}, halting", e);
        halt();
    }
    if let Err(e) = hw_init::init_isr_service() {
        error!("ISR service init failed: {}, motion falls back to level polling", e);
    }

    let mut sink = LogEventSink::new();

    // ── 3. Fuel gauge ─────────────────────────────────────────
    if let Err(e) = bus.probe_gauge() {
        warn!("fuel gauge not responding: {}", e);
    }
    match bus.read_battery() {
        Ok(reading) => sink.emit(&AppEvent::Battery(reading)),
        Err(e) => warn!("fuel gauge read failed: {}", e),
    }

    // ── 4. Camera + classifier ────────────────────────────────
    let camera = match Camera::init() {
        Ok(camera) => camera,
        Err(e) => {
            error!("camera init failed: {}, halting", e);
            halt();
        }
    };
    let mut engine = match ClassifierEngine::new(model_blob(), EngineConfig::default(), &mut SystemPools) {
        Ok(engine) => engine,
        Err(e) => {
            error!("classifier init failed: {}, halting", e);
            halt();
        }
    };
    if engine.is_degraded() {
        warn!("no model embedded; every sample classifies as UNKNOWN");
    }

    let mut hw = HardwareAdapter::new(
        camera,
        ServoDriver::new(
            u32::from(config.servo_open_pulse_us),
            u32::from(config.servo_closed_pulse_us),
        ),
        PirSensor::new(config.motion_debounce_ms),
        Esp32TimeAdapter::new(),
    );
    let mut power = PowerAdapter::new();

    // ── 5. Lid open ───────────────────────────────────────────
    let mut service = DetectionService::new(config.clone());
    service.start(&mut hw, &mut sink);

    // ── 6. Wiring check ───────────────────────────────────────
    hw.sleep_ms(BOOT_CAPTURE_DELAY_MS);
    match hw.acquire() {
        Ok(frame) => {
            let view = frame.view();
            info!(
                "boot capture {}x{} ({} bytes, {:?})",
                view.width,
                view.height,
                view.data.len(),
                view.encoding
            );
            hw.release(frame);
        }
        Err(e) => warn!("boot capture failed: {}", e),
    }

    info!("System ready. Waiting for motion.");

    // ── 7. Episode loop ───────────────────────────────────────
    loop {
        watchdog.feed();

        if hw.take_fuel_alerts() > 0 {
            match bus.read_battery() {
                Ok(reading) => sink.emit(&AppEvent::Battery(reading)),
                Err(e) => warn!("fuel gauge read failed: {}", e),
            }
        }

        if hw.wait_for_motion(Some(MOTION_WAIT_SLICE_MS)) == MotionWait::TimedOut {
            continue;
        }

        watchdog.feed();
        service.run_episode(&mut hw, &mut engine, &mut sink);
        watchdog.feed();

        power.prepare_sleep();
        info!(
            "lid {:?}; quiet for {} ms (sleep prep #{})",
            hw.lid_position(),
            config.retrigger_quiet_ms,
            power.prepared_count()
        );
        hw.sleep_ms(config.retrigger_quiet_ms);
    }
}
