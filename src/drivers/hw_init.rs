//! One-shot hardware peripheral initialization.
//!
//! Configures the PIR and fuel-alert inputs and the servo LEDC timer and
//! channel using raw ESP-IDF sys calls, then hooks the GPIO ISRs into the
//! event queue.  Called once from `main()` before the first episode.

use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcInitFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed(rc)   => write!(f, "LEDC timer/channel config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

/// Set once the servo LEDC channel is live.
static SERVO_READY: AtomicBool = AtomicBool::new(cfg!(not(target_os = "espidf")));

pub fn servo_ready() -> bool {
    SERVO_READY.load(Ordering::Acquire)
}

#[cfg(target_os = "espidf")]
pub fn init_peripherals(initial_pulse_us: u32) -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the first episode; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_ledc(initial_pulse_us)?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals(_initial_pulse_us: u32) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // PIR output is push-pull; no pulls.
    let pir = gpio_config_t {
        pin_bit_mask: 1u64 << pins::PIR_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    let ret = unsafe { gpio_config(&pir) };
    if ret != ESP_OK as i32 { return Err(HwInitError::GpioConfigFailed(ret)); }

    // ALRT is open drain, active low.
    let alert = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FUEL_ALERT_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    let ret = unsafe { gpio_config(&alert) };
    if ret != ESP_OK as i32 { return Err(HwInitError::GpioConfigFailed(ret)); }

    info!("hw_init: GPIO inputs configured (PIR=GPIO{}, ALRT=GPIO{})", pins::PIR_GPIO, pins::FUEL_ALERT_GPIO);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin.
    (unsafe { gpio_get_level(pin) }) != 0
}

// ── LEDC PWM ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_ledc(initial_pulse_us: u32) -> Result<(), HwInitError> {
    // Timer 1: servo (50 Hz, 14-bit, APB clock for resolution at low freq).
    // Timer 0 belongs to the camera XCLK.
    let timer = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: pins::SERVO_LEDC_TIMER,
        duty_resolution: pins::SERVO_PWM_RESOLUTION_BITS,
        freq_hz: pins::SERVO_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_USE_APB_CLK,
        ..Default::default()
    };
    let ret = unsafe { ledc_timer_config(&timer) };
    if ret != ESP_OK as i32 { return Err(HwInitError::LedcInitFailed(ret)); }

    let ret = unsafe { ledc_channel_config(&ledc_channel_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        channel: pins::SERVO_LEDC_CHANNEL,
        timer_sel: pins::SERVO_LEDC_TIMER,
        gpio_num: pins::SERVO_GPIO,
        duty: crate::drivers::servo::pulse_to_duty(initial_pulse_us),
        hpoint: 0,
        ..Default::default()
    }) };
    if ret != ESP_OK as i32 { return Err(HwInitError::LedcInitFailed(ret)); }

    SERVO_READY.store(true, Ordering::Release);
    info!("hw_init: LEDC configured (servo=T{}/CH{} on GPIO{})",
        pins::SERVO_LEDC_TIMER, pins::SERVO_LEDC_CHANNEL, pins::SERVO_GPIO);
    Ok(())
}

/// Write a new duty to the servo channel. Returns the ESP-IDF error code
/// on failure.
#[cfg(target_os = "espidf")]
pub fn servo_set_duty(duty: u32) -> Result<(), i32> {
    // SAFETY: channel configured in init_ledc(); only the episode task
    // drives the servo.
    unsafe {
        let ret = ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, pins::SERVO_LEDC_CHANNEL, duty);
        if ret != ESP_OK as i32 { return Err(ret); }
        let ret = ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, pins::SERVO_LEDC_CHANNEL);
        if ret != ESP_OK as i32 { return Err(ret); }
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn servo_set_duty(_duty: u32) -> Result<(), i32> {
    Ok(())
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
use crate::events::{push_event, Event};

#[cfg(target_os = "espidf")]
unsafe extern "C" fn pir_gpio_isr(_arg: *mut core::ffi::c_void) {
    push_event(Event::MotionDetected);
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn fuel_alert_isr(_arg: *mut core::ffi::c_void) {
    push_event(Event::FuelAlert);
}

/// Install per-pin GPIO ISR service and register interrupt handlers.
/// Call after init_peripherals().
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed. Handlers only push to the lock-free
    // event queue.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        gpio_isr_handler_add(pins::PIR_GPIO, Some(pir_gpio_isr), core::ptr::null_mut());
        gpio_intr_enable(pins::PIR_GPIO);

        gpio_isr_handler_add(pins::FUEL_ALERT_GPIO, Some(fuel_alert_isr), core::ptr::null_mut());
        gpio_intr_enable(pins::FUEL_ALERT_GPIO);

        info!("hw_init: ISR service installed (pir, fuel alert)");
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
