//! GPIO / peripheral pin assignments for the LidGuard board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// PIR motion sensor (HC-SR501 / AM312)
// ---------------------------------------------------------------------------

/// Digital input, HIGH while motion is present. Rising-edge interrupt.
pub const PIR_GPIO: i32 = 16;

// ---------------------------------------------------------------------------
// Lid servo (SG90 class)
// ---------------------------------------------------------------------------

pub const SERVO_GPIO: i32 = 2;
/// Standard hobby-servo frame rate.
pub const SERVO_PWM_FREQ_HZ: u32 = 50;
/// LEDC resolution for the servo channel (14-bit → 0 – 16383).
pub const SERVO_PWM_RESOLUTION_BITS: u32 = 14;
/// Hard pulse limits of the servo; commanded pulses are clamped to these.
pub const SERVO_PULSE_MIN_US: u32 = 500;
pub const SERVO_PULSE_MAX_US: u32 = 2500;

// ---------------------------------------------------------------------------
// I²C bus (FRAM, fuel gauge)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 8;
pub const I2C_SCL_GPIO: i32 = 9;
pub const I2C_FREQ_HZ: u32 = 400_000;

/// MB85RC256 FRAM 7-bit address (A0–A2 tied low).
pub const FRAM_ADDR: u8 = 0x50;
/// MAX17048 fuel gauge 7-bit address (fixed).
pub const FUEL_GAUGE_ADDR: u8 = 0x36;
/// MAX17048 ALRT output, open drain, active LOW.
pub const FUEL_ALERT_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// Camera (OV2640 on a DVP breakout)
// ---------------------------------------------------------------------------

/// -1 = not wired.
pub const CAM_PWDN_GPIO: i32 = -1;
pub const CAM_RESET_GPIO: i32 = -1;
pub const CAM_XCLK_GPIO: i32 = 10;
/// SCCB runs on its own I²C controller, away from the FRAM bus.
pub const CAM_SIOD_GPIO: i32 = 38;
pub const CAM_SIOC_GPIO: i32 = 39;
pub const CAM_SCCB_I2C_PORT: i32 = 1;
/// Breakout labels D2–D9 map to sensor data lines D0–D7 in order.
pub const CAM_DATA_GPIOS: [i32; 8] = [11, 12, 13, 14, 17, 18, 21, 47];
pub const CAM_VSYNC_GPIO: i32 = 40;
pub const CAM_HREF_GPIO: i32 = 41;
pub const CAM_PCLK_GPIO: i32 = 42;
pub const CAM_XCLK_FREQ_HZ: i32 = 20_000_000;

// ---------------------------------------------------------------------------
// LEDC allocation
// ---------------------------------------------------------------------------

/// Timer 0 / channel 0 drive the camera XCLK.
pub const CAM_LEDC_TIMER: u32 = 0;
pub const CAM_LEDC_CHANNEL: u32 = 0;
pub const SERVO_LEDC_TIMER: u32 = 1;
pub const SERVO_LEDC_CHANNEL: u32 = 1;
