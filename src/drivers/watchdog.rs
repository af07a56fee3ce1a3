//! Task watchdog (TWDT).
//!
//! The main task subscribes once at boot and feeds between motion waits
//! and around each episode.  An episode runs without feeding, so its
//! worst case (window, cool-down, slack) has to fit inside the timeout;
//! [`episode_fits`] is the check `SystemConfig::validate` applies.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{ESP_OK, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_reconfigure, esp_task_wdt_reset};
use log::{info, warn};

use crate::config::{EPISODE_SLACK_MS, WATCHDOG_TIMEOUT_MS};

/// Whether one unfed episode stays inside the watchdog timeout.
pub const fn episode_fits(window_ms: u32, reopen_cooldown_ms: u32) -> bool {
    (window_ms as u64) + (reopen_cooldown_ms as u64) + (EPISODE_SLACK_MS as u64) <= WATCHDOG_TIMEOUT_MS as u64
}

pub struct Watchdog {
    armed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: core::cell::Cell<u32>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Reconfigure the TWDT to panic after [`WATCHDOG_TIMEOUT_MS`] and add
    /// the calling task.  A failed subscription leaves the device
    /// unguarded but running.
    pub fn new() -> Self {
        let armed = subscribe();
        if armed {
            info!("watchdog armed ({} ms, panic on expiry)", WATCHDOG_TIMEOUT_MS);
        } else {
            warn!("watchdog not armed; a hung episode will not reset the device");
        }
        Self {
            armed,
            #[cfg(not(target_os = "espidf"))]
            feeds: core::cell::Cell::new(0),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn feed(&self) {
        if !self.armed {
            return;
        }
        #[cfg(target_os = "espidf")]
        unsafe {
            esp_task_wdt_reset();
        }
        #[cfg(not(target_os = "espidf"))]
        self.feeds.set(self.feeds.get() + 1);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn feeds(&self) -> u32 {
        self.feeds.get()
    }
}

#[cfg(target_os = "espidf")]
fn subscribe() -> bool {
    let cfg = esp_task_wdt_config_t {
        timeout_ms: WATCHDOG_TIMEOUT_MS,
        idle_core_mask: 0,
        trigger_panic: true,
    };
    // SAFETY: plain FFI calls; a null handle means the calling task.
    unsafe {
        let rc = esp_task_wdt_reconfigure(&cfg);
        if rc != ESP_OK as i32 {
            warn!("TWDT reconfigure returned {} (keeping existing settings)", rc);
        }
        let rc = esp_task_wdt_add(core::ptr::null_mut());
        if rc != ESP_OK as i32 {
            warn!("TWDT add failed ({})", rc);
            return false;
        }
    }
    true
}

#[cfg(not(target_os = "espidf"))]
fn subscribe() -> bool {
    true
}
