//! Power adapter — the single boundary into the power subsystem.
//!
//! After each episode the main task calls [`PowerPort::prepare_sleep`].
//! On the device this arms the PIR line as a light-sleep wake source so a
//! power manager can drop into light sleep during the quiet period; the
//! sleep itself is scheduled elsewhere.

use log::{debug, warn};

use crate::app::ports::PowerPort;

#[derive(Default)]
pub struct PowerAdapter {
    armed: bool,
    prepared: u32,
}

impl PowerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `prepare_sleep` calls so far.
    pub fn prepared_count(&self) -> u32 {
        self.prepared
    }

    #[cfg(target_os = "espidf")]
    fn arm_wake_source(&mut self) -> Result<(), i32> {
        use esp_idf_svc::sys::*;
        // SAFETY: plain register configuration on an already-configured
        // input pin; main task only.
        unsafe {
            let ret = gpio_wakeup_enable(crate::pins::PIR_GPIO, gpio_int_type_t_GPIO_INTR_HIGH_LEVEL);
            if ret != ESP_OK as i32 { return Err(ret); }
            let ret = esp_sleep_enable_gpio_wakeup();
            if ret != ESP_OK as i32 { return Err(ret); }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn arm_wake_source(&mut self) -> Result<(), i32> {
        Ok(())
    }
}

impl PowerPort for PowerAdapter {
    fn prepare_sleep(&mut self) {
        self.prepared = self.prepared.wrapping_add(1);
        if self.armed {
            return;
        }
        match self.arm_wake_source() {
            Ok(()) => {
                self.armed = true;
                debug!("power: PIR armed as wake source");
            }
            Err(rc) => warn!("power: wake source setup failed (rc={})", rc),
        }
    }
}
