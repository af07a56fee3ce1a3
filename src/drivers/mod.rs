//! Actuator and bus-device drivers, plus one-shot hardware initialisation.

pub mod fram;
pub mod hw_init;
pub mod max17048;
pub mod servo;
pub mod watchdog;
