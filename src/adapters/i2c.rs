//! I²C adapter — owns the shared bus and the two devices on it.
//!
//! Implements [`BatteryPort`] over the MAX17048 here and
//! [`ConfigPort`](crate::app::ports::ConfigPort) over the FRAM in
//! [`fram_store`](super::fram_store).  Generic over any `embedded-hal` 1.0
//! bus, so host tests drive it with an in-memory fake.

use embedded_hal::i2c::I2c;
use log::info;

use crate::app::ports::{BatteryPort, BatteryReading};
use crate::drivers::fram::Fram;
use crate::drivers::max17048::Max17048;
use crate::error::BusError;

pub struct I2cAdapter<I> {
    pub(super) bus: I,
    pub(super) fram: Fram,
    gauge: Max17048,
}

impl<I: I2c> I2cAdapter<I> {
    pub fn new(bus: I) -> Self {
        Self {
            bus,
            fram: Fram::new(),
            gauge: Max17048::new(),
        }
    }

    /// Check the fuel gauge answers and log its silicon version.
    pub fn probe_gauge(&mut self) -> Result<u16, BusError> {
        let version = self.gauge.version(&mut self.bus)?;
        info!("MAX17048 detected (version 0x{:04X})", version);
        Ok(version)
    }

    pub fn quick_start_gauge(&mut self) -> Result<(), BusError> {
        self.gauge.quick_start(&mut self.bus)
    }

    /// Give the bus back (tests inspect the fake device behind it).
    pub fn into_bus(self) -> I {
        self.bus
    }
}

impl<I: I2c> BatteryPort for I2cAdapter<I> {
    fn read_battery(&mut self) -> Result<BatteryReading, BusError> {
        self.gauge.read(&mut self.bus)
    }
}
