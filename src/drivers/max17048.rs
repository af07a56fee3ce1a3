//! MAX17048 single-cell fuel gauge (I²C, address 0x36).
//!
//! The driver holds no bus; every call borrows it, so the gauge and the
//! FRAM can share one `embedded-hal` I²C bus without a mutex.
//!
//! | Register | Address | Scale |
//! |----------|---------|-------|
//! | VCELL    | 0x02    | 78.125 µV / LSB |
//! | SOC      | 0x04    | high byte %, low byte 1/256 % |
//! | MODE     | 0x06    | 0x4000 = quick-start |
//! | VERSION  | 0x08    | |

use embedded_hal::i2c::I2c;

use crate::app::ports::BatteryReading;
use crate::error::BusError;
use crate::pins;

const REG_VCELL: u8 = 0x02;
const REG_SOC: u8 = 0x04;
const REG_MODE: u8 = 0x06;
const REG_VERSION: u8 = 0x08;

const MODE_QUICK_START: u16 = 0x4000;

/// VCELL LSB in nanovolts.
const VCELL_NV_PER_LSB: u32 = 78_125;

pub struct Max17048 {
    address: u8,
}

impl Default for Max17048 {
    fn default() -> Self {
        Self::new()
    }
}

impl Max17048 {
    pub const fn new() -> Self {
        Self {
            address: pins::FUEL_GAUGE_ADDR,
        }
    }

    pub fn version<I: I2c>(&self, bus: &mut I) -> Result<u16, BusError> {
        self.read_reg(bus, REG_VERSION)
    }

    /// Restart the SOC algorithm from the current cell voltage.
    pub fn quick_start<I: I2c>(&self, bus: &mut I) -> Result<(), BusError> {
        let [hi, lo] = MODE_QUICK_START.to_be_bytes();
        bus.write(self.address, &[REG_MODE, hi, lo])
            .map_err(|e| BusError::from_i2c(&e))
    }

    pub fn read<I: I2c>(&self, bus: &mut I) -> Result<BatteryReading, BusError> {
        let vcell = self.read_reg(bus, REG_VCELL)?;
        let soc = self.read_reg(bus, REG_SOC)?;
        Ok(BatteryReading {
            millivolts: vcell_to_millivolts(vcell),
            percent: soc_to_percent(soc),
        })
    }

    fn read_reg<I: I2c>(&self, bus: &mut I, reg: u8) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        bus.write_read(self.address, &[reg], &mut buf)
            .map_err(|e| BusError::from_i2c(&e))?;
        Ok(u16::from_be_bytes(buf))
    }
}

pub fn vcell_to_millivolts(raw: u16) -> u16 {
    (u32::from(raw) * VCELL_NV_PER_LSB / 1_000_000) as u16
}

pub fn soc_to_percent(raw: u16) -> f32 {
    let [whole, frac] = raw.to_be_bytes();
    f32::from(whole) + f32::from(frac) / 256.0
}
