//! MB85RC256V FRAM (32 KiB, I²C, 16-bit memory address).
//!
//! Like the fuel gauge, the driver borrows the bus per call.  Writes are a
//! single transaction (address bytes then data, no repeated start), so no
//! staging buffer is needed.

use embedded_hal::i2c::{I2c, Operation};

use crate::error::BusError;
use crate::pins;

/// 256 Kbit.
pub const FRAM_CAPACITY: usize = 32 * 1024;

pub struct Fram {
    address: u8,
}

impl Default for Fram {
    fn default() -> Self {
        Self::new()
    }
}

impl Fram {
    pub const fn new() -> Self {
        Self {
            address: pins::FRAM_ADDR,
        }
    }

    pub fn read<I: I2c>(&self, bus: &mut I, offset: u16, buf: &mut [u8]) -> Result<(), BusError> {
        check_range(offset, buf.len())?;
        bus.write_read(self.address, &offset.to_be_bytes(), buf)
            .map_err(|e| BusError::from_i2c(&e))
    }

    pub fn write<I: I2c>(&self, bus: &mut I, offset: u16, data: &[u8]) -> Result<(), BusError> {
        check_range(offset, data.len())?;
        let addr = offset.to_be_bytes();
        bus.transaction(self.address, &mut [Operation::Write(&addr), Operation::Write(data)])
            .map_err(|e| BusError::from_i2c(&e))
    }
}

fn check_range(offset: u16, len: usize) -> Result<(), BusError> {
    if len == 0 || usize::from(offset) + len > FRAM_CAPACITY {
        return Err(BusError::OutOfRange);
    }
    Ok(())
}
