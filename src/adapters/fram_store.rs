//! Persistent configuration record in FRAM.
//!
//! ```text
//! offset 0   "LGCF"            magic
//!        4   u16 LE            payload length
//!        6   [u8; len]         postcard(SystemConfig)
//!        6+len [u8; 4]         SHA-256(payload)[..4]
//! ```
//!
//! A blank chip (header all 0x00 or all 0xFF) reads as "no record" and
//! yields defaults.  Anything else that fails the magic, length, checksum
//! or decode is [`ConfigError::Corrupted`].

use embedded_hal::i2c::I2c;
use hmac_sha256::Hash;
use log::{info, warn};

use super::i2c::I2cAdapter;
use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

pub const RECORD_MAGIC: [u8; 4] = *b"LGCF";
/// Byte offset of the record inside the FRAM.
pub const RECORD_OFFSET: u16 = 0;
pub const HEADER_LEN: usize = 6;
pub const CHECKSUM_LEN: usize = 4;
/// Upper bound on the encoded payload.
pub const MAX_PAYLOAD: usize = 256;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Hash::hash(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Validate and encode `config` as a complete record.
pub fn encode_record(config: &SystemConfig) -> Result<Vec<u8>, ConfigError> {
    config.validate()?;
    let payload = postcard::to_allocvec(config).map_err(|_| ConfigError::Corrupted)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(ConfigError::StorageFull);
    }
    let mut record = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    record.extend_from_slice(&RECORD_MAGIC);
    record.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    record.extend_from_slice(&payload);
    record.extend_from_slice(&checksum(&payload));
    Ok(record)
}

/// Parse a record header. `Ok(None)` means blank storage.
pub fn payload_len(header: &[u8; HEADER_LEN]) -> Result<Option<usize>, ConfigError> {
    if header.iter().all(|&b| b == 0x00) || header.iter().all(|&b| b == 0xFF) {
        return Ok(None);
    }
    if header[..4] != RECORD_MAGIC {
        return Err(ConfigError::Corrupted);
    }
    let len = usize::from(u16::from_le_bytes([header[4], header[5]]));
    if len == 0 || len > MAX_PAYLOAD {
        return Err(ConfigError::Corrupted);
    }
    Ok(Some(len))
}

/// Check and decode the bytes following the header (payload + checksum).
pub fn decode_body(body: &[u8]) -> Result<SystemConfig, ConfigError> {
    let split = body
        .len()
        .checked_sub(CHECKSUM_LEN)
        .ok_or(ConfigError::Corrupted)?;
    let (payload, sum) = body.split_at(split);
    if checksum(payload) != sum {
        return Err(ConfigError::Corrupted);
    }
    let config: SystemConfig = postcard::from_bytes(payload).map_err(|_| ConfigError::Corrupted)?;
    config.validate()?;
    Ok(config)
}

impl<I: I2c> ConfigPort for I2cAdapter<I> {
    fn load(&mut self) -> Result<SystemConfig, ConfigError> {
        let mut header = [0u8; HEADER_LEN];
        self.fram.read(&mut self.bus, RECORD_OFFSET, &mut header)?;
        let Some(len) = payload_len(&header)? else {
            info!("FramStore: no stored config, using defaults");
            return Ok(SystemConfig::default());
        };

        let mut body = vec![0u8; len + CHECKSUM_LEN];
        self.fram
            .read(&mut self.bus, RECORD_OFFSET + HEADER_LEN as u16, &mut body)?;
        let config = decode_body(&body).inspect_err(|e| warn!("FramStore: stored config rejected: {}", e))?;
        info!("FramStore: loaded config ({} bytes)", len);
        Ok(config)
    }

    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError> {
        let record = encode_record(config)?;
        self.fram.write(&mut self.bus, RECORD_OFFSET, &record)?;
        info!("FramStore: config saved ({} bytes)", record.len());
        Ok(())
    }
}
