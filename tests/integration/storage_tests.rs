//! Config persistence and fuel-gauge reads through the shared I²C adapter.

use lidguard::adapters::i2c::I2cAdapter;
use lidguard::app::ports::{BatteryPort, ConfigError, ConfigPort};
use lidguard::config::SystemConfig;
use lidguard::error::BusError;
use lidguard::vision::Label;

use crate::mock_hw::FakeBus;

fn tuned() -> SystemConfig {
    SystemConfig {
        window_ms: 8_000,
        consecutive_needed: 3,
        threat_confidence: 0.85,
        threat_labels: heapless::Vec::from_slice(&[Label::Crow, Label::Magpie]).unwrap(),
        ..SystemConfig::default()
    }
}

#[test]
fn blank_fram_loads_defaults() {
    let mut adapter = I2cAdapter::new(FakeBus::new());
    assert_eq!(adapter.load().unwrap(), SystemConfig::default());

    let mut erased = FakeBus::new();
    erased.fram.fill(0xFF);
    let mut adapter = I2cAdapter::new(erased);
    assert_eq!(adapter.load().unwrap(), SystemConfig::default());
}

#[test]
fn saved_config_survives_reload() {
    let mut adapter = I2cAdapter::new(FakeBus::new());
    adapter.save(&tuned()).unwrap();

    // A fresh adapter over the same memory sees the record.
    let bus = adapter.into_bus();
    assert_eq!(&bus.fram[..4], b"LGCF");
    let mut adapter = I2cAdapter::new(bus);
    assert_eq!(adapter.load().unwrap(), tuned());
}

#[test]
fn corrupted_record_is_rejected() {
    let mut adapter = I2cAdapter::new(FakeBus::new());
    adapter.save(&tuned()).unwrap();
    let mut bus = adapter.into_bus();
    bus.fram[10] ^= 0x40;

    let mut adapter = I2cAdapter::new(bus);
    assert_eq!(adapter.load(), Err(ConfigError::Corrupted));
}

#[test]
fn invalid_config_is_not_written() {
    let mut adapter = I2cAdapter::new(FakeBus::new());
    let bad = SystemConfig {
        consecutive_needed: 0,
        ..SystemConfig::default()
    };
    assert!(matches!(adapter.save(&bad), Err(ConfigError::ValidationFailed(_))));
    assert!(adapter.into_bus().fram.iter().all(|&b| b == 0));
}

#[test]
fn bus_failure_surfaces_as_io() {
    let mut bus = FakeBus::new();
    bus.fram_broken = true;
    let mut adapter = I2cAdapter::new(bus);
    assert_eq!(adapter.load(), Err(ConfigError::Io(BusError::Transfer)));
}

#[test]
fn battery_reading_shares_the_bus() {
    let mut adapter = I2cAdapter::new(FakeBus::new());
    assert_eq!(adapter.probe_gauge().unwrap(), 0x0012);
    adapter.save(&tuned()).unwrap();

    let reading = adapter.read_battery().unwrap();
    assert_eq!(reading.millivolts, 4_160);
    assert!((reading.percent - 84.5).abs() < f32::EPSILON);

    adapter.quick_start_gauge().unwrap();
    assert_eq!(adapter.into_bus().gauge[&0x06], 0x4000);
}

#[test]
fn missing_gauge_is_nack() {
    let mut bus = FakeBus::new();
    bus.gauge_present = false;
    let mut adapter = I2cAdapter::new(bus);
    assert_eq!(adapter.read_battery(), Err(BusError::Nack));
}
