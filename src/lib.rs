//! LidGuard firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod fsm;
pub mod pins;
pub mod vision;

// The adapters and drivers compile on the host against simulation stubs.
pub mod adapters;
pub mod drivers;
pub mod sensors;
