//! Sensor drivers.
//!
//! The camera is driven through its own component and lives with the
//! frame adapter in [`crate::adapters::camera`].

pub mod pir;
