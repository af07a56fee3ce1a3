//! Application core, free of I/O.
//!
//! The episode protocol lives in [`service`]. Hardware is reached only
//! through the **port traits** in [`ports`], so the whole layer runs under
//! host tests with mock adapters.

pub mod events;
pub mod ports;
pub mod service;
