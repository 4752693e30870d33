//! Media device implementations

pub mod simulated;

pub use simulated::{DeviceStats, SimulatedDevices};
