pub mod kernels;
pub mod memory;

pub use kernels::{LaunchConfig, ShiftGeometry};
pub use memory::{Device, DeviceBuffer};
