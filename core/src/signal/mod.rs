pub mod engine;
pub mod upsample;

pub use engine::{ConfiguredSignal, Signal, SignalC2C, SignalZ2Z};
pub use upsample::{shift, upsample, upsample_host};
