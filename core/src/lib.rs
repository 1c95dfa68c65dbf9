//! Device-resident FFT engine and frequency-domain filters for
//! interferometric SAR processing.
//!
//! Blocks of complex samples are moved onto a (simulated) accelerator,
//! transformed along range, azimuth or both, multiplied by sub-band or
//! common-band kernels and transformed back. Device memory is held only by
//! scoped buffers and every engine carries an explicit configuration state.

pub mod device;
pub mod filter;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod signal;
pub mod telemetry;

pub use device::{Device, DeviceBuffer};
pub use filter::{BandpassConfig, CommonBandParams, Filter, FilterType, SubBand};
pub use prelude::{ProcessingStage, SignalError, SignalResult, StageInput, StageOutput};
pub use signal::{Signal, SignalC2C, SignalZ2Z};
