use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Shared configuration for each processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Azimuth lines in a block.
    pub rows: usize,
    /// Range samples per line.
    pub columns: usize,
}

/// Input payload for a processing stage: one complex block in row-major order.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub block: Array2<Complex64>,
    pub timestamp: Option<f64>,
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub block: Array2<Complex64>,
    pub metadata: StageMetadata,
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageMetadata {
    pub output_rms: Option<f64>,
    pub passband_fraction: Option<f64>,
    pub zero_overlap_lines: Option<usize>,
    pub notes: Vec<String>,
}

impl StageMetadata {
    pub fn to_json(&self) -> SignalResult<String> {
        serde_json::to_string(self).map_err(|err| SignalError::Internal(err.to_string()))
    }
}

/// Common error type for the transform engine, the filters and the stages.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("plan creation failed: {0}")]
    PlanCreation(String),
    #[error("device allocation of {requested} bytes failed ({available} bytes available)")]
    DeviceAllocation { requested: usize, available: usize },
    #[error("resource not set: {0}")]
    UnsetResource(&'static str),
    #[error("unsupported filter type: {0}")]
    UnsupportedFilterType(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type SignalResult<T> = Result<T, SignalError>;

pub(crate) fn check_len(context: &'static str, expected: usize, actual: usize) -> SignalResult<()> {
    if expected != actual {
        return Err(SignalError::DimensionMismatch {
            context,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Trait describing object-oriented signal-processing stages.
pub trait ProcessingStage {
    fn initialize(&mut self, config: &StageConfig) -> SignalResult<()>;
    fn execute(&mut self, input: StageInput) -> SignalResult<StageOutput>;
    fn cleanup(&mut self);
}
