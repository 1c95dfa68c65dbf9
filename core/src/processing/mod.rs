pub mod commonband;
pub mod subband;
pub mod upsample;

pub use commonband::CommonBandStage;
pub use subband::RangeSubbandStage;
pub use upsample::UpsampleStage;

use crate::prelude::{check_len, SignalError, SignalResult, StageConfig};
use ndarray::Array2;
use num_complex::Complex64;

fn check_block(config: &StageConfig, block: &Array2<Complex64>) -> SignalResult<()> {
    let (rows, columns) = block.dim();
    check_len("block rows", config.rows, rows)?;
    check_len("block columns", config.columns, columns)
}

fn block_from_vec(rows: usize, columns: usize, samples: Vec<Complex64>) -> SignalResult<Array2<Complex64>> {
    Array2::from_shape_vec((rows, columns), samples).map_err(|err| SignalError::Internal(err.to_string()))
}

/// Share of kernel coefficients that are not zero.
fn passband_fraction(kernel: &Array2<Complex64>) -> f64 {
    if kernel.is_empty() {
        return 0.0;
    }
    let passing = kernel.iter().filter(|c| c.norm() > 0.0).count();
    passing as f64 / kernel.len() as f64
}
