use crate::device::memory::Device;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    check_len, ProcessingStage, SignalError, SignalResult, StageConfig, StageInput, StageMetadata,
    StageOutput,
};
use crate::processing::{block_from_vec, check_block};
use crate::signal::engine::SignalZ2Z;
use crate::signal::upsample::upsample_host;
use crate::telemetry::LogManager;
use ndarray::Array2;
use num_complex::Complex64;

/// Range upsampling by an integer factor, with an optional shift-impact
/// kernel applied to the padded spectrum.
pub struct UpsampleStage {
    fwd: SignalZ2Z,
    inv: SignalZ2Z,
    factor: usize,
    shift_impact: Option<Vec<Complex64>>,
    config: Option<StageConfig>,
    logger: LogManager,
}

impl UpsampleStage {
    pub fn new(device: &Device, factor: usize) -> Self {
        Self {
            fwd: SignalZ2Z::new(device),
            inv: SignalZ2Z::new(device),
            factor,
            shift_impact: None,
            config: None,
            logger: LogManager::new("upsample"),
        }
    }

    /// Sets a `rows x columns * factor` phase kernel applied to every block.
    pub fn with_shift_impact(mut self, impact: Array2<Complex64>) -> Self {
        self.shift_impact = Some(impact.iter().copied().collect());
        self
    }

    pub fn factor(&self) -> usize {
        self.factor
    }
}

impl ProcessingStage for UpsampleStage {
    fn initialize(&mut self, config: &StageConfig) -> SignalResult<()> {
        if self.factor == 0 {
            return Err(SignalError::InvalidParameter(
                "upsample factor must be at least 1".into(),
            ));
        }
        let upsampled = config.columns.checked_mul(self.factor).ok_or_else(|| {
            SignalError::InvalidParameter(format!(
                "{} columns cannot be upsampled by {}",
                config.columns, self.factor
            ))
        })?;
        if let Some(impact) = &self.shift_impact {
            check_len("shift impact", config.rows * upsampled, impact.len())?;
        }
        self.fwd.configure_range(config.rows, config.columns)?;
        self.inv.configure_range(config.rows, upsampled)?;
        self.config = Some(config.clone());
        self.logger.record(&format!(
            "upsampling {}x{} blocks by {}",
            config.rows, config.columns, self.factor
        ));
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> SignalResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or(SignalError::UnsetResource("stage configuration"))?;
        check_block(config, &input.block)?;

        let samples: Vec<Complex64> = input.block.iter().copied().collect();
        let mut output = vec![Complex64::new(0.0, 0.0); self.inv.num_elements()];
        upsample_host(
            &mut self.fwd,
            &mut self.inv,
            &samples,
            &mut output,
            self.factor,
            self.shift_impact.as_deref(),
        )?;

        let rms = StatsHelper::rms(&output);
        self.logger.trace(&format!("upsampled block RMS {:.4}", rms));
        let metadata = StageMetadata {
            output_rms: Some(rms),
            notes: vec![format!("upsampled x{} RMS {:.4}", self.factor, rms)],
            ..Default::default()
        };
        Ok(StageOutput {
            block: block_from_vec(config.rows, self.inv.columns(), output)?,
            metadata,
        })
    }

    fn cleanup(&mut self) {
        self.fwd.reset();
        self.inv.reset();
        self.config = None;
    }
}
