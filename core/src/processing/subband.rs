use crate::device::memory::Device;
use crate::filter::applicator::Filter;
use crate::filter::design::BandpassConfig;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, SignalError, SignalResult, StageConfig, StageInput, StageMetadata,
    StageOutput,
};
use crate::processing::{block_from_vec, check_block, passband_fraction};
use crate::telemetry::LogManager;
use num_complex::Complex64;

/// Range sub-band filtering of double-precision blocks.
pub struct RangeSubbandStage {
    filter: Filter<f64>,
    bandpass: BandpassConfig,
    config: Option<StageConfig>,
    passband: f64,
    logger: LogManager,
}

impl RangeSubbandStage {
    pub fn new(device: &Device, bandpass: BandpassConfig) -> Self {
        Self {
            filter: Filter::new(device),
            bandpass,
            config: None,
            passband: 0.0,
            logger: LogManager::new("range-subband"),
        }
    }

    pub fn filter(&self) -> &Filter<f64> {
        &self.filter
    }
}

impl ProcessingStage for RangeSubbandStage {
    fn initialize(&mut self, config: &StageConfig) -> SignalResult<()> {
        self.filter
            .construct_range_bandpass(&self.bandpass, config.rows, config.columns)?;
        self.passband = passband_fraction(&self.filter.kernel_to_host()?);
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> SignalResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or(SignalError::UnsetResource("stage configuration"))?;
        check_block(config, &input.block)?;

        let mut samples: Vec<Complex64> = input.block.iter().copied().collect();
        let mut spectrum = vec![Complex64::new(0.0, 0.0); samples.len()];
        self.filter.filter_host(&mut samples, &mut spectrum)?;

        let rms = StatsHelper::rms(&samples);
        self.logger.record(&format!(
            "range sub-band RMS {:.4}, pass band {:.1}%",
            rms,
            100.0 * self.passband
        ));

        let metadata = StageMetadata {
            output_rms: Some(rms),
            passband_fraction: Some(self.passband),
            notes: vec![format!("{} range sub-band RMS {:.4}", self.bandpass.filter_type, rms)],
            ..Default::default()
        };
        Ok(StageOutput {
            block: block_from_vec(config.rows, config.columns, samples)?,
            metadata,
        })
    }

    fn cleanup(&mut self) {
        self.filter.release();
        self.config = None;
        self.passband = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::design::{FilterType, SubBand, DEFAULT_COSINE_BETA};
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn bandpass(center: f64, bandwidth: f64) -> BandpassConfig {
        BandpassConfig {
            sampling_frequency: 32.0,
            sub_bands: vec![SubBand::new(center, bandwidth)],
            filter_type: FilterType::Boxcar,
            beta: DEFAULT_COSINE_BETA,
        }
    }

    #[test]
    fn subband_stage_keeps_only_in_band_tone() {
        let device = Device::new();
        let mut stage = RangeSubbandStage::new(&device, bandpass(-4.0, 2.0));
        let config = StageConfig {
            rows: 4,
            columns: 32,
        };
        stage.initialize(&config).unwrap();

        let block = Array2::from_shape_fn((4, 32), |(_, col)| {
            let t = col as f64 / 32.0;
            Complex64::from_polar(1.0, -2.0 * PI * 4.0 * t) + Complex64::from_polar(1.0, 2.0 * PI * 9.0 * t)
        });
        let output = stage
            .execute(StageInput {
                block,
                timestamp: Some(0.0),
            })
            .unwrap();

        for ((_, col), value) in output.block.indexed_iter() {
            let t = col as f64 / 32.0;
            let expected = Complex64::from_polar(1.0, -2.0 * PI * 4.0 * t);
            assert!((value - expected).norm() < 1e-9);
        }
        assert!((output.metadata.output_rms.unwrap() - 1.0).abs() < 1e-9);
        assert!((output.metadata.passband_fraction.unwrap() - 3.0 / 32.0).abs() < 1e-12);
        assert!(output.metadata.notes[0].starts_with("boxcar"));

        stage.cleanup();
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn subband_stage_rejects_uninitialized_and_misshaped_blocks() {
        let device = Device::new();
        let mut stage = RangeSubbandStage::new(&device, bandpass(0.0, 8.0));
        let input = StageInput {
            block: Array2::zeros((2, 8)),
            timestamp: None,
        };
        assert!(matches!(
            stage.execute(input.clone()),
            Err(SignalError::UnsetResource(_))
        ));

        stage
            .initialize(&StageConfig {
                rows: 2,
                columns: 16,
            })
            .unwrap();
        assert!(matches!(
            stage.execute(input),
            Err(SignalError::DimensionMismatch { .. })
        ));
    }
}
