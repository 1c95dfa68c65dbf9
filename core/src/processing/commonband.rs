use crate::device::memory::Device;
use crate::filter::applicator::Filter;
use crate::filter::design::CommonBandParams;
use crate::filter::doppler::DopplerModel;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, SignalError, SignalResult, StageConfig, StageInput, StageMetadata,
    StageOutput,
};
use crate::processing::{block_from_vec, check_block, passband_fraction};
use crate::telemetry::LogManager;
use num_complex::Complex64;

/// Azimuth common-band filtering for one channel of an interferometric pair.
/// Both channels pass through the same kernel, centred between the centroids.
pub struct CommonBandStage {
    filter: Filter<f64>,
    reference: Box<dyn DopplerModel>,
    secondary: Box<dyn DopplerModel>,
    params: CommonBandParams,
    config: Option<StageConfig>,
    zero_lines: usize,
    passband: f64,
    logger: LogManager,
}

impl CommonBandStage {
    pub fn new(
        device: &Device,
        reference: Box<dyn DopplerModel>,
        secondary: Box<dyn DopplerModel>,
        params: CommonBandParams,
    ) -> Self {
        Self {
            filter: Filter::new(device),
            reference,
            secondary,
            params,
            config: None,
            zero_lines: 0,
            passband: 0.0,
            logger: LogManager::new("common-band"),
        }
    }

    pub fn filter(&self) -> &Filter<f64> {
        &self.filter
    }

    /// Columns fully attenuated by the current kernel.
    pub fn zero_lines(&self) -> usize {
        self.zero_lines
    }
}

impl ProcessingStage for CommonBandStage {
    fn initialize(&mut self, config: &StageConfig) -> SignalResult<()> {
        self.zero_lines = self.filter.construct_azimuth_commonband(
            self.reference.as_ref(),
            self.secondary.as_ref(),
            &self.params,
            config.rows,
            config.columns,
        )?;
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
            "common-band RMS {:.4}, {} zero line(s)",
            rms, self.zero_lines
        ));

        let metadata = StageMetadata {
            output_rms: Some(rms),
            passband_fraction: Some(self.passband),
            zero_overlap_lines: Some(self.zero_lines),
            notes: vec![format!("common-band RMS {:.4}", rms)],
        };
        Ok(StageOutput {
            block: block_from_vec(config.rows, config.columns, samples)?,
            metadata,
        })
    }

    fn cleanup(&mut self) {
        self.filter.release();
        self.config = None;
        self.zero_lines = 0;
        self.passband = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::doppler::Lut1d;
    use ndarray::Array2;
    use std::f64::consts::PI;

    fn stage(device: &Device, secondary: Lut1d) -> CommonBandStage {
        CommonBandStage::new(
            device,
            Box::new(Lut1d::constant(0.0)),
            Box::new(secondary),
            CommonBandParams::new(200.0, 1000.0, 0.0),
        )
    }

    #[test]
    fn aligned_centroids_pass_in_band_doppler() {
        let device = Device::new();
        let mut stage = stage(&device, Lut1d::constant(0.0));
        stage.initialize(&StageConfig { rows: 50, columns: 3 }).unwrap();
        assert_eq!(stage.zero_lines(), 0);

        // 20 Hz sits inside the 200 Hz band, 300 Hz outside it.
        let block = Array2::from_shape_fn((50, 3), |(row, _)| {
            let t = row as f64 / 1000.0;
            Complex64::from_polar(1.0, 2.0 * PI * 20.0 * t) + Complex64::from_polar(1.0, 2.0 * PI * 300.0 * t)
        });
        let output = stage
            .execute(StageInput {
                block,
                timestamp: None,
            })
            .unwrap();
        for ((row, _), value) in output.block.indexed_iter() {
            let expected = Complex64::from_polar(1.0, 2.0 * PI * 20.0 * row as f64 / 1000.0);
            assert!((value - expected).norm() < 1e-9);
        }
        assert_eq!(output.metadata.zero_overlap_lines, Some(0));
    }

    #[test]
    fn separated_centroids_blank_their_columns() {
        let device = Device::new();
        let secondary = Lut1d::new(0.0, 1.0, vec![0.0, 50.0, 500.0]).unwrap();
        let mut stage = stage(&device, secondary);
        stage.initialize(&StageConfig { rows: 16, columns: 3 }).unwrap();
        assert_eq!(stage.zero_lines(), 1);

        let block = Array2::from_elem((16, 3), Complex64::new(1.0, 0.0));
        let output = stage
            .execute(StageInput {
                block,
                timestamp: None,
            })
            .unwrap();
        assert!(output.block.column(2).iter().all(|c| c.norm() < 1e-12));
        assert!(output.block.column(0).iter().all(|c| (c.re - 1.0).abs() < 1e-9));
        assert_eq!(output.metadata.zero_overlap_lines, Some(1));
        assert!(output.metadata.to_json().unwrap().contains("\"zero_overlap_lines\":1"));

        stage.cleanup();
        assert_eq!(stage.zero_lines(), 0);
        assert_eq!(device.live_allocations(), 0);
    }
}
