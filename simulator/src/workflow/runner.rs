use crate::generator::profile::ChannelPair;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use ndarray::Array2;
use num_complex::Complex64;
use sarfiltcore::device::Device;
use sarfiltcore::filter::Filter;
use sarfiltcore::math::StatsHelper;
use sarfiltcore::prelude::{ProcessingStage, StageInput, StageOutput};
use sarfiltcore::processing::{CommonBandStage, RangeSubbandStage, UpsampleStage};
use sarfiltcore::telemetry::MetricsSnapshot;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub input_rms: f64,
    pub subband_rms: f64,
    pub commonband_rms: f64,
    pub upsampled_rms: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub reference: ChannelSummary,
    pub secondary: ChannelSummary,
    pub range_passband: f64,
    pub azimuth_passband: f64,
    pub zero_overlap_lines: usize,
    pub output_shape: (usize, usize),
    pub notes: Vec<String>,
    pub metrics: MetricsSnapshot,
    #[serde(skip)]
    pub reference_block: Array2<Complex64>,
    #[serde(skip)]
    pub secondary_block: Array2<Complex64>,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    device: Device,
}

fn block_rms(block: &Array2<Complex64>) -> f64 {
    let samples: Vec<Complex64> = block.iter().copied().collect();
    StatsHelper::rms(&samples)
}

fn run_stage<S: ProcessingStage>(
    stage: &mut S,
    name: &str,
    block: Array2<Complex64>,
) -> anyhow::Result<StageOutput> {
    stage
        .execute(StageInput {
            block,
            timestamp: None,
        })
        .with_context(|| format!("executing {} stage", name))
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self::with_device(config, Device::new())
    }

    pub fn with_device(config: WorkflowConfig, device: Device) -> Self {
        Self { config, device }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn execute(&self, channels: &ChannelPair) -> anyhow::Result<WorkflowResult> {
        let stage_config = self.config.to_stage_config();
        let mut notes = Vec::new();

        let mut subband = RangeSubbandStage::new(&self.device, self.config.bandpass.clone());
        subband
            .initialize(&stage_config)
            .context("initializing range sub-band stage")?;
        let ref_subband = run_stage(&mut subband, "range sub-band", channels.reference.clone())?;
        let sec_subband = run_stage(&mut subband, "range sub-band", channels.secondary.clone())?;
        subband.cleanup();
        let range_passband = ref_subband.metadata.passband_fraction.unwrap_or_default();
        notes.extend(ref_subband.metadata.notes.iter().cloned());

        let mut commonband = CommonBandStage::new(
            &self.device,
            Box::new(self.config.reference_doppler.clone()),
            Box::new(self.config.secondary_doppler.clone()),
            self.config.common_band,
        );
        commonband
            .initialize(&stage_config)
            .context("initializing common-band stage")?;
        let ref_common = run_stage(&mut commonband, "common-band", ref_subband.block)?;
        let sec_common = run_stage(&mut commonband, "common-band", sec_subband.block)?;
        commonband.cleanup();
        let azimuth_passband = ref_common.metadata.passband_fraction.unwrap_or_default();
        let zero_overlap_lines = ref_common.metadata.zero_overlap_lines.unwrap_or_default();
        notes.extend(ref_common.metadata.notes.iter().cloned());

        let mut reference = ChannelSummary {
            input_rms: block_rms(&channels.reference),
            subband_rms: ref_subband.metadata.output_rms.unwrap_or_default(),
            commonband_rms: ref_common.metadata.output_rms.unwrap_or_default(),
            upsampled_rms: None,
        };
        let mut secondary = ChannelSummary {
            input_rms: block_rms(&channels.secondary),
            subband_rms: sec_subband.metadata.output_rms.unwrap_or_default(),
            commonband_rms: sec_common.metadata.output_rms.unwrap_or_default(),
            upsampled_rms: None,
        };

        let (reference_block, secondary_block) = if self.config.upsample > 1 {
            let mut upsample = UpsampleStage::new(&self.device, self.config.upsample);
            upsample
                .initialize(&stage_config)
                .context("initializing upsample stage")?;
            let ref_up = run_stage(&mut upsample, "upsample", ref_common.block)?;
            let sec_up = run_stage(&mut upsample, "upsample", sec_common.block)?;
            upsample.cleanup();
            reference.upsampled_rms = ref_up.metadata.output_rms;
            secondary.upsampled_rms = sec_up.metadata.output_rms;
            notes.extend(ref_up.metadata.notes.iter().cloned());
            (ref_up.block, sec_up.block)
        } else {
            (ref_common.block, sec_common.block)
        };

        Ok(WorkflowResult {
            reference,
            secondary,
            range_passband,
            azimuth_passband,
            zero_overlap_lines,
            output_shape: reference_block.dim(),
            notes,
            metrics: self.device.metrics(),
            reference_block,
            secondary_block,
        })
    }

    /// Builds the configured range band-pass kernel and writes it to `path`.
    pub fn dump_filter<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let mut filter = Filter::<f64>::new(&self.device);
        filter
            .construct_range_bandpass(&self.config.bandpass, self.config.rows, self.config.columns)
            .context("building range band-pass for dump")?;
        filter
            .write_filter_to(path.as_ref())
            .with_context(|| format!("writing filter to {}", path.as_ref().display()))?;
        Ok(())
    }
}
