use crate::generator::profile::GeneratorConfig;
use anyhow::Context;
use sarfiltcore::filter::{BandpassConfig, CommonBandParams, FilterType, Lut1d, SubBand};
use sarfiltcore::prelude::StageConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_upsample() -> usize {
    1
}

fn zero_doppler() -> Lut1d {
    Lut1d::constant(0.0)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub rows: usize,
    pub columns: usize,
    /// Range upsampling factor; 1 skips the stage.
    #[serde(default = "default_upsample")]
    pub upsample: usize,
    pub bandpass: BandpassConfig,
    pub common_band: CommonBandParams,
    #[serde(default = "zero_doppler")]
    pub reference_doppler: Lut1d,
    #[serde(default = "zero_doppler")]
    pub secondary_doppler: Lut1d,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Default scene: 100 MHz range sampling with a 20 MHz sub-band, 1 kHz PRF
    /// and a secondary Doppler centroid drifting 200 Hz across the swath.
    pub fn from_args(rows: usize, columns: usize, upsample: usize, filter_type: FilterType) -> Self {
        Self {
            rows,
            columns,
            upsample,
            bandpass: BandpassConfig {
                sampling_frequency: 100.0e6,
                sub_bands: vec![SubBand::new(5.0e6, 20.0e6)],
                filter_type,
                beta: 0.25,
            },
            common_band: CommonBandParams::new(800.0, 1000.0, 0.1),
            reference_doppler: Lut1d::constant(40.0),
            secondary_doppler: Lut1d {
                start: 0.0,
                spacing: columns.saturating_sub(1).max(1) as f64,
                values: vec![40.0, 240.0],
            },
            generator: GeneratorConfig::default(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rows == 0 || self.columns == 0 {
            anyhow::bail!("block must be non-empty, got {}x{}", self.rows, self.columns);
        }
        if self.upsample == 0 {
            anyhow::bail!("upsample factor must be at least 1");
        }
        self.bandpass.validate().context("range band-pass")?;
        self.common_band.validate().context("common-band parameters")?;
        self.reference_doppler
            .validate()
            .context("reference Doppler table")?;
        self.secondary_doppler
            .validate()
            .context("secondary Doppler table")?;
        self.generator.validate().context("generator settings")?;
        Ok(())
    }

    pub fn to_stage_config(&self) -> StageConfig {
        StageConfig {
            rows: self.rows,
            columns: self.columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_produces_stage_config() {
        let cfg = WorkflowConfig::from_args(64, 1024, 2, FilterType::Boxcar);
        assert_eq!(cfg.to_stage_config().columns, 1024);
        assert_eq!(cfg.bandpass.filter_type, FilterType::Boxcar);
        cfg.validate().unwrap();
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"rows: 32\n\
              columns: 128\n\
              bandpass:\n  sampling_frequency: 50000000.0\n  filter_type: Cosine\n  \
              sub_bands:\n    - center: 0.0\n      bandwidth: 10000000.0\n\
              common_band:\n  bandwidth: 600.0\n  prf: 1200.0\n  beta: 0.2\n\
              secondary_doppler:\n  start: 0.0\n  spacing: 127.0\n  values: [0.0, 90.0]\n\
              generator:\n  seed: 7\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.rows, 32);
        assert_eq!(cfg.upsample, 1);
        assert_eq!(cfg.bandpass.filter_type, FilterType::Cosine);
        assert_eq!(cfg.bandpass.beta, 0.25);
        assert_eq!(cfg.common_band.range_spacing, 1.0);
        assert_eq!(cfg.reference_doppler, Lut1d::constant(0.0));
        assert_eq!(cfg.generator.seed, 7);
        assert_eq!(cfg.generator.noise, GeneratorConfig::default().noise);
    }

    #[test]
    fn config_load_rejects_non_finite_noise() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"rows: 4\ncolumns: 4\n\
              bandpass:\n  sampling_frequency: 1.0\n  filter_type: boxcar\n  sub_bands: []\n\
              common_band:\n  bandwidth: 1.0\n  prf: 1.0\n  beta: 0.0\n\
              generator:\n  noise: .nan\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("noise level"));

        let mut cfg = WorkflowConfig::from_args(4, 4, 1, FilterType::Boxcar);
        cfg.generator.noise = f64::INFINITY;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_load_rejects_unknown_filter_type() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"rows: 4\ncolumns: 4\n\
              bandpass:\n  sampling_frequency: 1.0\n  filter_type: hamming\n  sub_bands: []\n\
              common_band:\n  bandwidth: 1.0\n  prf: 1.0\n  beta: 0.0\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let err = WorkflowConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported filter type: hamming"));
    }
}
