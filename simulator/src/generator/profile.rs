use anyhow::Context;
use ndarray::Array2;
use num_complex::Complex64;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sarfiltcore::filter::{CommonBandParams, DopplerModel};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Configuration for synthesising a two-channel block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Range tones in Hz, shared by both channels.
    pub range_tones: Vec<f64>,
    pub noise: f64,
    pub seed: u64,
    /// Interferometric phase of the secondary channel, radians.
    pub secondary_phase: f64,
    pub description: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            range_tones: vec![5.0e6, 38.0e6],
            noise: 0.05,
            seed: 0,
            secondary_phase: 0.6,
            description: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            anyhow::bail!("noise level {} must be finite and non-negative", self.noise);
        }
        if !self.secondary_phase.is_finite() {
            anyhow::bail!("secondary phase {} must be finite", self.secondary_phase);
        }
        if let Some(tone) = self.range_tones.iter().find(|tone| !tone.is_finite()) {
            anyhow::bail!("range tone {} must be finite", tone);
        }
        Ok(())
    }
}

/// Reference and secondary blocks, `rows` azimuth lines of `columns` samples.
#[derive(Debug, Clone)]
pub struct ChannelPair {
    pub reference: Array2<Complex64>,
    pub secondary: Array2<Complex64>,
}

impl ChannelPair {
    pub fn dim(&self) -> (usize, usize) {
        self.reference.dim()
    }
}

fn noise_sample(rng: &mut StdRng, level: f64) -> Complex64 {
    if level <= 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    Complex64::new(rng.gen_range(-level..level), rng.gen_range(-level..level))
}

fn build_channel(
    range_line: &[Complex64],
    rows: usize,
    common_band: &CommonBandParams,
    doppler: &dyn DopplerModel,
    phase: f64,
    noise: f64,
    rng: &mut StdRng,
) -> Array2<Complex64> {
    let columns = range_line.len();
    let centroids: Vec<f64> = (0..columns)
        .map(|col| doppler.evaluate(common_band.position(col)))
        .collect();

    Array2::from_shape_fn((rows, columns), |(row, col)| {
        let slow_time = row as f64 / common_band.prf;
        let azimuth = Complex64::from_polar(1.0, 2.0 * PI * centroids[col] * slow_time + phase);
        range_line[col] * azimuth + noise_sample(rng, noise)
    })
}

/// Builds both channels: the same range content, each modulated along
/// azimuth by its own Doppler centroid history.
pub fn build_channel_pair(
    config: &GeneratorConfig,
    rows: usize,
    columns: usize,
    sampling_frequency: f64,
    common_band: &CommonBandParams,
    reference: &dyn DopplerModel,
    secondary: &dyn DopplerModel,
) -> anyhow::Result<ChannelPair> {
    if rows == 0 || columns == 0 {
        anyhow::bail!("cannot synthesise an empty {}x{} block", rows, columns);
    }
    config.validate().context("generator settings")?;
    let samples = rows
        .checked_mul(columns)
        .context("overflow computing sample count for generator")?;
    log::debug!("synthesising {} samples per channel", samples);

    let range_line: Vec<Complex64> = (0..columns)
        .map(|col| {
            let t = col as f64 / sampling_frequency;
            config
                .range_tones
                .iter()
                .map(|&f| Complex64::from_polar(1.0, 2.0 * PI * f * t))
                .sum()
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let reference = build_channel(
        &range_line,
        rows,
        common_band,
        reference,
        0.0,
        config.noise,
        &mut rng,
    );
    let secondary = build_channel(
        &range_line,
        rows,
        common_band,
        secondary,
        config.secondary_phase,
        config.noise,
        &mut rng,
    );
    Ok(ChannelPair {
        reference,
        secondary,
    })
}
