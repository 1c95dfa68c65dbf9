use crate::filter::doppler::DopplerModel;
use crate::math::fft::{fftfreq, signed_bin};
use crate::prelude::{SignalError, SignalResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Roll-off used by the range cosine filter when none is configured.
pub const DEFAULT_COSINE_BETA: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterType {
    Boxcar,
    Cosine,
}

impl FromStr for FilterType {
    type Err = SignalError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim().to_ascii_lowercase().as_str() {
            "boxcar" => Ok(FilterType::Boxcar),
            "cosine" => Ok(FilterType::Cosine),
            _ => Err(SignalError::UnsupportedFilterType(label.to_string())),
        }
    }
}

impl TryFrom<String> for FilterType {
    type Error = SignalError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.parse()
    }
}

impl From<FilterType> for String {
    fn from(filter_type: FilterType) -> Self {
        filter_type.to_string()
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterType::Boxcar => f.write_str("boxcar"),
            FilterType::Cosine => f.write_str("cosine"),
        }
    }
}

/// One pass band: `center ± bandwidth / 2`, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubBand {
    pub center: f64,
    pub bandwidth: f64,
}

impl SubBand {
    pub fn new(center: f64, bandwidth: f64) -> Self {
        Self { center, bandwidth }
    }

    pub fn low(&self) -> f64 {
        self.center - 0.5 * self.bandwidth
    }

    pub fn high(&self) -> f64 {
        self.center + 0.5 * self.bandwidth
    }
}

fn default_beta() -> f64 {
    DEFAULT_COSINE_BETA
}

/// Range band-pass filter description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandpassConfig {
    /// Range sampling frequency in Hz.
    pub sampling_frequency: f64,
    pub sub_bands: Vec<SubBand>,
    pub filter_type: FilterType,
    #[serde(default = "default_beta")]
    pub beta: f64,
}

impl BandpassConfig {
    pub fn from_json(text: &str) -> SignalResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|err| SignalError::InvalidParameter(err.to_string()))?;
        // Surface a bad label as its own error kind rather than a parse error.
        if let Some(label) = value.get("filter_type").and_then(|v| v.as_str()) {
            label.parse::<FilterType>()?;
        }
        let config: BandpassConfig = serde_json::from_value(value)
            .map_err(|err| SignalError::InvalidParameter(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SignalResult<()> {
        if !(self.sampling_frequency.is_finite() && self.sampling_frequency > 0.0) {
            return Err(SignalError::InvalidParameter(format!(
                "sampling frequency {} must be positive",
                self.sampling_frequency
            )));
        }
        validate_bands(&self.sub_bands)?;
        validate_beta(self.beta)
    }
}

/// Azimuth common-band filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommonBandParams {
    /// Requested azimuth bandwidth in Hz.
    pub bandwidth: f64,
    /// Pulse repetition frequency in Hz.
    pub prf: f64,
    /// Raised-cosine roll-off in [0, 1].
    pub beta: f64,
    /// Position of the first column fed to the Doppler models.
    #[serde(default)]
    pub range_start: f64,
    /// Position step between columns.
    #[serde(default = "unit_spacing")]
    pub range_spacing: f64,
}

fn unit_spacing() -> f64 {
    1.0
}

impl CommonBandParams {
    pub fn new(bandwidth: f64, prf: f64, beta: f64) -> Self {
        Self {
            bandwidth,
            prf,
            beta,
            range_start: 0.0,
            range_spacing: 1.0,
        }
    }

    pub fn validate(&self) -> SignalResult<()> {
        if !(self.prf.is_finite() && self.prf > 0.0) {
            return Err(SignalError::InvalidParameter(format!(
                "prf {} must be positive",
                self.prf
            )));
        }
        if !(self.bandwidth.is_finite() && self.bandwidth > 0.0) {
            return Err(SignalError::InvalidParameter(format!(
                "azimuth bandwidth {} must be positive",
                self.bandwidth
            )));
        }
        if !(self.range_start.is_finite() && self.range_spacing.is_finite()) {
            return Err(SignalError::InvalidParameter(format!(
                "range axis start {} / spacing {} must be finite",
                self.range_start, self.range_spacing
            )));
        }
        validate_beta(self.beta)
    }

    pub fn position(&self, column: usize) -> f64 {
        self.range_start + column as f64 * self.range_spacing
    }
}

fn validate_beta(beta: f64) -> SignalResult<()> {
    if !(0.0..=1.0).contains(&beta) {
        return Err(SignalError::InvalidParameter(format!(
            "roll-off {} outside [0, 1]",
            beta
        )));
    }
    Ok(())
}

fn validate_bands(sub_bands: &[SubBand]) -> SignalResult<()> {
    for band in sub_bands {
        if !(band.center.is_finite() && band.bandwidth.is_finite() && band.bandwidth >= 0.0) {
            return Err(SignalError::InvalidParameter(format!(
                "sub-band {:?} is not a valid band",
                band
            )));
        }
    }
    Ok(())
}

/// Raised-cosine response at `offset` Hz from the band centre.
pub fn raised_cosine(offset: f64, bandwidth: f64, beta: f64) -> f64 {
    if bandwidth <= 0.0 {
        return 0.0;
    }
    let half = 0.5 * bandwidth;
    let inner = (1.0 - beta) * half;
    let outer = (1.0 + beta) * half;
    if offset <= inner {
        1.0
    } else if beta > 0.0 && offset <= outer {
        0.5 * (1.0 + (PI / (bandwidth * beta) * (offset - inner)).cos())
    } else {
        0.0
    }
}

/// Box-car filter over an `nfft`-point spectrum sampled every `dt`: 1 for
/// every bin inside any sub-band, 0 elsewhere.
pub fn bandpass_boxcar(sub_bands: &[SubBand], dt: f64, nfft: usize) -> SignalResult<Vec<f64>> {
    if !(dt.is_finite() && dt > 0.0) || nfft == 0 {
        return Err(SignalError::InvalidParameter(format!(
            "box-car needs dt > 0 and nfft > 0 (dt {}, nfft {})",
            dt, nfft
        )));
    }
    validate_bands(sub_bands)?;

    let df = 1.0 / (nfft as f64 * dt);
    let mut filter = vec![0.0; nfft];
    for band in sub_bands {
        let first = (band.low() / df).round() as i64;
        let last = (band.high() / df).round() as i64;
        for (k, coefficient) in filter.iter_mut().enumerate() {
            let bin = signed_bin(k, nfft);
            if (first..=last).contains(&bin) {
                *coefficient = 1.0;
            }
        }
    }
    Ok(filter)
}

/// Cosine-tapered band-pass over the explicit `frequency` axis. Overlapping
/// bands combine by maximum so coefficients stay within [0, 1].
pub fn bandpass_cosine(
    sub_bands: &[SubBand],
    frequency: &[f64],
    beta: f64,
) -> SignalResult<Vec<f64>> {
    validate_bands(sub_bands)?;
    validate_beta(beta)?;
    Ok(frequency
        .iter()
        .map(|&f| {
            sub_bands
                .iter()
                .map(|band| raised_cosine((f - band.center).abs(), band.bandwidth, beta))
                .fold(0.0, f64::max)
        })
        .collect())
}

/// Range band-pass kernel, real valued and ready for
/// [`crate::filter::FilterKernel::upload`]: one filter line of `nfft` bins repeated on every row.
pub fn range_bandpass_kernel(
    config: &BandpassConfig,
    rows: usize,
    nfft: usize,
) -> SignalResult<Array2<f64>> {
    config.validate()?;
    let dt = 1.0 / config.sampling_frequency;
    let line = match config.filter_type {
        FilterType::Boxcar => bandpass_boxcar(&config.sub_bands, dt, nfft)?,
        FilterType::Cosine => bandpass_cosine(&config.sub_bands, &fftfreq(nfft, dt), config.beta)?,
    };
    Ok(Array2::from_shape_fn((rows, nfft), |(_, col)| line[col]))
}

/// Azimuth common-band kernel together with per-column diagnostics.
#[derive(Debug, Clone)]
pub struct CommonBandKernel {
    pub coefficients: Array2<f64>,
    /// Common bandwidth per column; 0 where the two bands do not overlap.
    pub widths: Vec<f64>,
    pub zero_lines: usize,
}

fn wrap_frequency(offset: f64, prf: f64) -> f64 {
    offset - prf * (offset / prf).round()
}

/// Common-band filter for two channels. For column `j` the Doppler models are
/// evaluated at `params.position(j)`; the pass band is centred between the
/// two centroids and is `min(bandwidth, prf) - |f_ref - f_sec|` wide. Columns
/// with no overlap are all zero.
pub fn azimuth_commonband_kernel(
    reference: &dyn DopplerModel,
    secondary: &dyn DopplerModel,
    params: &CommonBandParams,
    rows: usize,
    columns: usize,
) -> SignalResult<CommonBandKernel> {
    params.validate()?;
    let frequency = fftfreq(rows, 1.0 / params.prf);
    let usable = params.bandwidth.min(params.prf);

    let mut coefficients = Array2::<f64>::zeros((rows, columns));
    let mut widths = Vec::with_capacity(columns);
    let mut zero_lines = 0;

    for col in 0..columns {
        let position = params.position(col);
        let f_ref = reference.evaluate(position);
        let f_sec = secondary.evaluate(position);
        let width = usable - (f_ref - f_sec).abs();
        if width <= 0.0 {
            widths.push(0.0);
            zero_lines += 1;
            continue;
        }
        widths.push(width);

        let center = 0.5 * (f_ref + f_sec);
        for (row, &f) in frequency.iter().enumerate() {
            let offset = wrap_frequency(f - center, params.prf).abs();
            coefficients[[row, col]] = raised_cosine(offset, width, params.beta);
        }
    }

    Ok(CommonBandKernel {
        coefficients,
        widths,
        zero_lines,
    })
}
