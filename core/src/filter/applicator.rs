use crate::device::kernels::multiply_elementwise;
use crate::device::memory::{Device, DeviceBuffer};
use crate::filter::design::{
    azimuth_commonband_kernel, range_bandpass_kernel, BandpassConfig, CommonBandParams,
    FilterType, SubBand, DEFAULT_COSINE_BETA,
};
use crate::filter::doppler::DopplerModel;
use crate::math::fft::TransformAxis;
use crate::math::sample::Sample;
use crate::prelude::{check_len, SignalError, SignalResult};
use crate::signal::engine::{ConfiguredSignal, Signal};
use crate::telemetry::LogManager;
use ndarray::Array2;
use num_complex::Complex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Device-resident complex filter coefficients, row-major.
pub struct FilterKernel<T: Sample> {
    rows: usize,
    columns: usize,
    axis: Option<TransformAxis>,
    buffer: DeviceBuffer<Complex<T>>,
}

impl<T: Sample> FilterKernel<T> {
    pub fn upload(device: &Device, coefficients: &Array2<Complex<T>>) -> SignalResult<Self> {
        let (rows, columns) = coefficients.dim();
        if rows == 0 || columns == 0 {
            return Err(SignalError::InvalidParameter(format!(
                "filter kernel {}x{} is empty",
                rows, columns
            )));
        }
        let host: Vec<Complex<T>> = coefficients.iter().copied().collect();
        let mut buffer = device.allocate::<Complex<T>>(host.len())?;
        buffer.copy_from_host(&host)?;
        Ok(Self {
            rows,
            columns,
            axis: None,
            buffer,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn num_elements(&self) -> usize {
        self.rows * self.columns
    }

    /// Transform axis the kernel was synthesised for, if known.
    pub fn axis(&self) -> Option<TransformAxis> {
        self.axis
    }

    pub fn buffer(&self) -> &DeviceBuffer<Complex<T>> {
        &self.buffer
    }

    pub fn to_host(&self) -> SignalResult<Array2<Complex<T>>> {
        Array2::from_shape_vec((self.rows, self.columns), self.buffer.to_host_vec())
            .map_err(|err| SignalError::Internal(err.to_string()))
    }

    /// Multiplies a device-resident spectrum by the kernel, in place.
    pub fn apply(&self, spectrum: &mut [Complex<T>]) -> SignalResult<()> {
        multiply_elementwise(self.buffer.device(), spectrum, self.buffer.as_slice())
    }

    fn check_shape(&self, rows: usize, columns: usize) -> SignalResult<()> {
        check_len("filter kernel rows", self.rows, rows)?;
        check_len("filter kernel columns", self.columns, columns)
    }

    /// Shape and, when known, transform axis must both match the engine.
    fn check_engine(&self, engine: &ConfiguredSignal<T>) -> SignalResult<()> {
        self.check_shape(engine.rows(), engine.columns())?;
        match self.axis {
            Some(axis) if axis != engine.axis() => Err(SignalError::InvalidParameter(format!(
                "kernel built for {:?} transforms, signal configured for {:?}",
                axis,
                engine.axis()
            ))),
            _ => Ok(()),
        }
    }
}

fn complex_coefficients<T: Sample>(real: &Array2<f64>) -> Array2<Complex<T>> {
    real.mapv(|c| Complex::new(T::cast(c), T::zero()))
}

/// Frequency-domain filter: owns its own transform engine and, once built or
/// loaded, one device-resident [`FilterKernel`]. Filtering is forward
/// transform, complex multiply by the kernel, normalized inverse transform.
pub struct Filter<T: Sample> {
    device: Device,
    signal: Signal<T>,
    kernel: Option<FilterKernel<T>>,
    logger: LogManager,
}

impl<T: Sample> Filter<T> {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
            signal: Signal::new(device),
            kernel: None,
            logger: LogManager::new("filter"),
        }
    }

    /// Configures the owned engine for range filtering of `rows x columns` blocks.
    pub fn initiate_range_filter(&mut self, rows: usize, columns: usize) -> SignalResult<()> {
        self.signal.configure_range(rows, columns)
    }

    /// Configures the owned engine for azimuth filtering of `rows x columns` blocks.
    pub fn initiate_azimuth_filter(&mut self, rows: usize, columns: usize) -> SignalResult<()> {
        self.signal.configure_azimuth(rows, columns)
    }

    pub fn signal(&self) -> &Signal<T> {
        &self.signal
    }

    pub fn is_set(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn kernel(&self) -> SignalResult<&FilterKernel<T>> {
        self.kernel
            .as_ref()
            .ok_or(SignalError::UnsetResource("filter kernel"))
    }

    /// Builds and uploads a range band-pass kernel. The engine is configured
    /// for range transforms of this block if it is not already; `nfft` is its
    /// column count.
    pub fn construct_range_bandpass(
        &mut self,
        config: &BandpassConfig,
        rows: usize,
        columns: usize,
    ) -> SignalResult<()> {
        config.validate()?;
        if !self.signal.matches(TransformAxis::Range, rows, columns) {
            self.initiate_range_filter(rows, columns)?;
        }
        let nfft = self.signal.columns();
        let coefficients = range_bandpass_kernel(config, rows, nfft)?;
        self.install(complex_coefficients(&coefficients), Some(TransformAxis::Range))?;
        self.logger.record(&format!(
            "{} range band-pass with {} sub-band(s) over {} bins",
            config.filter_type,
            config.sub_bands.len(),
            nfft
        ));
        Ok(())
    }

    /// Same as [`Self::construct_range_bandpass`] with the filter type given
    /// by its label ("boxcar" or "cosine").
    pub fn construct_range_bandpass_by_name(
        &mut self,
        sampling_frequency: f64,
        sub_bands: &[SubBand],
        filter_type: &str,
        rows: usize,
        columns: usize,
    ) -> SignalResult<()> {
        let config = BandpassConfig {
            sampling_frequency,
            sub_bands: sub_bands.to_vec(),
            filter_type: filter_type.parse::<FilterType>()?,
            beta: DEFAULT_COSINE_BETA,
        };
        self.construct_range_bandpass(&config, rows, columns)
    }

    pub fn construct_range_bandpass_boxcar(
        &mut self,
        sampling_frequency: f64,
        sub_bands: &[SubBand],
        rows: usize,
        columns: usize,
    ) -> SignalResult<()> {
        let config = BandpassConfig {
            sampling_frequency,
            sub_bands: sub_bands.to_vec(),
            filter_type: FilterType::Boxcar,
            beta: DEFAULT_COSINE_BETA,
        };
        self.construct_range_bandpass(&config, rows, columns)
    }

    pub fn construct_range_bandpass_cosine(
        &mut self,
        sampling_frequency: f64,
        sub_bands: &[SubBand],
        beta: f64,
        rows: usize,
        columns: usize,
    ) -> SignalResult<()> {
        let config = BandpassConfig {
            sampling_frequency,
            sub_bands: sub_bands.to_vec(),
            filter_type: FilterType::Cosine,
            beta,
        };
        self.construct_range_bandpass(&config, rows, columns)
    }

    /// Builds and uploads the azimuth common-band kernel, configuring the
    /// engine for azimuth transforms if needed. Returns the number of columns
    /// whose bands do not overlap (fully attenuated).
    pub fn construct_azimuth_commonband(
        &mut self,
        reference: &dyn DopplerModel,
        secondary: &dyn DopplerModel,
        params: &CommonBandParams,
        rows: usize,
        columns: usize,
    ) -> SignalResult<usize> {
        params.validate()?;
        if !self.signal.matches(TransformAxis::Azimuth, rows, columns) {
            self.initiate_azimuth_filter(rows, columns)?;
        }
        let kernel = azimuth_commonband_kernel(reference, secondary, params, rows, columns)?;
        if kernel.zero_lines > 0 {
            self.logger.caution(&format!(
                "{} of {} columns have no common Doppler band",
                kernel.zero_lines, columns
            ));
        }
        self.install(
            complex_coefficients(&kernel.coefficients),
            Some(TransformAxis::Azimuth),
        )?;
        self.logger.record(&format!(
            "azimuth common-band filter over {}x{} block",
            rows, columns
        ));
        Ok(kernel.zero_lines)
    }

    /// Installs externally computed coefficients. When the engine is
    /// configured the shape must match its block.
    pub fn set_kernel(&mut self, coefficients: Array2<Complex<T>>) -> SignalResult<()> {
        let axis = self.signal.axis();
        self.install(coefficients, axis)
    }

    fn install(
        &mut self,
        coefficients: Array2<Complex<T>>,
        axis: Option<TransformAxis>,
    ) -> SignalResult<()> {
        let (rows, columns) = coefficients.dim();
        if self.signal.is_configured() {
            check_len("filter kernel rows", self.signal.rows(), rows)?;
            check_len("filter kernel columns", self.signal.columns(), columns)?;
        }
        // Release the previous kernel before allocating its replacement.
        self.kernel = None;
        let mut kernel = FilterKernel::upload(&self.device, &coefficients)?;
        kernel.axis = axis;
        self.kernel = Some(kernel);
        Ok(())
    }

    /// Drops the kernel and returns the engine to its unconfigured state.
    pub fn release(&mut self) {
        self.kernel = None;
        self.signal.reset();
    }

    pub fn kernel_to_host(&self) -> SignalResult<Array2<Complex<T>>> {
        self.kernel()?.to_host()
    }

    /// Filters host data with the owned engine. On return `spectrum` holds the
    /// filtered spectrum and `signal` the filtered time-domain block.
    pub fn filter_host(
        &mut self,
        signal: &mut [Complex<T>],
        spectrum: &mut [Complex<T>],
    ) -> SignalResult<()> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or(SignalError::UnsetResource("filter kernel"))?;
        kernel.check_engine(self.signal.configured()?)?;
        check_len("signal", kernel.num_elements(), signal.len())?;
        check_len("spectrum", kernel.num_elements(), spectrum.len())?;

        self.signal.upload(signal)?;
        self.signal.forward()?;
        kernel.apply(self.signal.device_buffer_mut()?.as_mut_slice())?;
        self.signal.download(spectrum)?;
        self.signal.inverse()?;
        self.signal.download(signal)
    }

    /// Filters a block already resident in another engine, using that
    /// engine's plans; no host transfers take place.
    pub fn filter_signal(&self, signal: &mut Signal<T>) -> SignalResult<()> {
        let kernel = self.kernel()?;
        kernel.check_engine(signal.configured()?)?;

        signal.forward()?;
        kernel.apply(signal.device_buffer_mut()?.as_mut_slice())?;
        signal.inverse()
    }

    /// Multiplies a device spectrum by the kernel; the caller owns the
    /// transform state of `data`.
    pub fn filter_device(&self, data: &mut DeviceBuffer<Complex<T>>) -> SignalResult<()> {
        let kernel = self.kernel()?;
        check_len("device spectrum", kernel.num_elements(), data.len())?;
        kernel.apply(data.as_mut_slice())
    }

    /// Diagnostic dump: rows and columns as little-endian `u64`, then every
    /// coefficient in row-major order as little-endian `f64` (re, im).
    pub fn write_filter<W: Write>(&self, mut writer: W) -> SignalResult<()> {
        let kernel = self.kernel()?;
        writer.write_all(&(kernel.rows() as u64).to_le_bytes())?;
        writer.write_all(&(kernel.columns() as u64).to_le_bytes())?;
        for value in kernel.buffer().to_host_vec() {
            writer.write_all(&value.re.widen().to_le_bytes())?;
            writer.write_all(&value.im.widen().to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_filter_to<P: AsRef<Path>>(&self, path: P) -> SignalResult<()> {
        let file = File::create(path.as_ref())?;
        self.write_filter(BufWriter::new(file))?;
        self.logger
            .record(&format!("filter written to {}", path.as_ref().display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::doppler::Lut1d;
    use crate::math::stats::StatsHelper;
    use num_complex::{Complex32, Complex64};
    use std::f64::consts::PI;

    fn tones(rows: usize, columns: usize, bins: &[usize]) -> Vec<Complex64> {
        let mut block = vec![Complex64::new(0.0, 0.0); rows * columns];
        for (i, value) in block.iter_mut().enumerate() {
            let col = (i % columns) as f64;
            for &bin in bins {
                *value += Complex64::from_polar(1.0, 2.0 * PI * bin as f64 * col / columns as f64);
            }
        }
        block
    }

    fn full_band() -> BandpassConfig {
        BandpassConfig {
            sampling_frequency: 64.0,
            sub_bands: vec![SubBand::new(0.0, 64.0)],
            filter_type: FilterType::Boxcar,
            beta: DEFAULT_COSINE_BETA,
        }
    }

    #[test]
    fn full_band_boxcar_reproduces_signal() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter.construct_range_bandpass(&full_band(), 8, 64).unwrap();

        let input = tones(8, 64, &[3, 17, 40]);
        let mut signal = input.clone();
        let mut spectrum = vec![Complex64::new(0.0, 0.0); input.len()];
        filter.filter_host(&mut signal, &mut spectrum).unwrap();
        assert!(StatsHelper::max_abs_diff(&input, &signal) < 1e-9);
    }

    #[test]
    fn empty_band_list_zeroes_everything() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter
            .construct_range_bandpass_boxcar(64.0, &[], 4, 64)
            .unwrap();

        let mut signal = tones(4, 64, &[1, 5]);
        let mut spectrum = vec![Complex64::new(0.0, 0.0); signal.len()];
        filter.filter_host(&mut signal, &mut spectrum).unwrap();
        assert!(signal.iter().all(|c| c.norm() == 0.0));
        assert!(spectrum.iter().all(|c| c.norm() == 0.0));
    }

    #[test]
    fn sub_band_isolates_in_band_tone() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter
            .construct_range_bandpass_by_name(64.0, &[SubBand::new(4.0, 6.0)], "boxcar", 2, 64)
            .unwrap();

        let mut signal = tones(2, 64, &[3, 20]);
        let mut spectrum = vec![Complex64::new(0.0, 0.0); signal.len()];
        filter.filter_host(&mut signal, &mut spectrum).unwrap();
        let expected = tones(2, 64, &[3]);
        assert!(StatsHelper::max_abs_diff(&expected, &signal) < 1e-9);
    }

    #[test]
    fn device_resident_filtering_matches_host_filtering() {
        let device = Device::new();
        let mut filter = Filter::<f32>::new(&device);
        let config = BandpassConfig {
            filter_type: FilterType::Cosine,
            sub_bands: vec![SubBand::new(-8.0, 20.0)],
            ..full_band()
        };
        filter.construct_range_bandpass(&config, 4, 64).unwrap();

        let input: Vec<Complex32> = tones(4, 64, &[2, 9, 30, 56])
            .iter()
            .map(|c| Complex32::new(c.re as f32, c.im as f32))
            .collect();
        let mut host_signal = input.clone();
        let mut spectrum = vec![Complex32::new(0.0, 0.0); input.len()];
        filter.filter_host(&mut host_signal, &mut spectrum).unwrap();

        let mut resident = Signal::<f32>::new(&device);
        resident.configure_range(4, 64).unwrap();
        resident.upload(&input).unwrap();
        filter.filter_signal(&mut resident).unwrap();
        let mut device_signal = vec![Complex32::new(0.0, 0.0); input.len()];
        resident.download(&mut device_signal).unwrap();

        for (a, b) in host_signal.iter().zip(&device_signal) {
            assert!((a - b).norm() < 1e-4);
        }
    }

    #[test]
    fn raw_device_filtering_multiplies_only() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter.initiate_range_filter(1, 4).unwrap();
        let coefficients = Array2::from_shape_vec(
            (1, 4),
            vec![
                Complex64::new(1.0, 0.0),
                Complex64::new(0.0, 1.0),
                Complex64::new(2.0, 0.0),
                Complex64::new(0.0, 0.0),
            ],
        )
        .unwrap();
        filter.set_kernel(coefficients.clone()).unwrap();
        assert_eq!(filter.kernel_to_host().unwrap(), coefficients);

        let mut data = device.allocate::<Complex64>(4).unwrap();
        data.copy_from_host(&[Complex64::new(1.0, 1.0); 4]).unwrap();
        filter.filter_device(&mut data).unwrap();
        assert_eq!(
            data.as_slice(),
            &[
                Complex64::new(1.0, 1.0),
                Complex64::new(-1.0, 1.0),
                Complex64::new(2.0, 2.0),
                Complex64::new(0.0, 0.0),
            ]
        );
    }

    #[test]
    fn common_band_filter_blanks_non_overlapping_columns() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        let reference = Lut1d::constant(0.0);
        let secondary = Lut1d::new(0.0, 1.0, vec![0.0, 600.0]).unwrap();
        let params = CommonBandParams::new(400.0, 1000.0, 0.2);
        let zero_lines = filter
            .construct_azimuth_commonband(&reference, &secondary, &params, 32, 2)
            .unwrap();
        assert_eq!(zero_lines, 1);
        assert_eq!(filter.signal().axis(), Some(TransformAxis::Azimuth));

        let mut signal: Vec<Complex64> = (0..64)
            .map(|i| Complex64::new(1.0 + (i as f64 * 0.7).sin(), 0.5))
            .collect();
        let mut spectrum = vec![Complex64::new(0.0, 0.0); 64];
        filter.filter_host(&mut signal, &mut spectrum).unwrap();
        for row in 0..32 {
            assert!(signal[row * 2 + 1].norm() < 1e-12);
        }
        assert!(signal.iter().step_by(2).any(|c| c.norm() > 0.1));
    }

    #[test]
    fn unset_kernel_is_reported() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter.initiate_range_filter(2, 2).unwrap();
        let mut signal = vec![Complex64::new(0.0, 0.0); 4];
        let mut spectrum = signal.clone();
        assert!(matches!(
            filter.filter_host(&mut signal, &mut spectrum),
            Err(SignalError::UnsetResource("filter kernel"))
        ));
        assert!(!filter.is_set());
        assert!(filter.write_filter(Vec::new()).is_err());
    }

    #[test]
    fn shape_mismatch_leaves_no_allocation_behind() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter.construct_range_bandpass(&full_band(), 4, 64).unwrap();
        assert_eq!(device.live_allocations(), 2);

        let wrong = Array2::from_elem((4, 32), Complex64::new(1.0, 0.0));
        assert!(matches!(
            filter.set_kernel(wrong),
            Err(SignalError::DimensionMismatch { .. })
        ));
        assert_eq!(device.live_allocations(), 2);

        let mut other = Signal::<f64>::new(&device);
        other.configure_range(4, 32).unwrap();
        let before = device.live_allocations();
        assert!(matches!(
            filter.filter_signal(&mut other),
            Err(SignalError::DimensionMismatch { .. })
        ));
        assert_eq!(device.live_allocations(), before);
    }

    #[test]
    fn kernel_axis_must_match_engine_axis() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        let reference = Lut1d::constant(0.0);
        let params = CommonBandParams::new(400.0, 1000.0, 0.2);
        filter
            .construct_azimuth_commonband(&reference, &reference, &params, 32, 2)
            .unwrap();
        filter.initiate_range_filter(32, 2).unwrap();

        let input = vec![Complex64::new(1.0, -0.5); 64];
        let mut signal = input.clone();
        let mut spectrum = vec![Complex64::new(0.0, 0.0); 64];
        assert!(matches!(
            filter.filter_host(&mut signal, &mut spectrum),
            Err(SignalError::InvalidParameter(_))
        ));
        assert_eq!(signal, input);

        let mut other = Signal::<f64>::new(&device);
        other.configure_range(32, 2).unwrap();
        assert!(matches!(
            filter.filter_signal(&mut other),
            Err(SignalError::InvalidParameter(_))
        ));
    }

    #[test]
    fn rebuilding_releases_previous_kernel() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter.construct_range_bandpass(&full_band(), 4, 16).unwrap();
        let bytes = device.live_bytes();
        filter
            .construct_range_bandpass_cosine(16.0, &[SubBand::new(2.0, 4.0)], 0.5, 4, 16)
            .unwrap();
        assert_eq!(device.live_allocations(), 2);
        assert_eq!(device.live_bytes(), bytes);
    }

    #[test]
    fn unknown_label_is_rejected_before_allocating() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        let err = filter
            .construct_range_bandpass_by_name(64.0, &[SubBand::new(0.0, 8.0)], "gaussian", 2, 8)
            .unwrap_err();
        assert!(matches!(err, SignalError::UnsupportedFilterType(_)));
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn filter_dump_is_row_major_little_endian() {
        let device = Device::new();
        let mut filter = Filter::<f64>::new(&device);
        filter.initiate_range_filter(2, 3).unwrap();
        let coefficients =
            Array2::from_shape_fn((2, 3), |(r, c)| Complex64::new((r * 3 + c) as f64, -1.0));
        filter.set_kernel(coefficients).unwrap();

        let mut bytes = Vec::new();
        filter.write_filter(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 16 + 6 * 16);
        let word = |i: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            raw
        };
        assert_eq!(u64::from_le_bytes(word(0)), 2);
        assert_eq!(u64::from_le_bytes(word(1)), 3);
        assert_eq!(f64::from_le_bytes(word(2 + 2 * 4)), 4.0);
        assert_eq!(f64::from_le_bytes(word(2 + 2 * 4 + 1)), -1.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.bin");
        filter.write_filter_to(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }
}
