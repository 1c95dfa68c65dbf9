use crate::device::kernels::scale_elements;
use crate::device::memory::{Device, DeviceBuffer};
use crate::math::fft::{Direction, PlanLayout, RealTransformPlan, TransformAxis, TransformPlan};
use crate::math::sample::{Precision, Sample};
use crate::prelude::{check_len, SignalError, SignalResult};
use crate::telemetry::LogManager;
use num_complex::Complex;

/// Plans plus the device buffer they were built for.
pub struct ConfiguredSignal<T: Sample> {
    plan: TransformPlan<T>,
    real_plan: RealTransformPlan<T>,
    buffer: DeviceBuffer<Complex<T>>,
}

impl<T: Sample> ConfiguredSignal<T> {
    fn build(device: &Device, axis: TransformAxis, rows: usize, columns: usize) -> SignalResult<Self> {
        let layout = PlanLayout::new(axis, rows, columns)?;
        let buffer = device.allocate::<Complex<T>>(layout.element_count())?;
        Ok(Self {
            plan: TransformPlan::new(layout.clone()),
            real_plan: RealTransformPlan::new(layout),
            buffer,
        })
    }

    pub fn layout(&self) -> &PlanLayout {
        self.plan.layout()
    }

    pub fn rows(&self) -> usize {
        self.layout().rows
    }

    pub fn columns(&self) -> usize {
        self.layout().columns
    }

    pub fn num_elements(&self) -> usize {
        self.layout().element_count()
    }

    pub fn axis(&self) -> TransformAxis {
        self.layout().axis
    }

    pub fn buffer(&self) -> &DeviceBuffer<Complex<T>> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut DeviceBuffer<Complex<T>> {
        &mut self.buffer
    }

    /// Transform over a device-resident range of exactly `num_elements()` values.
    pub fn transform(
        &self,
        device: &Device,
        direction: Direction,
        data: &mut [Complex<T>],
    ) -> SignalResult<()> {
        execute_plan(&self.plan, device, direction, data)
    }

    fn transform_resident(&mut self, direction: Direction) -> SignalResult<()> {
        let Self { plan, buffer, .. } = self;
        let device = buffer.device().clone();
        execute_plan(plan, &device, direction, buffer.as_mut_slice())
    }
}

/// Forward transforms are unscaled; every inverse scales by
/// `1 / product(transformed lengths)` exactly once.
fn execute_plan<T: Sample>(
    plan: &TransformPlan<T>,
    device: &Device,
    direction: Direction,
    data: &mut [Complex<T>],
) -> SignalResult<()> {
    plan.execute(direction, data)?;
    device.recorder().record_transform();
    if direction == Direction::Inverse {
        let scale = 1.0 / plan.layout().normalization_length() as f64;
        scale_elements(device, data, T::cast(scale));
    }
    Ok(())
}

enum EngineState<T: Sample> {
    Unconfigured,
    Configured(ConfiguredSignal<T>),
}

/// Transform engine bound to one device. Either unconfigured or holding a
/// [`ConfiguredSignal`] built for one exact `(rows, columns, axis)`;
/// reconfiguring drops the old plans and buffer before building new ones.
pub struct Signal<T: Sample> {
    device: Device,
    state: EngineState<T>,
    logger: LogManager,
}

/// Complex single-precision engine.
pub type SignalC2C = Signal<f32>;
/// Complex double-precision engine.
pub type SignalZ2Z = Signal<f64>;

impl<T: Sample> Signal<T> {
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.clone(),
            state: EngineState::Unconfigured,
            logger: LogManager::new("signal"),
        }
    }

    /// Batched 1-D transforms along each row (range), one per azimuth line.
    pub fn configure_range(&mut self, rows: usize, columns: usize) -> SignalResult<()> {
        self.configure(TransformAxis::Range, rows, columns)
    }

    /// Batched 1-D transforms down each column (azimuth), one per range bin.
    pub fn configure_azimuth(&mut self, rows: usize, columns: usize) -> SignalResult<()> {
        self.configure(TransformAxis::Azimuth, rows, columns)
    }

    /// A single 2-D transform over the whole block.
    pub fn configure_2d(&mut self, rows: usize, columns: usize) -> SignalResult<()> {
        self.configure(TransformAxis::Both, rows, columns)
    }

    pub fn configure(
        &mut self,
        axis: TransformAxis,
        rows: usize,
        columns: usize,
    ) -> SignalResult<()> {
        // Release the previous plan and buffer before acquiring new ones.
        self.state = EngineState::Unconfigured;
        let configured = ConfiguredSignal::build(&self.device, axis, rows, columns)?;
        self.logger.record(&format!(
            "configured {:?} {:?} transform for {}x{} block",
            T::PRECISION,
            axis,
            rows,
            columns
        ));
        self.state = EngineState::Configured(configured);
        Ok(())
    }

    /// Back to unconfigured; plans and device buffer are released.
    pub fn reset(&mut self) {
        self.state = EngineState::Unconfigured;
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, EngineState::Configured(_))
    }

    /// Whether the engine is configured for exactly this geometry.
    pub fn matches(&self, axis: TransformAxis, rows: usize, columns: usize) -> bool {
        match &self.state {
            EngineState::Configured(cfg) => {
                cfg.axis() == axis && cfg.rows() == rows && cfg.columns() == columns
            }
            EngineState::Unconfigured => false,
        }
    }

    pub fn configured(&self) -> SignalResult<&ConfiguredSignal<T>> {
        match &self.state {
            EngineState::Configured(cfg) => Ok(cfg),
            EngineState::Unconfigured => Err(SignalError::UnsetResource("transform plan")),
        }
    }

    pub fn configured_mut(&mut self) -> SignalResult<&mut ConfiguredSignal<T>> {
        match &mut self.state {
            EngineState::Configured(cfg) => Ok(cfg),
            EngineState::Unconfigured => Err(SignalError::UnsetResource("transform plan")),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn precision(&self) -> Precision {
        T::PRECISION
    }

    /// Row count, 0 while unconfigured.
    pub fn rows(&self) -> usize {
        self.configured().map_or(0, |cfg| cfg.rows())
    }

    /// Column count, 0 while unconfigured.
    pub fn columns(&self) -> usize {
        self.configured().map_or(0, |cfg| cfg.columns())
    }

    /// Element count, 0 while unconfigured.
    pub fn num_elements(&self) -> usize {
        self.configured().map_or(0, |cfg| cfg.num_elements())
    }

    pub fn axis(&self) -> Option<TransformAxis> {
        self.configured().ok().map(|cfg| cfg.axis())
    }

    pub fn device_buffer(&self) -> SignalResult<&DeviceBuffer<Complex<T>>> {
        self.configured().map(|cfg| cfg.buffer())
    }

    pub fn device_buffer_mut(&mut self) -> SignalResult<&mut DeviceBuffer<Complex<T>>> {
        self.configured_mut().map(|cfg| cfg.buffer_mut())
    }

    pub fn upload(&mut self, host: &[Complex<T>]) -> SignalResult<()> {
        let buffer = self.configured_mut()?.buffer_mut();
        buffer.copy_from_host(host)?;
        self.logger
            .trace(&format!("uploaded {} elements", host.len()));
        Ok(())
    }

    pub fn download(&self, host: &mut [Complex<T>]) -> SignalResult<()> {
        let cfg = self.configured()?;
        self.device.synchronize();
        cfg.buffer().copy_to_host(host)?;
        self.logger
            .trace(&format!("downloaded {} elements", host.len()));
        Ok(())
    }

    pub fn zero_device_data(&mut self) -> SignalResult<()> {
        self.configured_mut()?.buffer_mut().fill_zero();
        Ok(())
    }

    /// Forward transform of the resident buffer, in place.
    pub fn forward(&mut self) -> SignalResult<()> {
        self.configured_mut()?.transform_resident(Direction::Forward)
    }

    /// Normalized inverse transform of the resident buffer, in place.
    pub fn inverse(&mut self) -> SignalResult<()> {
        self.configured_mut()?.transform_resident(Direction::Inverse)
    }

    /// Upload, forward transform, download.
    pub fn forward_host(
        &mut self,
        input: &[Complex<T>],
        output: &mut [Complex<T>],
    ) -> SignalResult<()> {
        self.check_host_pair(input.len(), output.len())?;
        self.upload(input)?;
        self.forward()?;
        self.download(output)
    }

    /// Upload, normalized inverse transform, download.
    pub fn inverse_host(
        &mut self,
        input: &[Complex<T>],
        output: &mut [Complex<T>],
    ) -> SignalResult<()> {
        self.check_host_pair(input.len(), output.len())?;
        self.upload(input)?;
        self.inverse()?;
        self.download(output)
    }

    /// Forward transform of a device buffer owned elsewhere, in place.
    pub fn forward_device(&self, data: &mut DeviceBuffer<Complex<T>>) -> SignalResult<()> {
        self.configured()?
            .transform(&self.device, Direction::Forward, data.as_mut_slice())
    }

    /// Normalized inverse transform of a device buffer owned elsewhere, in place.
    pub fn inverse_device(&self, data: &mut DeviceBuffer<Complex<T>>) -> SignalResult<()> {
        self.configured()?
            .transform(&self.device, Direction::Inverse, data.as_mut_slice())
    }

    /// Real-to-complex forward transform (D2Z for `f64`). The full spectrum
    /// is left in the device buffer.
    pub fn forward_real(&mut self, input: &[T]) -> SignalResult<()> {
        let device = self.device.clone();
        let cfg = self.configured_mut()?;
        check_len("real forward input", cfg.num_elements(), input.len())?;
        let promoted: Vec<Complex<T>> = input.iter().map(|&v| Complex::new(v, T::zero())).collect();
        cfg.buffer.copy_from_host(&promoted)?;
        let ConfiguredSignal {
            real_plan, buffer, ..
        } = cfg;
        real_plan.execute_forward(buffer.as_mut_slice())?;
        device.recorder().record_transform();
        Ok(())
    }

    /// Complex-to-real inverse transform (Z2D for `f64`) of the resident
    /// spectrum, normalized, written to `output`.
    pub fn inverse_real(&mut self, output: &mut [T]) -> SignalResult<()> {
        let device = self.device.clone();
        let cfg = self.configured_mut()?;
        check_len("real inverse output", cfg.num_elements(), output.len())?;
        {
            let ConfiguredSignal {
                real_plan, buffer, ..
            } = &mut *cfg;
            real_plan.execute_inverse(buffer.as_mut_slice())?;
        }
        device.recorder().record_transform();
        let scale = 1.0 / cfg.layout().normalization_length() as f64;
        scale_elements(&device, cfg.buffer.as_mut_slice(), T::cast(scale));
        let samples = cfg.buffer.to_host_vec();
        for (slot, value) in output.iter_mut().zip(samples) {
            *slot = value.re;
        }
        Ok(())
    }

    fn check_host_pair(&self, input: usize, output: usize) -> SignalResult<()> {
        let expected = self.configured()?.num_elements();
        check_len("host input", expected, input)?;
        check_len("host output", expected, output)
    }
}
