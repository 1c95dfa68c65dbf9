use crate::prelude::{check_len, SignalError, SignalResult};
use crate::telemetry::{LogManager, MetricsRecorder, MetricsSnapshot};
use std::fmt;
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct DeviceInner {
    capacity: Option<usize>,
    live_bytes: AtomicUsize,
    live_allocations: AtomicUsize,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl DeviceInner {
    fn reserve(&self, bytes: usize) -> SignalResult<()> {
        let capacity = self.capacity;
        self.live_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let next = used.checked_add(bytes)?;
                match capacity {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|used| SignalError::DeviceAllocation {
                requested: bytes,
                available: capacity.map_or(usize::MAX, |limit| limit.saturating_sub(used)),
            })
    }

    fn release(&self, bytes: usize) {
        self.live_bytes.fetch_sub(bytes, Ordering::SeqCst);
    }
}

/// Handle to the in-process accelerator. Cloning is cheap and refers to the
/// same device; allocations are handed out as [`DeviceBuffer`]s.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Device without a memory limit.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Device that refuses allocations once `bytes` are in use.
    pub fn with_capacity(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                capacity,
                live_bytes: AtomicUsize::new(0),
                live_allocations: AtomicUsize::new(0),
                metrics: MetricsRecorder::new(),
                logger: LogManager::new("device"),
            }),
        }
    }

    /// Allocates `len` zero-initialised elements. Exhaustion is reported, never retried.
    pub fn allocate<T: Copy + Default>(&self, len: usize) -> SignalResult<DeviceBuffer<T>> {
        let bytes = len
            .checked_mul(size_of::<T>())
            .ok_or_else(|| SignalError::DeviceAllocation {
                requested: usize::MAX,
                available: self.available_bytes(),
            })?;

        if let Err(err) = self.inner.reserve(bytes) {
            self.inner.metrics.record_error();
            self.inner
                .logger
                .caution(&format!("allocation of {} bytes refused", bytes));
            return Err(err);
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            self.inner.release(bytes);
            self.inner.metrics.record_error();
            return Err(SignalError::DeviceAllocation {
                requested: bytes,
                available: self.available_bytes(),
            });
        }
        data.resize(len, T::default());

        self.inner.live_allocations.fetch_add(1, Ordering::SeqCst);
        self.inner
            .logger
            .trace(&format!("allocated {} bytes ({} elements)", bytes, len));

        Ok(DeviceBuffer {
            data,
            bytes,
            device: self.clone(),
        })
    }

    /// Completion barrier. Work issued from one host thread already runs in
    /// issue order on the in-process device, so nothing is pending here.
    pub fn synchronize(&self) {}

    pub fn live_allocations(&self) -> usize {
        self.inner.live_allocations.load(Ordering::SeqCst)
    }

    pub fn live_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    pub fn available_bytes(&self) -> usize {
        self.inner
            .capacity
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.live_bytes()))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub(crate) fn recorder(&self) -> &MetricsRecorder {
        &self.inner.metrics
    }

    pub fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("capacity", &self.inner.capacity)
            .field("live_bytes", &self.live_bytes())
            .field("live_allocations", &self.live_allocations())
            .finish()
    }
}

/// Exclusive owner of one device allocation. Never cloned or shared;
/// dropping it returns its bytes to the device.
pub struct DeviceBuffer<T> {
    data: Vec<T>,
    bytes: usize,
    device: Device,
}

impl<T: Copy> DeviceBuffer<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Host to device copy; the host slice must match the allocation exactly.
    pub fn copy_from_host(&mut self, host: &[T]) -> SignalResult<()> {
        check_len("host to device copy", self.data.len(), host.len())?;
        self.data.copy_from_slice(host);
        self.device.recorder().record_to_device(self.bytes);
        Ok(())
    }

    /// Device to host copy; the host slice must match the allocation exactly.
    pub fn copy_to_host(&self, host: &mut [T]) -> SignalResult<()> {
        check_len("device to host copy", self.data.len(), host.len())?;
        host.copy_from_slice(&self.data);
        self.device.recorder().record_to_host(self.bytes);
        Ok(())
    }

    pub fn to_host_vec(&self) -> Vec<T> {
        self.device.recorder().record_to_host(self.bytes);
        self.data.clone()
    }
}

impl<T: Copy + Default> DeviceBuffer<T> {
    pub fn fill_zero(&mut self) {
        self.data.fill(T::default());
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.device.inner.release(self.bytes);
        self.device
            .inner
            .live_allocations
            .fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("len", &self.data.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    #[test]
    fn dropping_buffer_returns_memory() {
        let device = Device::new();
        {
            let buffer = device.allocate::<Complex32>(16).unwrap();
            assert_eq!(buffer.size_bytes(), 16 * 8);
            assert_eq!(device.live_allocations(), 1);
            assert_eq!(device.live_bytes(), 128);
        }
        assert_eq!(device.live_allocations(), 0);
        assert_eq!(device.live_bytes(), 0);
    }

    #[test]
    fn capacity_exhaustion_is_reported() {
        let device = Device::with_capacity(100);
        let first = device.allocate::<f64>(10).unwrap();
        let err = device.allocate::<f64>(4).unwrap_err();
        assert!(matches!(
            err,
            SignalError::DeviceAllocation {
                requested: 32,
                available: 20
            }
        ));
        assert_eq!(device.live_allocations(), 1);
        assert_eq!(device.metrics().errors, 1);
        drop(first);
        assert!(device.allocate::<f64>(12).is_ok());
    }

    #[test]
    fn copies_validate_length_and_count_bytes() {
        let device = Device::new();
        let mut buffer = device.allocate::<f32>(4).unwrap();
        assert!(matches!(
            buffer.copy_from_host(&[1.0, 2.0]),
            Err(SignalError::DimensionMismatch {
                expected: 4,
                actual: 2,
                ..
            })
        ));

        buffer.copy_from_host(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut host = [0.0f32; 4];
        buffer.copy_to_host(&mut host).unwrap();
        assert_eq!(host, [1.0, 2.0, 3.0, 4.0]);

        buffer.fill_zero();
        assert!(buffer.as_slice().iter().all(|&v| v == 0.0));

        let metrics = device.metrics();
        assert_eq!(metrics.bytes_to_device, 16);
        assert_eq!(metrics.bytes_to_host, 16);
    }
}
