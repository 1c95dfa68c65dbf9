use serde::Serialize;
use std::sync::Mutex;

/// Counters kept per device: work issued and bytes moved across the bus.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub transforms: usize,
    pub kernel_launches: usize,
    pub bytes_to_device: usize,
    pub bytes_to_host: usize,
    pub errors: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_transform(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.transforms += 1;
        }
    }

    pub fn record_launch(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.kernel_launches += 1;
        }
    }

    pub fn record_to_device(&self, bytes: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.bytes_to_device += bytes;
        }
    }

    pub fn record_to_host(&self, bytes: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.bytes_to_host += bytes;
        }
    }

    pub fn record_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.errors += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_accumulates_counters() {
        let recorder = MetricsRecorder::new();
        recorder.record_transform();
        recorder.record_launch();
        recorder.record_launch();
        recorder.record_to_device(64);
        recorder.record_to_host(32);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.transforms, 1);
        assert_eq!(snapshot.kernel_launches, 2);
        assert_eq!(snapshot.bytes_to_device, 64);
        assert_eq!(snapshot.bytes_to_host, 32);
        assert_eq!(snapshot.errors, 0);
    }
}
