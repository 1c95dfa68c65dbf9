use crate::device::memory::Device;
use crate::math::sample::Sample;
use crate::prelude::{check_len, SignalResult};
use num_complex::Complex;
use rayon::prelude::*;

pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Launch geometry: one logical thread per output element, grouped into
/// blocks of `block_size`. The grid is derived from the element count of the
/// buffer being written and every thread checks its global index against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub block_size: usize,
    pub grid_size: usize,
    pub n_elements: usize,
}

impl LaunchConfig {
    pub fn for_elements(n_elements: usize) -> Self {
        Self::with_block_size(n_elements, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(n_elements: usize, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            grid_size: (n_elements + block_size - 1) / block_size,
            n_elements,
        }
    }

    pub fn total_threads(&self) -> usize {
        self.grid_size * self.block_size
    }
}

fn launch<C, F>(device: &Device, config: &LaunchConfig, out: &mut [C], kernel: F)
where
    C: Send,
    F: Fn(usize, &mut C) + Sync,
{
    device.recorder().record_launch();
    let block_size = config.block_size;
    let n = config.n_elements;
    out.par_chunks_mut(block_size)
        .enumerate()
        .for_each(|(block, chunk)| {
            for (thread, slot) in chunk.iter_mut().enumerate() {
                let index = block * block_size + thread;
                if index < n {
                    kernel(index, slot);
                }
            }
        });
}

/// `signal[i] *= filter[i]` over every element.
pub fn multiply_elementwise<T: Sample>(
    device: &Device,
    signal: &mut [Complex<T>],
    filter: &[Complex<T>],
) -> SignalResult<()> {
    check_len("elementwise multiply", signal.len(), filter.len())?;
    let config = LaunchConfig::for_elements(signal.len());
    launch(device, &config, signal, |i, value| {
        *value = *value * filter[i];
    });
    Ok(())
}

/// `data[i] *= factor` over every element.
pub fn scale_elements<T: Sample>(device: &Device, data: &mut [Complex<T>], factor: T) {
    let config = LaunchConfig::for_elements(data.len());
    launch(device, &config, data, |_, value| {
        *value = *value * factor;
    });
}

/// Geometry of a range spectral shift from `cols_lo` to `cols_hi` bins per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftGeometry {
    pub rows: usize,
    pub cols_lo: usize,
    pub cols_hi: usize,
}

impl ShiftGeometry {
    /// Low-resolution index feeding high-resolution element `index`, if any.
    /// Non-negative bins stay at the start of the row, negative bins move to
    /// its end, and the gap in between is zero padding.
    pub fn source_index(&self, index: usize) -> Option<usize> {
        let row = index / self.cols_hi;
        let col = index % self.cols_hi;
        let positive = (self.cols_lo + 1) / 2;
        let negative = self.cols_lo - positive;
        if col < positive {
            Some(row * self.cols_lo + col)
        } else if col >= self.cols_hi - negative {
            Some(row * self.cols_lo + col - (self.cols_hi - self.cols_lo))
        } else {
            None
        }
    }
}

/// Copies each low-resolution spectrum row into a zero-padded high-resolution
/// row, multiplying by `gain` and, when given, by the matching element of
/// `impact` (same shape as the padded spectrum).
pub fn range_shift<T: Sample>(
    device: &Device,
    geometry: ShiftGeometry,
    lo: &[Complex<T>],
    hi: &mut [Complex<T>],
    gain: T,
    impact: Option<&[Complex<T>]>,
) -> SignalResult<()> {
    check_len("range shift input", geometry.rows * geometry.cols_lo, lo.len())?;
    check_len("range shift output", geometry.rows * geometry.cols_hi, hi.len())?;
    if let Some(impact) = impact {
        check_len("shift impact", hi.len(), impact.len())?;
    }

    let config = LaunchConfig::for_elements(hi.len());
    launch(device, &config, hi, |i, value| {
        *value = match geometry.source_index(i) {
            Some(src) => {
                let shifted = lo[src] * gain;
                match impact {
                    Some(impact) => shifted * impact[i],
                    None => shifted,
                }
            }
            None => Complex::new(T::zero(), T::zero()),
        };
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::SignalError;
    use num_complex::Complex32;

    #[test]
    fn launch_geometry_covers_all_elements() {
        let config = LaunchConfig::with_block_size(1000, 256);
        assert_eq!(config.grid_size, 4);
        assert!(config.total_threads() >= 1000);
        assert_eq!(LaunchConfig::for_elements(0).grid_size, 0);
    }

    #[test]
    fn multiply_is_complex_and_bounds_checked() {
        let device = Device::new();
        let mut signal = vec![Complex32::new(1.0, 1.0); 300];
        let filter: Vec<Complex32> = (0..300)
            .map(|i| Complex32::new(0.0, i as f32))
            .collect();
        multiply_elementwise(&device, &mut signal, &filter).unwrap();
        assert_eq!(signal[2], Complex32::new(-2.0, 2.0));
        assert_eq!(signal[299], Complex32::new(-299.0, 299.0));
        assert_eq!(device.metrics().kernel_launches, 1);

        let err = multiply_elementwise(&device, &mut signal, &filter[..10]).unwrap_err();
        assert!(matches!(err, SignalError::DimensionMismatch { .. }));
    }

    #[test]
    fn range_shift_pads_between_halves() {
        let device = Device::new();
        let geometry = ShiftGeometry {
            rows: 1,
            cols_lo: 4,
            cols_hi: 8,
        };
        let lo: Vec<Complex32> = (1..=4).map(|v| Complex32::new(v as f32, 0.0)).collect();
        let mut hi = vec![Complex32::new(9.0, 9.0); 8];
        range_shift(&device, geometry, &lo, &mut hi, 2.0, None).unwrap();
        let re: Vec<f32> = hi.iter().map(|c| c.re).collect();
        assert_eq!(re, vec![2.0, 4.0, 0.0, 0.0, 0.0, 0.0, 6.0, 8.0]);
        assert!(hi.iter().all(|c| c.im == 0.0));
    }

    #[test]
    fn range_shift_applies_impact_and_checks_shape() {
        let device = Device::new();
        let geometry = ShiftGeometry {
            rows: 2,
            cols_lo: 3,
            cols_hi: 6,
        };
        let lo = vec![Complex32::new(1.0, 0.0); 6];
        let impact = vec![Complex32::new(0.0, 1.0); 12];
        let mut hi = vec![Complex32::new(0.0, 0.0); 12];
        range_shift(&device, geometry, &lo, &mut hi, 1.0, Some(&impact)).unwrap();
        // Odd length: two non-negative bins, one negative bin per row.
        assert_eq!(hi[0], Complex32::new(0.0, 1.0));
        assert_eq!(hi[1], Complex32::new(0.0, 1.0));
        assert_eq!(hi[2], Complex32::new(0.0, 0.0));
        assert_eq!(hi[4], Complex32::new(0.0, 0.0));
        assert_eq!(hi[11], Complex32::new(0.0, 1.0));

        let err = range_shift(&device, geometry, &lo, &mut hi, 1.0, Some(&impact[..6]));
        assert!(matches!(
            err,
            Err(SignalError::DimensionMismatch {
                context: "shift impact",
                ..
            })
        ));
    }
}
