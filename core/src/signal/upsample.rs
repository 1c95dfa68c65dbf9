use crate::device::kernels::{range_shift, ShiftGeometry};
use crate::device::memory::DeviceBuffer;
use crate::math::fft::TransformAxis;
use crate::math::sample::Sample;
use crate::prelude::{check_len, SignalError, SignalResult};
use crate::signal::engine::Signal;
use num_complex::Complex;

fn geometry<T: Sample>(fwd: &Signal<T>, inv: &Signal<T>, factor: usize) -> SignalResult<ShiftGeometry> {
    if factor == 0 {
        return Err(SignalError::InvalidParameter(
            "upsample factor must be at least 1".into(),
        ));
    }
    let lo = fwd.configured()?;
    let hi = inv.configured()?;
    if lo.axis() != TransformAxis::Range || hi.axis() != TransformAxis::Range {
        return Err(SignalError::InvalidParameter(
            "upsampling needs two range-configured engines".into(),
        ));
    }
    check_len("upsampled rows", lo.rows(), hi.rows())?;
    check_len("upsampled columns", lo.columns() * factor, hi.columns())?;
    Ok(ShiftGeometry {
        rows: lo.rows(),
        cols_lo: lo.columns(),
        cols_hi: hi.columns(),
    })
}

/// Device-resident upsampling along range. `fwd` is configured for the
/// original block and already holds its spectrum; `inv` has the same rows and
/// `factor` times the columns. The spectrum is zero-padded into `inv`,
/// optionally multiplied by `shift_impact`, and inverse transformed, leaving
/// the upsampled block in `inv`. Samples keep their amplitude.
pub fn upsample<T: Sample>(
    fwd: &Signal<T>,
    inv: &mut Signal<T>,
    factor: usize,
    shift_impact: Option<&DeviceBuffer<Complex<T>>>,
) -> SignalResult<()> {
    let geometry = geometry(fwd, inv, factor)?;
    let device = inv.device().clone();
    let lo = fwd.device_buffer()?.as_slice();
    let impact = shift_impact.map(|buffer| buffer.as_slice());
    range_shift(
        &device,
        geometry,
        lo,
        inv.device_buffer_mut()?.as_mut_slice(),
        T::cast(factor as f64),
        impact,
    )?;
    inv.inverse()
}

/// Host-array upsampling: uploads `input`, forward transforms it in `fwd`,
/// upsamples into `inv` and downloads the result to `output`.
pub fn upsample_host<T: Sample>(
    fwd: &mut Signal<T>,
    inv: &mut Signal<T>,
    input: &[Complex<T>],
    output: &mut [Complex<T>],
    factor: usize,
    shift_impact: Option<&[Complex<T>]>,
) -> SignalResult<()> {
    geometry(fwd, inv, factor)?;
    check_len("upsample input", fwd.num_elements(), input.len())?;
    check_len("upsample output", inv.num_elements(), output.len())?;
    if let Some(host) = shift_impact {
        check_len("shift impact", inv.num_elements(), host.len())?;
    }

    fwd.upload(input)?;
    fwd.forward()?;

    let impact = match shift_impact {
        Some(host) => {
            let mut buffer = inv.device().allocate::<Complex<T>>(host.len())?;
            buffer.copy_from_host(host)?;
            Some(buffer)
        }
        None => None,
    };
    upsample(fwd, inv, factor, impact.as_ref())?;
    inv.download(output)
}

/// Host-side spectral shift of a `rows x columns` spectrum into a
/// `rows x nfft` zero-padded spectrum, without any gain.
pub fn shift<T: Sample>(
    input: &[Complex<T>],
    output: &mut [Complex<T>],
    rows: usize,
    nfft: usize,
    columns: usize,
) -> SignalResult<()> {
    check_len("shift input", rows * columns, input.len())?;
    check_len("shift output", rows * nfft, output.len())?;
    if nfft < columns {
        return Err(SignalError::InvalidParameter(format!(
            "cannot shift {} bins into {}",
            columns, nfft
        )));
    }
    let geometry = ShiftGeometry {
        rows,
        cols_lo: columns,
        cols_hi: nfft,
    };
    for (index, slot) in output.iter_mut().enumerate() {
        *slot = match geometry.source_index(index) {
            Some(src) => input[src],
            None => Complex::new(T::zero(), T::zero()),
        };
    }
    Ok(())
}
