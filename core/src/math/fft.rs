use crate::math::sample::Sample;
use crate::prelude::{check_len, SignalError, SignalResult};
use num_complex::Complex;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest length the backend accepts along one dimension.
pub const MAX_TRANSFORM_LENGTH: usize = i32::MAX as usize;

/// Axis a plan transforms along. Range runs across columns, azimuth down rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformAxis {
    Range,
    Azimuth,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// One batched 1-D pass: `howmany` lines of `n` samples, `stride` apart
/// inside a line and `dist` apart between consecutive lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPass {
    pub n: usize,
    pub howmany: usize,
    pub stride: usize,
    pub dist: usize,
}

impl BatchPass {
    fn index(&self, line: usize, sample: usize) -> usize {
        line * self.dist + sample * self.stride
    }

    fn is_contiguous(&self) -> bool {
        self.stride == 1 && self.dist == self.n
    }
}

/// Plan descriptor in the "plan many" form: rank, lengths, batch count and
/// the embed / stride / distance triples for input and output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLayout {
    pub axis: TransformAxis,
    pub rows: usize,
    pub columns: usize,
    pub rank: usize,
    pub n: Vec<usize>,
    pub howmany: usize,
    pub inembed: Vec<usize>,
    pub istride: usize,
    pub idist: usize,
    pub onembed: Vec<usize>,
    pub ostride: usize,
    pub odist: usize,
}

impl PlanLayout {
    pub fn new(axis: TransformAxis, rows: usize, columns: usize) -> SignalResult<Self> {
        if rows == 0 || columns == 0 {
            return Err(SignalError::PlanCreation(format!(
                "block {}x{} has an empty dimension",
                rows, columns
            )));
        }
        let elements = rows.checked_mul(columns).ok_or_else(|| {
            SignalError::PlanCreation(format!("block {}x{} overflows", rows, columns))
        })?;

        let layout = match axis {
            TransformAxis::Range => Self {
                axis,
                rows,
                columns,
                rank: 1,
                n: vec![columns],
                howmany: rows,
                inembed: vec![columns],
                istride: 1,
                idist: columns,
                onembed: vec![columns],
                ostride: 1,
                odist: columns,
            },
            TransformAxis::Azimuth => Self {
                axis,
                rows,
                columns,
                rank: 1,
                n: vec![rows],
                howmany: columns,
                inembed: vec![rows],
                istride: columns,
                idist: 1,
                onembed: vec![rows],
                ostride: columns,
                odist: 1,
            },
            TransformAxis::Both => Self {
                axis,
                rows,
                columns,
                rank: 2,
                n: vec![rows, columns],
                howmany: 1,
                inembed: vec![rows, columns],
                istride: 1,
                idist: elements,
                onembed: vec![rows, columns],
                ostride: 1,
                odist: elements,
            },
        };

        if let Some(&len) = layout.n.iter().find(|&&len| len > MAX_TRANSFORM_LENGTH) {
            return Err(SignalError::PlanCreation(format!(
                "transform length {} exceeds backend limit {}",
                len, MAX_TRANSFORM_LENGTH
            )));
        }

        Ok(layout)
    }

    pub fn element_count(&self) -> usize {
        self.rows * self.columns
    }

    /// Product of the transformed lengths; the inverse scale is its reciprocal.
    pub fn normalization_length(&self) -> usize {
        self.n.iter().product()
    }

    pub fn passes(&self) -> Vec<BatchPass> {
        let range = BatchPass {
            n: self.columns,
            howmany: self.rows,
            stride: 1,
            dist: self.columns,
        };
        let azimuth = BatchPass {
            n: self.rows,
            howmany: self.columns,
            stride: self.columns,
            dist: 1,
        };
        match self.axis {
            TransformAxis::Range => vec![range],
            TransformAxis::Azimuth => vec![azimuth],
            TransformAxis::Both => vec![range, azimuth],
        }
    }
}

struct PlannedPass<T: Sample> {
    batch: BatchPass,
    forward: Arc<dyn Fft<T>>,
    inverse: Arc<dyn Fft<T>>,
}

impl<T: Sample> PlannedPass<T> {
    fn run(&self, direction: Direction, data: &mut [Complex<T>]) {
        let fft = match direction {
            Direction::Forward => self.forward.as_ref(),
            Direction::Inverse => self.inverse.as_ref(),
        };
        let n = self.batch.n;
        if self.batch.is_contiguous() {
            data.par_chunks_mut(n).for_each(|line| fft.process(line));
            return;
        }
        let mut lines = gather(&self.batch, data);
        lines.par_chunks_mut(n).for_each(|line| fft.process(line));
        scatter(&self.batch, &lines, data);
    }
}

fn plan_passes<T: Sample>(batches: Vec<BatchPass>) -> Vec<PlannedPass<T>> {
    let mut planner = FftPlanner::<T>::new();
    batches
        .into_iter()
        .map(|batch| PlannedPass {
            batch,
            forward: planner.plan_fft_forward(batch.n),
            inverse: planner.plan_fft_inverse(batch.n),
        })
        .collect()
}

/// Complex-to-complex plan with independent forward and inverse kernels.
pub struct TransformPlan<T: Sample> {
    layout: PlanLayout,
    passes: Vec<PlannedPass<T>>,
}

impl<T: Sample> TransformPlan<T> {
    pub fn new(layout: PlanLayout) -> Self {
        let passes = plan_passes(layout.passes());
        Self { layout, passes }
    }

    pub fn layout(&self) -> &PlanLayout {
        &self.layout
    }

    /// Runs every pass of the plan over `data`. Neither direction scales.
    pub fn execute(&self, direction: Direction, data: &mut [Complex<T>]) -> SignalResult<()> {
        check_len("transform execution", self.layout.element_count(), data.len())?;
        for pass in &self.passes {
            pass.run(direction, data);
        }
        Ok(())
    }
}

/// Real-to-complex / complex-to-real plan. The first pass of the layout is
/// the real one; a 2-D layout finishes with a complex pass down the columns.
///
/// The buffer always carries the full spectrum: forward fills the redundant
/// half by Hermitian symmetry, inverse reads only the non-redundant half.
pub struct RealTransformPlan<T: Sample> {
    layout: PlanLayout,
    real_pass: BatchPass,
    r2c: Arc<dyn RealToComplex<T>>,
    c2r: Arc<dyn ComplexToReal<T>>,
    complex_passes: Vec<PlannedPass<T>>,
}

impl<T: Sample> RealTransformPlan<T> {
    pub fn new(layout: PlanLayout) -> Self {
        let mut batches = layout.passes();
        let real_pass = batches.remove(0);
        let mut planner = RealFftPlanner::<T>::new();
        let r2c = planner.plan_fft_forward(real_pass.n);
        let c2r = planner.plan_fft_inverse(real_pass.n);
        Self {
            layout,
            real_pass,
            r2c,
            c2r,
            complex_passes: plan_passes(batches),
        }
    }

    pub fn layout(&self) -> &PlanLayout {
        &self.layout
    }

    /// Treats the real parts of `data` as input; imaginary parts are ignored.
    pub fn execute_forward(&self, data: &mut [Complex<T>]) -> SignalResult<()> {
        check_len("real transform execution", self.layout.element_count(), data.len())?;
        let n = self.real_pass.n;
        let mut lines = gather(&self.real_pass, data);
        lines
            .par_chunks_mut(n)
            .try_for_each(|line| -> SignalResult<()> {
                let mut input: Vec<T> = line.iter().map(|c| c.re).collect();
                let mut half = self.r2c.make_output_vec();
                self.r2c
                    .process(&mut input, &mut half)
                    .map_err(|err| SignalError::Internal(err.to_string()))?;
                expand_hermitian(&half, line);
                Ok(())
            })?;
        scatter(&self.real_pass, &lines, data);

        for pass in &self.complex_passes {
            pass.run(Direction::Forward, data);
        }
        Ok(())
    }

    /// Leaves a purely real result (zero imaginary parts) in `data`.
    pub fn execute_inverse(&self, data: &mut [Complex<T>]) -> SignalResult<()> {
        check_len("real transform execution", self.layout.element_count(), data.len())?;
        for pass in self.complex_passes.iter().rev() {
            pass.run(Direction::Inverse, data);
        }

        let n = self.real_pass.n;
        let mut lines = gather(&self.real_pass, data);
        lines
            .par_chunks_mut(n)
            .try_for_each(|line| -> SignalResult<()> {
                let mut half: Vec<Complex<T>> = line[..n / 2 + 1].to_vec();
                half[0].im = T::zero();
                if n % 2 == 0 {
                    half[n / 2].im = T::zero();
                }
                let mut output = self.c2r.make_output_vec();
                self.c2r
                    .process(&mut half, &mut output)
                    .map_err(|err| SignalError::Internal(err.to_string()))?;
                for (slot, value) in line.iter_mut().zip(output) {
                    *slot = Complex::new(value, T::zero());
                }
                Ok(())
            })?;
        scatter(&self.real_pass, &lines, data);
        Ok(())
    }
}

fn expand_hermitian<T: Sample>(half: &[Complex<T>], line: &mut [Complex<T>]) {
    let n = line.len();
    for (k, slot) in line.iter_mut().enumerate() {
        *slot = if k < half.len() {
            half[k]
        } else {
            half[n - k].conj()
        };
    }
}

fn gather<C: Copy + Default + Send + Sync>(batch: &BatchPass, data: &[C]) -> Vec<C> {
    let mut lines = vec![C::default(); batch.n * batch.howmany];
    lines
        .par_chunks_mut(batch.n)
        .enumerate()
        .for_each(|(line, out)| {
            for (sample, slot) in out.iter_mut().enumerate() {
                *slot = data[batch.index(line, sample)];
            }
        });
    lines
}

fn scatter<C: Copy>(batch: &BatchPass, lines: &[C], data: &mut [C]) {
    for (line, values) in lines.chunks(batch.n).enumerate() {
        for (sample, &value) in values.iter().enumerate() {
            data[batch.index(line, sample)] = value;
        }
    }
}

/// Smallest power of two that is at least `n` (1 for `n == 0`).
pub fn next_power_of_two(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Signed frequency index of bin `k` in standard FFT ordering.
pub fn signed_bin(k: usize, nfft: usize) -> i64 {
    if k < (nfft + 1) / 2 {
        k as i64
    } else {
        k as i64 - nfft as i64
    }
}

/// Frequency of every bin of an `nfft`-point transform sampled every `dt`.
pub fn fftfreq(nfft: usize, dt: f64) -> Vec<f64> {
    let df = 1.0 / (nfft as f64 * dt);
    (0..nfft)
        .map(|k| signed_bin(k, nfft) as f64 * df)
        .collect()
}
