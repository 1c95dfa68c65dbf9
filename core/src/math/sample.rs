use rustfft::FftNum;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Precision of a complex transform: C2C for single, Z2Z for double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Single,
    Double,
}

/// Floating-point element type a [`crate::signal::Signal`] can be built over.
pub trait Sample: FftNum + Default + Display {
    const PRECISION: Precision;

    fn cast(value: f64) -> Self;

    fn widen(self) -> f64;
}

impl Sample for f32 {
    const PRECISION: Precision = Precision::Single;

    fn cast(value: f64) -> Self {
        value as f32
    }

    fn widen(self) -> f64 {
        f64::from(self)
    }
}

impl Sample for f64 {
    const PRECISION: Precision = Precision::Double;

    fn cast(value: f64) -> Self {
        value
    }

    fn widen(self) -> f64 {
        self
    }
}
