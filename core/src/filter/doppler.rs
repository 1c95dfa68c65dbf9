use crate::prelude::{SignalError, SignalResult};
use serde::{Deserialize, Serialize};

/// Doppler centroid as a function of position (range or time).
pub trait DopplerModel {
    fn evaluate(&self, position: f64) -> f64;
}

impl<F> DopplerModel for F
where
    F: Fn(f64) -> f64,
{
    fn evaluate(&self, position: f64) -> f64 {
        self(position)
    }
}

/// Uniformly sampled 1-D lookup table with linear interpolation. Positions
/// outside the table take the value of the nearest end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lut1d {
    pub start: f64,
    pub spacing: f64,
    pub values: Vec<f64>,
}

impl Lut1d {
    pub fn new(start: f64, spacing: f64, values: Vec<f64>) -> SignalResult<Self> {
        let lut = Self {
            start,
            spacing,
            values,
        };
        lut.validate()?;
        Ok(lut)
    }

    /// Table returning `value` everywhere.
    pub fn constant(value: f64) -> Self {
        Self {
            start: 0.0,
            spacing: 1.0,
            values: vec![value],
        }
    }

    /// Checks the invariants `new` enforces; used after deserialization.
    pub fn validate(&self) -> SignalResult<()> {
        if self.values.is_empty() {
            return Err(SignalError::InvalidParameter("lookup table is empty".into()));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(SignalError::InvalidParameter(format!(
                "lookup table spacing {} must be positive",
                self.spacing
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DopplerModel for Lut1d {
    fn evaluate(&self, position: f64) -> f64 {
        let Some(&last) = self.values.last() else {
            return 0.0;
        };
        let offset = (position - self.start) / self.spacing;
        if offset.is_nan() || offset <= 0.0 {
            return self.values[0];
        }
        if offset >= (self.values.len() - 1) as f64 {
            return last;
        }
        let index = offset.floor() as usize;
        let frac = offset - index as f64;
        self.values[index] * (1.0 - frac) + self.values[index + 1] * frac
    }
}
