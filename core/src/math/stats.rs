use num_complex::Complex64;

pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[Complex64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|v| v.norm_sqr()).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// Largest elementwise distance; `f64::INFINITY` when lengths differ.
    pub fn max_abs_diff(lhs: &[Complex64], rhs: &[Complex64]) -> f64 {
        if lhs.len() != rhs.len() {
            return f64::INFINITY;
        }
        lhs.iter()
            .zip(rhs)
            .map(|(a, b)| (a - b).norm())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[Complex64::new(0.0, 0.0); 2]), 0.0);
    }

    #[test]
    fn rms_handles_single_value() {
        assert_eq!(StatsHelper::rms(&[Complex64::new(3.0, 4.0)]), 5.0);
    }

    #[test]
    fn max_abs_diff_flags_length_mismatch() {
        let a = [Complex64::new(1.0, 0.0)];
        assert_eq!(StatsHelper::max_abs_diff(&a, &[]), f64::INFINITY);
        assert_eq!(StatsHelper::max_abs_diff(&a, &a), 0.0);
    }
}
