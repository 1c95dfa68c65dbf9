pub mod fft;
pub mod sample;
pub mod stats;

pub use fft::{
    fftfreq, next_power_of_two, Direction, PlanLayout, RealTransformPlan, TransformAxis,
    TransformPlan,
};
pub use sample::{Precision, Sample};
pub use stats::StatsHelper;
