pub mod applicator;
pub mod design;
pub mod doppler;

pub use applicator::{Filter, FilterKernel};
pub use design::{
    azimuth_commonband_kernel, bandpass_boxcar, bandpass_cosine, range_bandpass_kernel,
    raised_cosine, BandpassConfig, CommonBandKernel, CommonBandParams, FilterType, SubBand,
    DEFAULT_COSINE_BETA,
};
pub use doppler::{DopplerModel, Lut1d};
