//! Audio file decoding and resampling

pub mod decoder;
pub mod resample;

pub use decoder::decode;
pub use resample::resample;
