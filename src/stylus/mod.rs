//! Stylus sample normalization into device memory

pub mod destination;
pub mod sample;
pub mod transform;

pub use destination::DeviceDestination;
pub use sample::{
    NormalizedSample, PackedIter, PackedSamples, RawStylusSample, PRESSURE_MAX, TILT_MAGNITUDE_MAX,
};
pub use transform::{NormalizedSamples, StylusPreprocessor};
