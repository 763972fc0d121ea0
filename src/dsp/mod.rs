//! Signal-processing building blocks used by the detector tiers.

pub mod goertzel;
pub mod preprocessor;

#[cfg(feature = "resample")]
pub mod resample;
