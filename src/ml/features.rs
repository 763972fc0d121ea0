//! Turns a raw Tier 3 input frame into the `[T, F]` spectral feature stack the transcription
//! model consumes.
//!
//! The model itself only sees a fixed-size spectral feature per time step; the specifics of
//! how that feature is computed are an implementation detail behind the model's input layer,
//! the same way the reference stack's frequency-space extraction is private to its model
//! plumbing.

use rustfft::{num_complex::Complex32, FftPlanner};

use crate::dsp::preprocessor::apply_hann_window;

/// Sample rate Tier 3 operates at.
pub const SAMPLE_RATE_HZ: u32 = 16_000;
/// Exact frame length Tier 3 requires: 1.12 seconds at 16 kHz.
pub const FRAME_SAMPLES: usize = 17_920;
/// Number of time steps the model produces per frame (~35 ms each).
pub const TIME_STEPS: usize = 32;
/// Samples per time step (`FRAME_SAMPLES / TIME_STEPS`, evenly divisible by construction).
pub const SAMPLES_PER_STEP: usize = FRAME_SAMPLES / TIME_STEPS;
/// Number of piano keys the model's output is indexed over (A0..C8).
pub const NUM_KEYS: usize = 88;
/// Width of the per-step spectral feature vector fed to the model.
pub const FEATURE_BINS: usize = 128;

const _: () = assert!(SAMPLES_PER_STEP * TIME_STEPS == FRAME_SAMPLES);

/// Computes the `[TIME_STEPS][FEATURE_BINS]` feature stack for one Tier 3 frame.
///
/// `frame` must contain exactly [`FRAME_SAMPLES`] samples at [`SAMPLE_RATE_HZ`]; callers
/// resample via [`crate::dsp::resample`] first if their audio arrives at a different rate.
pub fn frame_to_features(frame: &[f32]) -> Vec<[f32; FEATURE_BINS]> {
    debug_assert_eq!(frame.len(), FRAME_SAMPLES);

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(SAMPLES_PER_STEP);

    let mut steps = Vec::with_capacity(TIME_STEPS);
    for step in frame.chunks(SAMPLES_PER_STEP) {
        let mut windowed = step.to_vec();
        apply_hann_window(&mut windowed);

        let mut buffer: Vec<Complex32> = windowed.iter().map(|&s| Complex32::new(s, 0.0)).collect();
        fft.process(&mut buffer);

        let mut bins = [0.0f32; FEATURE_BINS];
        for (bin, value) in bins.iter_mut().zip(buffer.iter().take(FEATURE_BINS)) {
            *bin = value.norm();
        }
        steps.push(bins);
    }

    steps
}

/// Flattens the `[TIME_STEPS][FEATURE_BINS]` feature stack into row-major `f32`s suitable for
/// `Tensor::from_floats(..., device).reshape([1, TIME_STEPS, FEATURE_BINS])`.
pub fn flatten_features(steps: &[[f32; FEATURE_BINS]]) -> Vec<f32> {
    steps.iter().flat_map(|row| row.iter().copied()).collect()
}
