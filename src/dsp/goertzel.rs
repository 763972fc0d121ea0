//! Single-bin spectral energy via the Goertzel algorithm.
//!
//! Cheaper than a full FFT when only a handful of known frequencies need to be tested, which
//! is exactly the shape of the low-frequency octave guard in [`crate::detect::yin`] and the
//! chord-verification scoring in [`crate::detect::verification`].

/// Returns the magnitude of `samples` at `target_frequency_hz`, given `sample_rate_hz`.
///
/// `samples` should be a single analysis window (no overlap-add bookkeeping is performed
/// here); callers window it themselves if that matters for their use case.
pub fn goertzel_magnitude(samples: &[f32], sample_rate_hz: f32, target_frequency_hz: f32) -> f32 {
    let n = samples.len();
    if n == 0 {
        return 0.0;
    }

    let k = (0.5 + (n as f32 * target_frequency_hz) / sample_rate_hz).floor();
    let omega = (2.0 * std::f32::consts::PI * k) / n as f32;
    let cosine = omega.cos();
    let coeff = 2.0 * cosine;

    let mut q0;
    let mut q1 = 0.0f32;
    let mut q2 = 0.0f32;

    for &sample in samples {
        q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }

    (q1 * q1 + q2 * q2 - q1 * q2 * coeff).sqrt()
}
