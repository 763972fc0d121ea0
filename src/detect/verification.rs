//! Tier 2: spectral-energy verification against a known expected pitch set.
//!
//! Verification ("did they play what was asked?") is materially cheaper than open-ended
//! discovery, so this tier is preferred whenever an expected pitch set is already known.

use crate::core::pitch::midi_to_frequency_hz;
use crate::dsp::goertzel::goertzel_magnitude;

/// Fraction of expected pitches that must clear the energy ratio for a window to verify as a
/// match.
const REQUIRED_HIT_FRACTION: f64 = 2.0 / 3.0;
/// Minimum energy ratio (relative to the strongest expected pitch) for a pitch to count as
/// present.
const ENERGY_RATIO_THRESHOLD: f32 = 0.35;

/// The verdict produced by [`verify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationResult {
    /// Whether enough of the expected pitches were found with sufficient energy.
    pub matched: bool,
    /// Mean accepted score divided by the strongest pitch's score, in `[0, 1]`.
    pub confidence: f32,
}

/// Scores `window` against `expected_midi_pitches` using fundamental + 2nd/3rd harmonic
/// Goertzel energy, and reports whether at least `ceil(n * 2/3)` of them are present.
pub fn verify(window: &[f32], sample_rate_hz: f32, expected_midi_pitches: &[u8]) -> VerificationResult {
    if expected_midi_pitches.is_empty() {
        return VerificationResult { matched: false, confidence: 0.0 };
    }

    let scores: Vec<f32> = expected_midi_pitches
        .iter()
        .map(|&pitch| {
            let f0 = midi_to_frequency_hz(pitch);
            let mag0 = goertzel_magnitude(window, sample_rate_hz, f0);
            let mag1 = goertzel_magnitude(window, sample_rate_hz, f0 * 2.0);
            let mag2 = goertzel_magnitude(window, sample_rate_hz, f0 * 3.0);
            mag0 + 0.4 * mag1 + 0.2 * mag2
        })
        .collect();

    let max_score = scores.iter().cloned().fold(0.0f32, f32::max);
    if max_score <= 0.0 {
        return VerificationResult { matched: false, confidence: 0.0 };
    }

    let accepted: Vec<f32> = scores.iter().copied().filter(|&s| s >= ENERGY_RATIO_THRESHOLD * max_score).collect();
    let required = (expected_midi_pitches.len() as f64 * REQUIRED_HIT_FRACTION).ceil() as usize;

    let matched = accepted.len() >= required;
    let confidence = if accepted.is_empty() { 0.0 } else { accepted.iter().sum::<f32>() / accepted.len() as f32 / max_score };

    VerificationResult { matched, confidence }
}
