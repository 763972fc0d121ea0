//! Tier 1: monophonic fundamental-frequency detection via YIN.

use crate::core::event::{NoteEvent, SourceTier};
use crate::core::pitch::{MAX_MIDI_PITCH, MIN_MIDI_PITCH};
use crate::dsp::goertzel::goertzel_magnitude;

/// Minimum accepted fundamental, after octave disambiguation.
pub const MIN_FREQUENCY_HZ: f32 = 130.0;
/// Maximum accepted fundamental.
pub const MAX_FREQUENCY_HZ: f32 = 4500.0;
/// CMND must dip below this for a lag to be considered a minimum at all.
const ABSOLUTE_THRESHOLD: f32 = 0.20;
/// Minimum `1 - cmnd` at the chosen lag for the result to be emitted.
const CONFIDENCE_GATE: f32 = 0.75;

/// A monophonic pitch detector implementing the YIN algorithm.
///
/// Holds no audio state between windows; each call to [`Yin::detect`] is self-contained.
pub struct Yin {
    sample_rate_hz: f32,
}

impl Yin {
    /// Builds a detector for the given sample rate.
    pub fn new(sample_rate_hz: f32) -> Self {
        Self { sample_rate_hz }
    }

    /// Runs YIN on one window of samples, returning a [`NoteEvent`] if a confident, in-range
    /// fundamental was found. `detected_at_sec` should be the wall-clock time of the window's
    /// start (or centre) relative to the owning follower's `start()`.
    pub fn detect(&self, window: &[f32], detected_at_sec: f64) -> Option<NoteEvent> {
        let tau_max = ((self.sample_rate_hz / 50.0) as usize).min(window.len() / 2);
        if tau_max < 2 {
            return None;
        }

        let diff = Self::difference_function(window, tau_max);
        let cmnd = Self::cumulative_mean_normalized_difference(&diff);

        let tau = self.find_minimum_lag(&cmnd)?;
        let tau_interp = Self::parabolic_interpolation(&cmnd, tau);

        let (tau_final, cmnd_final) = self.disambiguate_octave(window, &cmnd, tau, tau_interp)?;

        let confidence = 1.0 - cmnd_final;
        if confidence < CONFIDENCE_GATE {
            return None;
        }

        let mut frequency_hz = self.sample_rate_hz / tau_final;
        if (MIN_FREQUENCY_HZ / 4.0..MIN_FREQUENCY_HZ).contains(&frequency_hz) {
            frequency_hz = self.apply_low_frequency_guard(window, frequency_hz);
        }

        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency_hz) {
            return None;
        }

        let midi_pitch = frequency_to_midi(frequency_hz)?;

        Some(NoteEvent::new(midi_pitch, frequency_hz, confidence.clamp(0.0, 1.0), 0.5, detected_at_sec, SourceTier::Monophonic))
    }

    fn difference_function(window: &[f32], tau_max: usize) -> Vec<f32> {
        let mut diff = vec![0.0f32; tau_max + 1];
        for (tau, slot) in diff.iter_mut().enumerate().skip(1) {
            let mut sum = 0.0f32;
            for i in 0..(window.len() - tau) {
                let delta = window[i] - window[i + tau];
                sum += delta * delta;
            }
            *slot = sum;
        }
        diff
    }

    fn cumulative_mean_normalized_difference(diff: &[f32]) -> Vec<f32> {
        let mut cmnd = vec![1.0f32; diff.len()];
        let mut running_sum = 0.0f32;
        for tau in 1..diff.len() {
            running_sum += diff[tau];
            cmnd[tau] = if running_sum > 0.0 { diff[tau] * tau as f32 / running_sum } else { 1.0 };
        }
        cmnd
    }

    fn find_minimum_lag(&self, cmnd: &[f32]) -> Option<usize> {
        let mut tau = 2;
        while tau < cmnd.len() {
            if cmnd[tau] < ABSOLUTE_THRESHOLD {
                while tau + 1 < cmnd.len() && cmnd[tau + 1] < cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }

        // No lag met the absolute threshold; fall back to the global minimum, restricted to the
        // fallback band [sample_rate/2000, sample_rate/80] rather than the full computed range.
        let lower = ((self.sample_rate_hz / 2000.0).round() as usize).max(2).min(cmnd.len() - 1);
        let upper = ((self.sample_rate_hz / 80.0).round() as usize).min(cmnd.len() - 1);
        if lower > upper {
            return None;
        }
        (lower..=upper).min_by(|&a, &b| cmnd[a].partial_cmp(&cmnd[b]).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn parabolic_interpolation(cmnd: &[f32], tau: usize) -> f32 {
        if tau == 0 || tau + 1 >= cmnd.len() {
            return tau as f32;
        }
        let (y0, y1, y2) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        if denom.abs() < 1e-9 {
            tau as f32
        } else {
            tau as f32 + 0.5 * (y0 - y2) / denom
        }
    }

    /// Scores `tau`, `tau/2`, `tau/4`, `tau/8` candidates and returns the winning lag and its
    /// CMND value, preferring frequencies in the piano's mid range over raw CMND minimality.
    fn disambiguate_octave(&self, window: &[f32], cmnd: &[f32], tau: usize, tau_interp: f32) -> Option<(f32, f32)> {
        let candidates = [(tau_interp, 1u32), (tau_interp / 2.0, 2), (tau_interp / 4.0, 4), (tau_interp / 8.0, 8)];

        let mut best: Option<(f32, f32, f32)> = None; // (tau, cmnd, score)
        for &(candidate_tau, multiplier) in &candidates {
            if candidate_tau < 1.0 {
                continue;
            }
            let lag_index = (candidate_tau.round() as usize).min(cmnd.len() - 1);
            let candidate_cmnd = cmnd[lag_index];
            if candidate_cmnd >= ABSOLUTE_THRESHOLD {
                continue;
            }

            let frequency = self.sample_rate_hz / candidate_tau;
            let score = 0.4 * (1.0 - candidate_cmnd) + 0.5 * frequency_preference(frequency) + 0.1 * (multiplier as f32).log2();

            if best.map(|(_, _, best_score)| score > best_score).unwrap_or(true) {
                best = Some((candidate_tau, candidate_cmnd, score));
            }
        }

        let _ = window; // window reserved for future spectral tie-breaking; unused today.
        best.map(|(t, c, _)| (t, c))
    }

    /// When the winning frequency lands in the ambiguous low octave, verifies against the
    /// octave above using Goertzel spectral energy and shifts up if that octave carries
    /// significant energy.
    fn apply_low_frequency_guard(&self, window: &[f32], frequency_hz: f32) -> f32 {
        let fundamental_mag = goertzel_magnitude(window, self.sample_rate_hz, frequency_hz);
        let octave_up_mag = goertzel_magnitude(window, self.sample_rate_hz, frequency_hz * 2.0);

        if fundamental_mag > 0.0 && octave_up_mag >= 0.20 * fundamental_mag {
            frequency_hz * 2.0
        } else {
            frequency_hz
        }
    }
}

/// A fixed preference curve over fundamental frequency, peaking around the piano's mid range
/// and falling off sharply below the typical low-note floor.
fn frequency_preference(frequency_hz: f32) -> f32 {
    if frequency_hz < 130.0 {
        0.1
    } else if (200.0..=600.0).contains(&frequency_hz) {
        1.0
    } else if frequency_hz < 200.0 {
        0.6
    } else {
        (1.0 - (frequency_hz - 600.0) / 4000.0).clamp(0.2, 1.0)
    }
}

fn frequency_to_midi(frequency_hz: f32) -> Option<u8> {
    let midi = (69.0 + 12.0 * (frequency_hz / 440.0).log2()).round();
    if midi < MIN_MIDI_PITCH as f32 || midi > MAX_MIDI_PITCH as f32 {
        None
    } else {
        Some(midi as u8)
    }
}
