//! Shared fixtures for the end-to-end scenario and invariant tests (spec §8).

use woodshed::core::event::{Exercise, ExpectedGroup, Hand};

/// Timing tolerance as a fraction of one beat (§4.6).
pub const TIMING_TOLERANCE_BEAT_FRACTION: f64 = 0.200;
/// Timing max as a fraction of one beat (§4.6).
pub const TIMING_MAX_BEAT_FRACTION: f64 = 0.400;

/// A repeating cycle of chord sizes used to give a synthetic exercise a realistic mix of single
/// notes and chords, the same shape described for the "Perfect" scoring scenario in §8 (mostly
/// single notes with occasional 2- and 3-note chords).
const CHORD_SIZE_CYCLE: [usize; 5] = [1, 1, 1, 2, 3];

/// A fixed C-major-ish scale to draw chord pitches from, so every group's pitch set is musically
/// plausible and stays within the 88-key range.
const SCALE_DEGREES: [u8; 7] = [60, 62, 64, 65, 67, 69, 71];

/// Builds a synthetic exercise with `n_groups` groups spaced one beat apart, in 6/8 at the
/// tempo described by the "Perfect" example in §8 (bpm 105, beat_unit 1.5s, 2 beats per bar).
///
/// Group `i`'s pitch set has `CHORD_SIZE_CYCLE[i % 5]` notes, drawn from a fixed scale so the
/// total hit count across every group is deterministic and can be computed by callers.
pub fn synthetic_perfect_exercise(n_groups: usize) -> Exercise {
    let beat_unit = 1.5;
    let beats_per_bar = 2u32;
    let bpm = 105.0;

    let groups = (0..n_groups)
        .map(|i| {
            let chord_size = CHORD_SIZE_CYCLE[i % CHORD_SIZE_CYCLE.len()];
            let midi_pitches: Vec<u8> = (0..chord_size).map(|j| SCALE_DEGREES[(i + j) % SCALE_DEGREES.len()]).collect();

            let expected_time_sec = i as f64 * beat_unit;
            let total_beats = expected_time_sec / beat_unit;

            ExpectedGroup {
                group_index: i,
                midi_pitches,
                expected_time_sec,
                timing_tolerance_sec: TIMING_TOLERANCE_BEAT_FRACTION * beat_unit,
                timing_max_sec: TIMING_MAX_BEAT_FRACTION * beat_unit,
                bar_index: (total_beats / beats_per_bar as f64).floor() as usize,
                beat_position: total_beats.rem_euclid(beats_per_bar as f64),
                hand: Hand::Both,
                duration_sec: 0.2,
            }
        })
        .collect();

    Exercise {
        source_id: "synthetic-perfect".into(),
        bpm,
        beats_per_bar,
        beat_unit,
        time_signature: (6, 8),
        groups,
    }
}

/// Total number of individual pitch-hits across every group of
/// [`synthetic_perfect_exercise`] (the sum of each group's chord size), the expected
/// `on_time` count when every pitch of every group is played exactly on time.
pub fn total_pitch_hits(exercise: &Exercise) -> u32 {
    exercise.groups.iter().map(|g| g.midi_pitches.len() as u32).sum()
}
