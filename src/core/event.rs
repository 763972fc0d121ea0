//! The shared value types that flow between detectors, the score model, and the follower.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::pitch::midi_to_note_name;

/// Which detector tier produced a [`NoteEvent`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceTier {
    /// Tier 1: monophonic YIN pitch detection.
    Monophonic,
    /// Tier 2: spectral-energy verification against an expected pitch set.
    Verification,
    /// Tier 3: ML-model polyphonic transcription.
    Polyphonic,
}

/// A coarse musical dynamic, derived from a [`NoteEvent::velocity`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dynamic {
    /// Pianissimo.
    Pp,
    /// Piano.
    P,
    /// Mezzo-forte.
    Mf,
    /// Forte.
    F,
    /// Fortissimo.
    Ff,
}

impl Dynamic {
    /// Maps a `[0, 1]` velocity to its coarse dynamic marking.
    pub fn from_velocity(velocity: f32) -> Self {
        if velocity < 0.2 {
            Dynamic::Pp
        } else if velocity < 0.4 {
            Dynamic::P
        } else if velocity < 0.6 {
            Dynamic::Mf
        } else if velocity < 0.8 {
            Dynamic::F
        } else {
            Dynamic::Ff
        }
    }
}

/// A single detected note onset, produced by any detector tier.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number in `[21, 108]`.
    pub midi_pitch: u8,
    /// Canonical `LETTER[#]OCTAVE` name, e.g. `"C4"`.
    pub note_name: String,
    /// Detected fundamental frequency in Hz.
    pub frequency_hz: f32,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Estimated velocity in `[0, 1]`. Monophonic detection reports a fixed fallback.
    pub velocity: f32,
    /// Seconds elapsed since the owning follower's `start()`, monotonically non-decreasing
    /// within one session.
    pub detected_at_sec: f64,
    /// Which tier produced this event.
    pub source_tier: SourceTier,
}

impl NoteEvent {
    /// Builds a `NoteEvent` from a detected MIDI pitch, filling in the derived note name and
    /// frequency from the pitch itself.
    pub fn new(midi_pitch: u8, frequency_hz: f32, confidence: f32, velocity: f32, detected_at_sec: f64, source_tier: SourceTier) -> Self {
        Self {
            midi_pitch,
            note_name: midi_to_note_name(midi_pitch),
            frequency_hz,
            confidence,
            velocity,
            detected_at_sec,
            source_tier,
        }
    }

    /// The coarse dynamic marking for this event's velocity.
    pub fn dynamic(&self) -> Dynamic {
        Dynamic::from_velocity(self.velocity)
    }
}

/// Which hand a group of notes (or a whole exercise load) is assigned to.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    /// Right hand.
    Right,
    /// Left hand.
    Left,
    /// Both hands contribute to the same group.
    Both,
}

/// One chord or single note the student is expected to play at a point in the score.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedGroup {
    /// 0-based position of this group within the exercise.
    pub group_index: usize,
    /// Non-empty set of MIDI pitches that make up this group.
    pub midi_pitches: Vec<u8>,
    /// Expected onset time in seconds, at tempo multiplier 1.0.
    pub expected_time_sec: f64,
    /// Half-width of the on-time window, at tempo multiplier 1.0.
    pub timing_tolerance_sec: f64,
    /// Absolute late cut-off, at tempo multiplier 1.0.
    pub timing_max_sec: f64,
    /// 0-based bar index.
    pub bar_index: usize,
    /// Beat position within the bar, in `[0, beats_per_bar)`.
    pub beat_position: f64,
    /// Which hand(s) contribute to this group.
    pub hand: Hand,
    /// Nominal duration in seconds (visualization only; not used in matching).
    pub duration_sec: f64,
}

impl ExpectedGroup {
    /// Effective expected time after applying a tempo multiplier.
    pub fn effective_expected_time_sec(&self, tempo_multiplier: f64) -> f64 {
        self.expected_time_sec / tempo_multiplier
    }

    /// Effective on-time tolerance after applying a tempo multiplier.
    pub fn effective_timing_tolerance_sec(&self, tempo_multiplier: f64) -> f64 {
        self.timing_tolerance_sec / tempo_multiplier
    }

    /// Effective late cut-off after applying a tempo multiplier.
    pub fn effective_timing_max_sec(&self, tempo_multiplier: f64) -> f64 {
        self.timing_max_sec / tempo_multiplier
    }
}

/// A fully compiled, ready-to-follow musical exercise.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Exercise {
    /// Identifier of the source this exercise was compiled from (e.g. a file name).
    pub source_id: String,
    /// Tempo in beats per minute, at tempo multiplier 1.0.
    pub bpm: f64,
    /// Numerator of the canonical time signature (beats per bar).
    pub beats_per_bar: u32,
    /// The fractional note value of one beat, e.g. `1.5` for a dotted quarter in 6/8.
    pub beat_unit: f64,
    /// Display time signature, e.g. `(6, 8)`.
    pub time_signature: (u8, u8),
    /// The ordered groups that make up the exercise.
    pub groups: Vec<ExpectedGroup>,
}

impl Exercise {
    /// Number of groups in the exercise.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the exercise has no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// How closely a detected pitch matched an expected one.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchMatch {
    /// Same MIDI note number.
    Exact,
    /// Same pitch class, different octave — still accepted as correct.
    Octave,
    /// Did not match any expected pitch in the group.
    Wrong,
}

/// How a matched event's timing compares to its expected time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingClass {
    /// Within the on-time tolerance window.
    OnTime,
    /// Earlier than the tolerance window but not rejected as noise.
    Early,
    /// Later than the tolerance window but within the late cut-off.
    Late,
    /// The group advanced by timeout without this pitch being hit.
    Missed,
}

/// The classification attached to a `group_progress` event.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GroupProgress {
    /// Index of the group that just advanced.
    pub group_index: usize,
    /// Worst timing classification observed among the group's hits.
    pub classification: TimingClass,
    /// Fraction of the group's pitches that were hit, in `[0, 1]`.
    pub hit_ratio: f64,
    /// Signed timing delta in seconds of the group's final contributing hit.
    pub timing_delta_sec: f64,
}
