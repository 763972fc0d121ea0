//! The Score Loader (§4.6): compiles a Standard MIDI file into an [`Exercise`].

use std::path::Path;

use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::warn;

use crate::core::event::{Exercise, ExpectedGroup, Hand};
use crate::core::pitch::clip_to_piano_range;
use crate::error::{Result, WoodshedError};

/// Onset times within this many seconds of each other belong to the same [`ExpectedGroup`].
const GROUP_WINDOW_SEC: f64 = 0.030;
/// Half-width of the on-time window as a fraction of one beat.
const TIMING_TOLERANCE_BEAT_FRACTION: f64 = 0.200;
/// Absolute late cut-off as a fraction of one beat.
const TIMING_MAX_BEAT_FRACTION: f64 = 0.400;
/// Fallback tempo when a MIDI file carries no `set_tempo` meta event (120 BPM).
const DEFAULT_MICROSECONDS_PER_QUARTER: u32 = 500_000;
/// A group's `duration_sec` must be positive even when no matching note-off was found.
const MIN_GROUP_DURATION_SEC: f64 = 0.05;

/// A single note onset extracted from one track, in absolute seconds.
#[derive(Debug, Clone, Copy)]
struct RawNote {
    track_index: usize,
    midi_pitch: u8,
    onset_sec: f64,
    duration_sec: f64,
}

/// Compiles MIDI files into [`Exercise`]s.
pub struct ScoreLoader;

impl ScoreLoader {
    /// Loads and compiles a MIDI file from disk.
    pub fn load_from_path(path: impl AsRef<Path>, hands: Hand, source_id: impl Into<String>) -> Result<Exercise> {
        let bytes = std::fs::read(path)?;
        Self::load_from_bytes(&bytes, hands, source_id)
    }

    /// Compiles an in-memory MIDI file (Type 0 or 1) into an [`Exercise`], filtering
    /// contributing notes by `hands` before grouping (§4.6).
    pub fn load_from_bytes(bytes: &[u8], hands: Hand, source_id: impl Into<String>) -> Result<Exercise> {
        let smf = Smf::parse(bytes).map_err(|e| WoodshedError::MalformedMidi(e.to_string()))?;

        if matches!(smf.header.format, Format::Sequential) {
            return Err(WoodshedError::UnsupportedFormat("Type 2 (sequential/asynchronous) MIDI is not supported".into()));
        }

        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int() as u32,
            Timing::Timecode(_, _) => {
                return Err(WoodshedError::UnsupportedFormat("SMPTE timecode-based MIDI timing is not supported".into()));
            }
        };
        if ticks_per_beat == 0 {
            return Err(WoodshedError::MalformedMidi("ticks-per-beat must be nonzero".into()));
        }

        let tempo_map = Self::build_tempo_map(&smf);
        let (numerator, denominator) = Self::resolve_time_signature(&smf);

        let beats_per_bar = numerator as u32;
        let beat_unit = 4.0 / denominator as f64;

        let tick_to_sec = |tick: u64| Self::tick_to_seconds(tick, ticks_per_beat, &tempo_map);

        let raw_notes = Self::extract_notes(&smf, tick_to_sec, hands);

        let groups = Self::group_notes(raw_notes, beats_per_bar, beat_unit);

        let bpm = 60_000_000.0 / tempo_map.first().map(|&(_, us)| us as f64).unwrap_or(DEFAULT_MICROSECONDS_PER_QUARTER as f64);

        Ok(Exercise {
            source_id: source_id.into(),
            bpm,
            beats_per_bar,
            beat_unit,
            time_signature: (numerator, denominator),
            groups,
        })
    }

    /// Builds a sorted `(absolute_tick, microseconds_per_quarter)` tempo map from every
    /// `set_tempo` meta event in the file, across all tracks.
    fn build_tempo_map(smf: &Smf) -> Vec<(u64, u32)> {
        let mut tempo_map = Vec::new();

        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_qn)) = event.kind {
                    tempo_map.push((tick, us_per_qn.as_int()));
                }
            }
        }

        if tempo_map.is_empty() {
            tempo_map.push((0, DEFAULT_MICROSECONDS_PER_QUARTER));
        }

        tempo_map.sort_by_key(|&(tick, _)| tick);
        tempo_map
    }

    /// Resolves the exercise's canonical time signature: when multiple `time_signature` meta
    /// events are present, the last one (by absolute tick across all tracks) wins (§4.6).
    fn resolve_time_signature(smf: &Smf) -> (u8, u8) {
        let mut best: Option<(u64, u8, u8)> = None;

        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, denominator_pow2, _, _)) = event.kind {
                    let denominator = 1u8 << denominator_pow2;
                    if best.map(|(best_tick, _, _)| tick >= best_tick).unwrap_or(true) {
                        best = Some((tick, numerator, denominator));
                    }
                }
            }
        }

        best.map(|(_, n, d)| (n, d)).unwrap_or((4, 4))
    }

    /// Converts an absolute tick position to seconds, honoring every tempo change up to that
    /// tick.
    fn tick_to_seconds(tick: u64, ticks_per_beat: u32, tempo_map: &[(u64, u32)]) -> f64 {
        let mut seconds = 0.0f64;
        let mut last_tick = 0u64;
        let mut current_us_per_qn = tempo_map.first().map(|&(_, us)| us).unwrap_or(DEFAULT_MICROSECONDS_PER_QUARTER);

        for &(change_tick, us_per_qn) in tempo_map {
            if change_tick >= tick {
                break;
            }
            let delta_ticks = change_tick - last_tick;
            seconds += delta_ticks as f64 * current_us_per_qn as f64 / 1_000_000.0 / ticks_per_beat as f64;
            last_tick = change_tick;
            current_us_per_qn = us_per_qn;
        }

        let delta_ticks = tick - last_tick;
        seconds += delta_ticks as f64 * current_us_per_qn as f64 / 1_000_000.0 / ticks_per_beat as f64;
        seconds
    }

    /// Parses each track independently (no pre-merge, preserving `track_index` per §4.6),
    /// converts ticks to seconds, clips out-of-range pitches, and applies the hands filter.
    fn extract_notes(smf: &Smf, tick_to_sec: impl Fn(u64) -> f64, hands: Hand) -> Vec<RawNote> {
        let mut notes = Vec::new();

        for (track_index, track) in smf.tracks.iter().enumerate() {
            if !Self::track_passes_hands_filter(track_index, hands) {
                continue;
            }

            let mut tick = 0u64;
            // (midi_pitch) -> onset tick, for pairing note_off.
            let mut active: Vec<(u8, u64)> = Vec::new();

            for event in track {
                tick += event.delta.as_int() as u64;

                if let TrackEventKind::Midi { message, .. } = event.kind {
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            let (pitch, clipped) = clip_to_piano_range(key.as_int() as i32);
                            if clipped {
                                warn!(track = track_index, tick, original = key.as_int(), clipped = pitch, "midi pitch out of piano range, clipped");
                            }
                            active.push((pitch, tick));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let (pitch, _) = clip_to_piano_range(key.as_int() as i32);
                            if let Some(pos) = active.iter().position(|&(p, _)| p == pitch) {
                                let (_, onset_tick) = active.remove(pos);
                                let onset_sec = tick_to_sec(onset_tick);
                                let duration_sec = (tick_to_sec(tick) - onset_sec).max(MIN_GROUP_DURATION_SEC);
                                notes.push(RawNote { track_index, midi_pitch: pitch, onset_sec, duration_sec });
                            }
                        }
                        _ => {}
                    }
                }
            }

            // Any notes left active at end-of-track never got a note-off; give them a default
            // visualization duration rather than dropping them.
            for (pitch, onset_tick) in active {
                notes.push(RawNote {
                    track_index,
                    midi_pitch: pitch,
                    onset_sec: tick_to_sec(onset_tick),
                    duration_sec: MIN_GROUP_DURATION_SEC,
                });
            }
        }

        notes.sort_by(|a, b| a.onset_sec.partial_cmp(&b.onset_sec).unwrap_or(std::cmp::Ordering::Equal));
        notes
    }

    fn track_passes_hands_filter(track_index: usize, hands: Hand) -> bool {
        match hands {
            Hand::Both => true,
            Hand::Right => track_index == 0,
            Hand::Left => track_index == 1,
        }
    }

    /// Clusters onset-adjacent notes (within [`GROUP_WINDOW_SEC`] of the group's anchor) into
    /// [`ExpectedGroup`]s.
    fn group_notes(notes: Vec<RawNote>, beats_per_bar: u32, beat_unit: f64) -> Vec<ExpectedGroup> {
        let mut groups = Vec::new();
        let mut current: Vec<RawNote> = Vec::new();
        let mut anchor_sec = 0.0f64;

        for note in notes {
            if current.is_empty() || (note.onset_sec - anchor_sec) <= GROUP_WINDOW_SEC {
                if current.is_empty() {
                    anchor_sec = note.onset_sec;
                }
                current.push(note);
            } else {
                groups.push(Self::finish_group(groups.len(), &current, beats_per_bar, beat_unit));
                anchor_sec = note.onset_sec;
                current = vec![note];
            }
        }
        if !current.is_empty() {
            groups.push(Self::finish_group(groups.len(), &current, beats_per_bar, beat_unit));
        }

        groups
    }

    fn finish_group(group_index: usize, notes: &[RawNote], beats_per_bar: u32, beat_unit: f64) -> ExpectedGroup {
        let expected_time_sec = notes.iter().map(|n| n.onset_sec).fold(f64::MAX, f64::min);

        let mut midi_pitches: Vec<u8> = notes.iter().map(|n| n.midi_pitch).collect();
        midi_pitches.sort_unstable();
        midi_pitches.dedup();

        let all_track0 = notes.iter().all(|n| n.track_index == 0);
        let all_track1 = notes.iter().all(|n| n.track_index == 1);
        let hand = if all_track0 {
            Hand::Right
        } else if all_track1 {
            Hand::Left
        } else {
            Hand::Both
        };

        let duration_sec = notes.iter().map(|n| n.duration_sec).fold(0.0f64, f64::max).max(MIN_GROUP_DURATION_SEC);

        let total_beats = expected_time_sec / beat_unit;
        let bar_index = (total_beats / beats_per_bar as f64).floor() as usize;
        let beat_position = total_beats.rem_euclid(beats_per_bar as f64);

        ExpectedGroup {
            group_index,
            midi_pitches,
            expected_time_sec,
            timing_tolerance_sec: TIMING_TOLERANCE_BEAT_FRACTION * beat_unit,
            timing_max_sec: TIMING_MAX_BEAT_FRACTION * beat_unit,
            bar_index,
            beat_position,
            hand,
            duration_sec,
        }
    }
}
