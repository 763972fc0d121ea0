//! Universal invariants, round-trip/idempotence properties, and boundary behaviors from spec §8
//! that aren't already covered by a concrete end-to-end scenario in `scenarios.rs`.

mod common;

use common::synthetic_perfect_exercise;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use woodshed::core::event::{Exercise, ExpectedGroup, Hand, NoteEvent, SourceTier};
use woodshed::core::mode::FollowMode;
use woodshed::core::pitch::midi_to_frequency_hz;
use woodshed::score::follower::{FollowerEvent, ScoreFollower};

fn note(midi_pitch: u8, detected_at_sec: f64) -> NoteEvent {
    NoteEvent::new(midi_pitch, midi_to_frequency_hz(midi_pitch), 0.9, 0.7, detected_at_sec, SourceTier::Monophonic)
}

/// Property 1: emitted `group_progress` events have strictly increasing `group_index` and
/// non-decreasing `detected_at_sec`.
#[test]
fn group_progress_events_have_strictly_increasing_group_index() {
    let exercise = synthetic_perfect_exercise(40);
    let mut follower = ScoreFollower::new(exercise.clone(), FollowMode::Standard);
    follower.start(0.0).unwrap();

    let mut last_group_index: Option<usize> = None;
    let mut last_detected_at_sec = f64::MIN;

    for group in &exercise.groups {
        for &pitch in &group.midi_pitches {
            for event in follower.submit(&note(pitch, group.expected_time_sec)).unwrap() {
                if let FollowerEvent::GroupProgress(p) = event {
                    if let Some(prev) = last_group_index {
                        assert!(p.group_index > prev, "group_index must strictly increase, got {} after {prev}", p.group_index);
                    }
                    last_group_index = Some(p.group_index);
                    assert!(group.expected_time_sec >= last_detected_at_sec);
                    last_detected_at_sec = group.expected_time_sec;
                }
            }
        }
    }
}

/// Property 2: the sum of `expected_time_sec` deltas between consecutive groups at multiplier
/// `m` equals the sum at `m=1.0` scaled by `1/m`, within 1e-6.
#[test]
fn tempo_rescale_preserves_delta_sum_ratio() {
    let exercise = synthetic_perfect_exercise(50);

    let deltas_at_1: Vec<f64> = exercise.groups.windows(2).map(|pair| pair[1].expected_time_sec - pair[0].expected_time_sec).collect();
    let sum_at_1: f64 = deltas_at_1.iter().sum();

    for &m in &[0.5, 0.7, 0.9, 1.0] {
        let sum_at_m: f64 = exercise
            .groups
            .windows(2)
            .map(|pair| pair[1].effective_expected_time_sec(m) - pair[0].effective_expected_time_sec(m))
            .sum();
        assert!((sum_at_m - sum_at_1 / m).abs() < 1e-6, "multiplier {m}: sum {sum_at_m} vs expected {}", sum_at_1 / m);
    }
}

/// Property 3: the number of `group_progress` events never exceeds `groups_total` before a loop
/// reset (checked here in Standard mode, where there is no reset at all).
#[test]
fn group_progress_count_never_exceeds_groups_total_without_loop() {
    let exercise = synthetic_perfect_exercise(30);
    let groups_total = exercise.len();
    let mut follower = ScoreFollower::new(exercise.clone(), FollowMode::Standard);
    follower.start(0.0).unwrap();

    let mut group_progress_count = 0usize;
    for group in &exercise.groups {
        for &pitch in &group.midi_pitches {
            for event in follower.submit(&note(pitch, group.expected_time_sec)).unwrap() {
                if matches!(event, FollowerEvent::GroupProgress(_)) {
                    group_progress_count += 1;
                    assert!(group_progress_count <= groups_total);
                }
            }
        }
    }
    assert_eq!(group_progress_count, groups_total);
}

fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    TrackEvent { delta: u28::new(delta), kind: TrackEventKind::Midi { channel: u4::new(0), message: MidiMessage::NoteOn { key: u7::new(key), vel: u7::new(vel) } } }
}

fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent { delta: u28::new(delta), kind: TrackEventKind::Midi { channel: u4::new(0), message: MidiMessage::NoteOff { key: u7::new(key), vel: u7::new(0) } } }
}

/// Builds a Type-1 SMF with the right-hand track at index 0 and the left-hand track at index 1
/// (§4.6's hand-assignment convention), with each hand's notes staggered in time so no group
/// spans both tracks.
fn build_two_hand_smf() -> Vec<u8> {
    let mut right_track: Track = Track::new();
    right_track.push(TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000))) });
    right_track.push(TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)) });
    // Three isolated right-hand notes, one beat (480 ticks) apart.
    right_track.push(note_on(0, 60, 80));
    right_track.push(note_off(240, 60));
    right_track.push(note_on(240, 62, 80));
    right_track.push(note_off(240, 62));
    right_track.push(note_on(240, 64, 80));
    right_track.push(note_off(240, 64));
    right_track.push(TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) });

    let mut left_track: Track = Track::new();
    // Offset by half a beat so no left-hand onset ever lands within 30ms of a right-hand onset.
    left_track.push(note_on(240, 36, 80));
    left_track.push(note_off(240, 36));
    left_track.push(note_on(240, 38, 80));
    left_track.push(note_off(240, 38));
    left_track.push(TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) });

    let smf = Smf { header: Header { format: Format::Parallel, timing: Timing::Metrical(u15::new(480)) }, tracks: vec![right_track, left_track] };
    let mut buffer = Vec::new();
    smf.write(&mut buffer).unwrap();
    buffer
}

/// Property 4: hand filtering is partitioning when no group spans both tracks.
#[test]
fn hand_filtering_partitions_groups_when_hands_never_overlap() {
    use woodshed::score::loader::ScoreLoader;

    let bytes = build_two_hand_smf();
    let both = ScoreLoader::load_from_bytes(&bytes, Hand::Both, "test").unwrap();
    let right = ScoreLoader::load_from_bytes(&bytes, Hand::Right, "test").unwrap();
    let left = ScoreLoader::load_from_bytes(&bytes, Hand::Left, "test").unwrap();

    assert!(right.groups.iter().all(|g| g.hand == Hand::Right));
    assert!(left.groups.iter().all(|g| g.hand == Hand::Left));
    assert_eq!(right.len() + left.len(), both.len());
}

/// Property 6: `set_tempo_multiplier(m)` followed by `set_tempo_multiplier(1.0)` returns every
/// effective timing field to within 1e-6 of its original value.
#[test]
fn tempo_multiplier_round_trip_is_idempotent() {
    let exercise = synthetic_perfect_exercise(20);
    let mut follower = ScoreFollower::new(exercise.clone(), FollowMode::Standard);
    follower.start(0.0).unwrap();

    follower.set_tempo_multiplier(0.6).unwrap();
    follower.set_tempo_multiplier(1.0).unwrap();

    for group in &exercise.groups {
        assert!((group.effective_expected_time_sec(1.0) - group.expected_time_sec).abs() < 1e-6);
        assert!((group.effective_timing_tolerance_sec(1.0) - group.timing_tolerance_sec).abs() < 1e-6);
        assert!((group.effective_timing_max_sec(1.0) - group.timing_max_sec).abs() < 1e-6);
    }
}

fn single_group_exercise(expected_time_sec: f64, tolerance_sec: f64, max_sec: f64) -> Exercise {
    Exercise {
        source_id: "boundary-test".into(),
        bpm: 120.0,
        beats_per_bar: 4,
        beat_unit: 1.0,
        time_signature: (4, 4),
        groups: vec![ExpectedGroup {
            group_index: 0,
            midi_pitches: vec![60],
            expected_time_sec,
            timing_tolerance_sec: tolerance_sec,
            timing_max_sec: max_sec,
            bar_index: 0,
            beat_position: 0.0,
            hand: Hand::Both,
            duration_sec: 0.2,
        }],
    }
}

/// Property 7: a NoteEvent arriving exactly at `expected_time_sec ± timing_tolerance_sec`
/// classifies as `on_time`.
#[test]
fn exact_tolerance_boundary_classifies_on_time() {
    for sign in [-1.0, 1.0] {
        let exercise = single_group_exercise(1.0, 0.1, 0.3);
        let mut follower = ScoreFollower::new(exercise, FollowMode::Standard);
        follower.start(0.0).unwrap();
        let events = follower.submit(&note(60, 1.0 + sign * 0.1)).unwrap();
        assert_eq!(events.len(), 2, "a single-group exercise's only advance also completes it");
        match &events[0] {
            FollowerEvent::GroupProgress(p) => {
                assert_eq!(p.classification, woodshed::core::event::TimingClass::OnTime, "sign {sign} at exactly the tolerance boundary should be on_time")
            }
            other => panic!("expected GroupProgress, got {other:?}"),
        }
    }
}

/// Property 8: a NoteEvent arriving at `expected_time_sec - timing_max_sec - epsilon` is
/// rejected as noise and does not advance the group.
#[test]
fn just_past_the_early_side_of_the_late_cutoff_is_rejected_as_noise() {
    let exercise = single_group_exercise(1.0, 0.1, 0.3);
    let mut follower = ScoreFollower::new(exercise, FollowMode::Standard);
    follower.start(0.0).unwrap();

    let events = follower.submit(&note(60, 1.0 - 0.3 - 1e-6)).unwrap();
    assert!(events.is_empty(), "an event past the early-side cutoff must not advance the group");
    assert_eq!(follower.progress().hit_count, 0);
    assert_eq!(follower.progress().missed_count, 0);
}

/// Property 9: when `|hit_pitches| = ceil(|midi_pitches| * 2/3)`, advance fires exactly once.
#[test]
fn partial_chord_threshold_fires_advance_exactly_once() {
    let exercise = Exercise {
        source_id: "threshold-test".into(),
        bpm: 120.0,
        beats_per_bar: 4,
        beat_unit: 1.0,
        time_signature: (4, 4),
        groups: vec![
            ExpectedGroup {
                group_index: 0,
                // ceil(4 * 2/3) = 3: the third distinct pitch hit should trigger exactly one advance.
                midi_pitches: vec![60, 62, 64, 65],
                expected_time_sec: 1.0,
                timing_tolerance_sec: 0.1,
                timing_max_sec: 0.3,
                bar_index: 0,
                beat_position: 0.0,
                hand: Hand::Both,
                duration_sec: 0.2,
            },
            ExpectedGroup {
                group_index: 1,
                midi_pitches: vec![67],
                expected_time_sec: 2.0,
                timing_tolerance_sec: 0.1,
                timing_max_sec: 0.3,
                bar_index: 0,
                beat_position: 1.0,
                hand: Hand::Both,
                duration_sec: 0.2,
            },
        ],
    };
    let mut follower = ScoreFollower::new(exercise, FollowMode::Standard);
    follower.start(0.0).unwrap();

    assert!(follower.submit(&note(60, 1.0)).unwrap().is_empty());
    assert!(follower.submit(&note(62, 1.0)).unwrap().is_empty());
    let events = follower.submit(&note(64, 1.0)).unwrap();
    assert_eq!(events.len(), 1, "the third of four pitches should cross ceil(4 * 2/3) = 3 and advance exactly once");
    assert!(matches!(events[0], FollowerEvent::GroupProgress(_)));

    // A fourth, redundant pitch for the now-completed group 0 must land against group 1 instead
    // and must not re-trigger a second advance of group 0.
    let events = follower.submit(&note(65, 1.0)).unwrap();
    assert!(events.is_empty(), "group 0 already advanced; its trailing pitch must not re-advance anything");
}
