//! The Score Follower (§4.7): the real-time matching state machine that turns a stream of
//! [`NoteEvent`]s into progress against a loaded [`Exercise`].

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::core::event::{Exercise, GroupProgress, NoteEvent, PitchMatch, TimingClass};
use crate::core::mode::FollowMode;
use crate::core::pitch::same_pitch_class;
use crate::error::{Result, WoodshedError};

use super::tempo::{BarStats, TempoAdapter, MAX_TEMPO_MULTIPLIER, MIN_TEMPO_MULTIPLIER};

/// A fraction of a group's pitches hit that triggers the partial-chord advance rule.
const PARTIAL_CHORD_FRACTION: f64 = 2.0 / 3.0;

/// Events the [`ScoreFollower`] may produce from a single [`ScoreFollower::submit`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum FollowerEvent {
    /// A group advanced.
    GroupProgress(GroupProgress),
    /// The Tempo Adapter (or an explicit override) changed the practice tempo.
    TempoChange { bpm: f64, multiplier: f64 },
    /// The exercise finished (the final group advanced, and the mode is not `Loop`).
    ExerciseComplete { loop_count: u32 },
}

/// A snapshot of the follower's counters, returned by [`ScoreFollower::progress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowerProgress {
    pub groups_total: usize,
    pub groups_completed: usize,
    pub hit_count: u32,
    pub wrong_count: u32,
    pub missed_count: u32,
    pub on_time_count: u32,
    pub early_count: u32,
    pub late_count: u32,
    pub mean_abs_timing_delta_sec: f64,
    pub current_bar_index: usize,
    pub current_tempo_bpm: f64,
    pub tempo_multiplier: f64,
    pub loop_count: u32,
}

/// Severity ordering used to pick the "worst" classification reported on a group's advance.
fn severity(classification: TimingClass) -> u8 {
    match classification {
        TimingClass::OnTime => 0,
        TimingClass::Early => 1,
        TimingClass::Late => 2,
        TimingClass::Missed => 3,
    }
}

/// Per-group scratch state, reset at every advance.
struct GroupState {
    hit_pitches: HashSet<u8>,
    worst_classification: TimingClass,
    last_timing_delta_sec: f64,
}

impl GroupState {
    fn new() -> Self {
        Self { hit_pitches: HashSet::new(), worst_classification: TimingClass::OnTime, last_timing_delta_sec: 0.0 }
    }

    fn record_hit(&mut self, pitch_class: u8, classification: TimingClass, delta_sec: f64) {
        self.hit_pitches.insert(pitch_class);
        if severity(classification) > severity(self.worst_classification) {
            self.worst_classification = classification;
        }
        self.last_timing_delta_sec = delta_sec;
    }
}

/// Classifies a candidate MIDI pitch against a group's expected pitch set by pitch class
/// (mod 12), treating octave errors as correct (§4.7.3).
fn classify_pitch(expected: &[u8], candidate: u8) -> PitchMatch {
    if expected.contains(&candidate) {
        PitchMatch::Exact
    } else if expected.iter().any(|&e| same_pitch_class(e, candidate)) {
        PitchMatch::Octave
    } else {
        PitchMatch::Wrong
    }
}

/// Classifies a timing delta against a group's tolerance windows. `None` means "too early,
/// reject as noise" (§4.7.4), the event is outside even the late-side window on the early
/// side and must not be counted.
fn classify_timing(delta_sec: f64, tolerance_sec: f64, max_sec: f64) -> Option<TimingClass> {
    if delta_sec < -max_sec {
        None
    } else if delta_sec.abs() <= tolerance_sec {
        Some(TimingClass::OnTime)
    } else if delta_sec < -tolerance_sec {
        Some(TimingClass::Early)
    } else {
        Some(TimingClass::Late)
    }
}

/// The real-time score-following state machine (§4.7).
pub struct ScoreFollower {
    exercise: Exercise,
    mode: FollowMode,
    active: bool,
    current_group: usize,
    start_monotonic_sec: f64,
    group_state: GroupState,
    bar_stats: BarStats,
    current_bar_index: usize,
    tempo_adapter: TempoAdapter,
    loop_count: u32,

    groups_completed: usize,
    hit_count: u32,
    wrong_count: u32,
    missed_count: u32,
    on_time_count: u32,
    early_count: u32,
    late_count: u32,
    sum_abs_timing_delta_sec: f64,
    timing_event_count: u32,
}

impl ScoreFollower {
    /// Builds a follower over a compiled exercise, in the given follow mode. Not yet active;
    /// call [`ScoreFollower::start`] before submitting events.
    pub fn new(exercise: Exercise, mode: FollowMode) -> Self {
        Self {
            exercise,
            mode,
            active: false,
            current_group: 0,
            start_monotonic_sec: 0.0,
            group_state: GroupState::new(),
            bar_stats: BarStats::default(),
            current_bar_index: 0,
            tempo_adapter: TempoAdapter::new(),
            loop_count: 0,
            groups_completed: 0,
            hit_count: 0,
            wrong_count: 0,
            missed_count: 0,
            on_time_count: 0,
            early_count: 0,
            late_count: 0,
            sum_abs_timing_delta_sec: 0.0,
            timing_event_count: 0,
        }
    }

    /// Starts (or restarts) the follower from group 0. Errors if already active; a session
    /// must be stopped before it can be started again.
    pub fn start(&mut self, start_monotonic_sec: f64) -> Result<()> {
        if self.active {
            return Err(WoodshedError::AlreadyStarted);
        }
        self.active = true;
        self.current_group = 0;
        self.start_monotonic_sec = start_monotonic_sec;
        self.group_state = GroupState::new();
        self.bar_stats = BarStats::default();
        self.current_bar_index = self.exercise.groups.first().map(|g| g.bar_index).unwrap_or(0);
        debug!(groups_total = self.exercise.len(), "follower started");
        Ok(())
    }

    /// Submits one detected note for matching against the current group. Returns zero or more
    /// follower-level events produced as a result (group advances, tempo changes, completion).
    pub fn submit(&mut self, event: &NoteEvent) -> Result<Vec<FollowerEvent>> {
        if !self.active {
            return Err(WoodshedError::NotActive);
        }

        let mut emitted = Vec::new();
        let mut t_rel = event.detected_at_sec - self.start_monotonic_sec;

        // Timeout-driven advances: a single late event can skip over one or more groups whose
        // late cut-off has already passed, e.g. across a rest. Disabled entirely in Wait mode
        // (§4.7, §4.8): the follower waits indefinitely for the pitch-class test to pass.
        if self.mode != FollowMode::Wait {
            while self.active && self.current_group < self.exercise.len() {
                let group = &self.exercise.groups[self.current_group];
                let max_sec = group.effective_timing_max_sec(self.tempo_adapter.multiplier());
                let expected_sec = group.effective_expected_time_sec(self.tempo_adapter.multiplier());
                if t_rel > expected_sec + max_sec {
                    self.advance_group(true, event.detected_at_sec, &mut emitted);
                    t_rel = event.detected_at_sec - self.start_monotonic_sec;
                } else {
                    break;
                }
            }
        }

        if self.active && self.current_group < self.exercise.len() {
            let group = &self.exercise.groups[self.current_group];
            let multiplier = self.tempo_adapter.multiplier();
            let expected_sec = group.effective_expected_time_sec(multiplier);
            let tolerance_sec = group.effective_timing_tolerance_sec(multiplier);
            let max_sec = group.effective_timing_max_sec(multiplier);
            let delta_sec = t_rel - expected_sec;

            let pitch_match = classify_pitch(&group.midi_pitches, event.midi_pitch);

            if pitch_match == PitchMatch::Wrong {
                self.wrong_count += 1;
                trace!(group = self.current_group, midi_pitch = event.midi_pitch, "wrong pitch");
            } else if let Some(timing_class) = classify_timing(delta_sec, tolerance_sec, max_sec) {
                self.hit_count += 1;
                self.timing_event_count += 1;
                self.sum_abs_timing_delta_sec += delta_sec.abs();
                match timing_class {
                    TimingClass::OnTime => self.on_time_count += 1,
                    TimingClass::Early => self.early_count += 1,
                    TimingClass::Late => self.late_count += 1,
                    TimingClass::Missed => unreachable!("classify_timing never returns Missed"),
                }
                self.bar_stats.total_events_in_bar += 1;
                if timing_class == TimingClass::OnTime {
                    self.bar_stats.on_time_hits += 1;
                }
                self.group_state.record_hit(event.midi_pitch % 12, timing_class, delta_sec);

                let threshold = (group.midi_pitches.len() as f64 * PARTIAL_CHORD_FRACTION).ceil() as usize;
                if self.group_state.hit_pitches.len() >= threshold.max(1) {
                    self.advance_group(false, event.detected_at_sec, &mut emitted);
                }
            } else {
                trace!(group = self.current_group, midi_pitch = event.midi_pitch, delta_sec, "event rejected as noise (too early)");
            }
        }

        Ok(emitted)
    }

    /// Advances past the current group, whether by the partial-chord threshold or by timeout,
    /// recording stats, crossing a bar boundary if one was just crossed, and completing the
    /// exercise if this was the final group. `at_sec` is the absolute (session-clock) time of
    /// the triggering event, used to restart the clock on a loop-mode wraparound (§4.7).
    fn advance_group(&mut self, by_timeout: bool, at_sec: f64, emitted: &mut Vec<FollowerEvent>) {
        let group = &self.exercise.groups[self.current_group];
        let hit_ratio = (self.group_state.hit_pitches.len() as f64 / group.midi_pitches.len() as f64).min(1.0);
        self.bar_stats.expected_hits_in_bar += group.midi_pitches.len() as u32;

        let classification = if by_timeout { TimingClass::Missed } else { self.group_state.worst_classification };
        if classification == TimingClass::Missed {
            self.missed_count += 1;
        }

        let progress = GroupProgress {
            group_index: group.group_index,
            classification,
            hit_ratio,
            timing_delta_sec: self.group_state.last_timing_delta_sec,
        };
        debug!(group = progress.group_index, ?classification, hit_ratio, "group advanced");
        emitted.push(FollowerEvent::GroupProgress(progress));

        self.groups_completed += 1;
        let next_bar_index = self.exercise.groups.get(self.current_group + 1).map(|g| g.bar_index);
        let crossed_bar = next_bar_index != Some(self.current_bar_index) || self.current_group + 1 >= self.exercise.len();

        self.current_group += 1;
        self.group_state = GroupState::new();

        if crossed_bar {
            self.cross_bar_boundary(emitted);
        }

        if self.current_group >= self.exercise.len() {
            match self.mode {
                FollowMode::Loop => {
                    self.loop_count += 1;
                    self.current_group = 0;
                    self.current_bar_index = self.exercise.groups.first().map(|g| g.bar_index).unwrap_or(0);
                    // "restart the clock" (§4.7): group 0's expected_time_sec is measured from
                    // a fresh zero, so start_monotonic_sec must move to the wraparound instant.
                    self.start_monotonic_sec = at_sec;
                    debug!(loop_count = self.loop_count, "looped back to group 0");
                }
                FollowMode::Standard | FollowMode::Wait => {
                    self.active = false;
                    emitted.push(FollowerEvent::ExerciseComplete { loop_count: self.loop_count });
                }
            }
        } else if let Some(bar_index) = next_bar_index {
            self.current_bar_index = bar_index;
        }
    }

    /// Evaluates the just-completed bar with the Tempo Adapter, unless in Wait mode (§4.8).
    fn cross_bar_boundary(&mut self, emitted: &mut Vec<FollowerEvent>) {
        let stats = std::mem::take(&mut self.bar_stats);

        if self.mode == FollowMode::Wait {
            return;
        }

        if let Some(new_multiplier) = self.tempo_adapter.evaluate_bar(&stats) {
            self.rescale_for_multiplier(new_multiplier, emitted);
        }
    }

    fn rescale_for_multiplier(&mut self, new_multiplier: f64, emitted: &mut Vec<FollowerEvent>) {
        // ExpectedGroup stores its original values and exposes `effective_*` methods that
        // divide by the current multiplier on read, so no mutation is needed here, the
        // groups are already rescaled the next time they're read.
        let bpm = self.exercise.bpm * new_multiplier;
        warn!(multiplier = new_multiplier, bpm, "tempo adapter changed practice tempo");
        emitted.push(FollowerEvent::TempoChange { bpm, multiplier: new_multiplier });
    }

    /// Overrides the tempo multiplier directly (e.g. a manual slider), emitting a
    /// `tempo_change` event the same way an adapter-driven change would.
    pub fn set_tempo_multiplier(&mut self, multiplier: f64) -> Result<FollowerEvent> {
        if !(MIN_TEMPO_MULTIPLIER..=MAX_TEMPO_MULTIPLIER).contains(&multiplier) {
            return Err(WoodshedError::InvalidTempoMultiplier(multiplier as f32));
        }
        self.tempo_adapter.set_multiplier(multiplier);
        let bpm = self.exercise.bpm * self.tempo_adapter.multiplier();
        Ok(FollowerEvent::TempoChange { bpm, multiplier: self.tempo_adapter.multiplier() })
    }

    /// Gracefully ends the session before natural completion, emitting `exercise_complete`.
    pub fn finish(&mut self) -> Result<FollowerEvent> {
        if !self.active {
            return Err(WoodshedError::NotActive);
        }
        self.active = false;
        Ok(FollowerEvent::ExerciseComplete { loop_count: self.loop_count })
    }

    /// Cancels the session without emitting completion. A stopped follower is not restartable.
    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Whether the follower is currently accepting `submit` calls.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The current group's expected pitch set, for callers that want to pass an expected-pitch
    /// hint into the [`crate::detect::router::HybridRouter`] (§4.5). `None` once the follower
    /// has finished (or before it has started).
    pub fn current_expected_pitches(&self) -> Option<&[u8]> {
        if !self.active {
            return None;
        }
        self.exercise.groups.get(self.current_group).map(|g| g.midi_pitches.as_slice())
    }

    /// A snapshot of the follower's counters.
    pub fn progress(&self) -> FollowerProgress {
        FollowerProgress {
            groups_total: self.exercise.len(),
            groups_completed: self.groups_completed,
            hit_count: self.hit_count,
            wrong_count: self.wrong_count,
            missed_count: self.missed_count,
            on_time_count: self.on_time_count,
            early_count: self.early_count,
            late_count: self.late_count,
            mean_abs_timing_delta_sec: if self.timing_event_count == 0 { 0.0 } else { self.sum_abs_timing_delta_sec / self.timing_event_count as f64 },
            current_bar_index: self.current_bar_index,
            current_tempo_bpm: self.exercise.bpm * self.tempo_adapter.multiplier(),
            tempo_multiplier: self.tempo_adapter.multiplier(),
            loop_count: self.loop_count,
        }
    }
}
