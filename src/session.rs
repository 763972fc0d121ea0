//! The transport-agnostic control surface (§6): ties the [`Preprocessor`], [`HybridRouter`],
//! and [`ScoreFollower`] together behind a small message-in/message-out protocol.
//!
//! Nothing here assumes a transport (websocket, local function call, whatever); a host wraps
//! [`Session::handle`] however it likes.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::core::event::{Dynamic, Exercise, Hand, NoteEvent, SourceTier};
use crate::core::mode::{DetectionMode, FollowMode};
use crate::detect::router::HybridRouter;
use crate::dsp::preprocessor::Preprocessor;
use crate::error::{Result, WoodshedError};
use crate::score::follower::{FollowerEvent, FollowerProgress, ScoreFollower};

/// An in-memory catalog of compiled exercises, keyed by `source_id`.
///
/// Compiling MIDI into an [`Exercise`] is the [`crate::score::loader::ScoreLoader`]'s job; the
/// catalog only holds the result, so it has no dependency on the `midi` feature.
#[derive(Debug, Clone, Default)]
pub struct ExerciseCatalog {
    exercises: HashMap<String, Exercise>,
}

impl ExerciseCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self { exercises: HashMap::new() }
    }

    /// Registers a compiled exercise, keyed by its own `source_id`.
    pub fn register(&mut self, exercise: Exercise) {
        self.exercises.insert(exercise.source_id.clone(), exercise);
    }

    /// Looks up a registered exercise, cloning it for exclusive ownership by a new session.
    pub fn get(&self, exercise_id: &str) -> Result<Exercise> {
        self.exercises.get(exercise_id).cloned().ok_or_else(|| WoodshedError::ExerciseNotFound(exercise_id.to_string()))
    }
}

/// Construction parameters for one practice session, validated once at `start_exercise` time
/// rather than threaded through as loose arguments.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Which hand's notes the loaded exercise should be filtered to.
    pub hands: Hand,
    /// Which detector tier the [`HybridRouter`] should prefer.
    pub mode: DetectionMode,
    /// How the follower should behave at the end of the exercise and on a group timeout.
    pub follow_mode: FollowMode,
    /// Whether the host should sound a metronome alongside playback. The core does not render
    /// audio itself (§1 non-goals); this flag is carried through to `exercise_started` purely
    /// so a host's metronome renderer can pick it up.
    pub metronome_enabled: bool,
}

impl SessionConfig {
    /// Builds a config with metronome disabled and `FollowMode::Standard`.
    pub fn new(hands: Hand, mode: DetectionMode) -> Self {
        Self { hands, mode, follow_mode: FollowMode::Standard, metronome_enabled: false }
    }

    /// Sets the follow mode.
    pub fn with_follow_mode(mut self, follow_mode: FollowMode) -> Self {
        self.follow_mode = follow_mode;
        self
    }

    /// Enables or disables the metronome flag.
    pub fn with_metronome_enabled(mut self, metronome_enabled: bool) -> Self {
        self.metronome_enabled = metronome_enabled;
        self
    }
}

/// Control messages a host sends into a [`Session`] (§6).
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Loads an exercise and prepares the follower. The follower itself does not start until
    /// [`ControlMessage::CountInComplete`] arrives.
    StartExercise { exercise_id: String, config: SessionConfig },
    /// Sent after the client's local count-in; triggers `ScoreFollower::start`.
    CountInComplete,
    /// One chunk of raw audio to run through the pipeline.
    AudioChunk { samples: Vec<f32>, sample_rate_hz: f32 },
    /// A manual tempo override.
    SetTempoMultiplier { value: f64 },
    /// Ends the session without waiting for natural completion.
    StopExercise,
}

/// Progress messages a [`Session`] emits in response to a [`ControlMessage`] (§6).
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    /// Reply to `start_exercise`: the compiled score's headline metadata.
    ExerciseStarted { total_groups: usize, bpm: f64, beats_per_bar: u32, beat_unit: f64, time_signature: (u8, u8) },
    /// Reply to `count_in_complete`: the follower's clock is now running.
    TimingStarted,
    /// One accepted [`NoteEvent`], translated into wire-friendly fields.
    NoteDetected {
        midi_pitch: u8,
        note_name: String,
        frequency_hz: f32,
        confidence: f32,
        velocity: f32,
        dynamic: Dynamic,
        hand: Hand,
        source_tier: SourceTier,
        detected_at_sec: f64,
    },
    /// A group advanced.
    GroupProgress { group_index: usize, classification: crate::core::event::TimingClass, hit_ratio: f64, timing_delta_sec: f64 },
    /// The practice tempo changed, whether adapter-driven or a manual override.
    TempoChange { bpm: f64, tempo_multiplier: f64 },
    /// The exercise finished; carries the follower's final counters.
    ExerciseComplete { counters: FollowerProgress },
}

/// One practice session: a loaded exercise, a detector pipeline, and a follower, addressed
/// entirely through [`ControlMessage`]/[`ProgressMessage`] (§6).
pub struct Session {
    catalog: ExerciseCatalog,
    preprocessor: Preprocessor,
    router: HybridRouter,
    follower: Option<ScoreFollower>,
    hands: Hand,
    last_mode: DetectionMode,
    metronome_enabled: bool,
    elapsed_since_start_sec: f64,
    input_sample_rate_hz: f32,
    session_id: String,
}

impl Session {
    /// Builds a session around a fixed audio pipeline. `input_sample_rate_hz` is the rate every
    /// subsequent `audio_chunk` must be provided at (§6: "mid-stream changes are not
    /// supported"). `session_id` is an opaque host-assigned identifier carried into every
    /// tracing event so a host can correlate this session's log lines across its own sinks; the
    /// core never inspects or generates it.
    pub fn new(catalog: ExerciseCatalog, router: HybridRouter, preprocessor: Preprocessor, input_sample_rate_hz: f32, session_id: impl Into<String>) -> Self {
        Self {
            catalog,
            preprocessor,
            router,
            follower: None,
            hands: Hand::Both,
            last_mode: DetectionMode::default(),
            metronome_enabled: false,
            elapsed_since_start_sec: 0.0,
            input_sample_rate_hz,
            session_id: session_id.into(),
        }
    }

    /// Dispatches one control message, returning zero or more progress messages.
    pub fn handle(&mut self, message: ControlMessage) -> Result<Vec<ProgressMessage>> {
        match message {
            ControlMessage::StartExercise { exercise_id, config } => self.start_exercise(&exercise_id, config).map(|m| vec![m]),
            ControlMessage::CountInComplete => self.count_in_complete().map(|m| vec![m]),
            ControlMessage::AudioChunk { samples, sample_rate_hz } => self.audio_chunk(&samples, sample_rate_hz),
            ControlMessage::SetTempoMultiplier { value } => self.set_tempo_multiplier(value).map(|m| vec![m]),
            ControlMessage::StopExercise => {
                self.stop_exercise();
                Ok(Vec::new())
            }
        }
    }

    fn start_exercise(&mut self, exercise_id: &str, config: SessionConfig) -> Result<ProgressMessage> {
        let exercise = self.catalog.get(exercise_id)?;
        self.hands = config.hands;
        self.metronome_enabled = config.metronome_enabled;
        self.last_mode = config.mode;
        self.elapsed_since_start_sec = 0.0;

        let reply = ProgressMessage::ExerciseStarted {
            total_groups: exercise.len(),
            bpm: exercise.bpm,
            beats_per_bar: exercise.beats_per_bar,
            beat_unit: exercise.beat_unit,
            time_signature: exercise.time_signature,
        };

        info!(
            session_id = self.session_id,
            exercise_id,
            total_groups = exercise.len(),
            mode = ?config.mode,
            follow_mode = ?config.follow_mode,
            metronome_enabled = self.metronome_enabled,
            "exercise loaded"
        );
        self.follower = Some(ScoreFollower::new(exercise, config.follow_mode));
        Ok(reply)
    }

    fn count_in_complete(&mut self) -> Result<ProgressMessage> {
        let follower = self.follower.as_mut().ok_or(WoodshedError::NotActive)?;
        follower.start(0.0)?;
        self.elapsed_since_start_sec = 0.0;
        debug!(session_id = self.session_id, "count-in complete, follower clock started");
        Ok(ProgressMessage::TimingStarted)
    }

    fn audio_chunk(&mut self, samples: &[f32], sample_rate_hz: f32) -> Result<Vec<ProgressMessage>> {
        if (sample_rate_hz - self.input_sample_rate_hz).abs() > f32::EPSILON {
            return Err(WoodshedError::SampleRateMismatch(format!(
                "session configured for {} Hz, got a chunk at {} Hz",
                self.input_sample_rate_hz, sample_rate_hz
            )));
        }

        let follower = self.follower.as_mut().ok_or(WoodshedError::NotActive)?;
        if !follower.is_active() {
            return Err(WoodshedError::NotActive);
        }

        let chunk_duration_sec = samples.len() as f64 / sample_rate_hz as f64;
        let mut messages = Vec::new();

        if let Some(frame) = self.preprocessor.process(samples)? {
            let expected = follower.current_expected_pitches().map(|p| p.to_vec());
            let events = self.router.detect(&frame.samples, self.elapsed_since_start_sec, self.last_mode, expected.as_deref())?;

            for event in events {
                messages.push(Self::note_detected_message(&event, self.hands));

                for follower_event in follower.submit(&event)? {
                    messages.push(Self::translate_follower_event(follower_event, follower));
                }
            }
        }

        self.elapsed_since_start_sec += chunk_duration_sec;
        Ok(messages)
    }

    fn set_tempo_multiplier(&mut self, value: f64) -> Result<ProgressMessage> {
        let follower = self.follower.as_mut().ok_or(WoodshedError::NotActive)?;
        let event = follower.set_tempo_multiplier(value)?;
        Ok(Self::translate_follower_event(event, follower))
    }

    fn stop_exercise(&mut self) {
        if let Some(follower) = self.follower.as_mut() {
            follower.stop();
        }
        self.follower = None;
        debug!(session_id = self.session_id, "exercise stopped");
    }

    fn note_detected_message(event: &NoteEvent, hand: Hand) -> ProgressMessage {
        ProgressMessage::NoteDetected {
            midi_pitch: event.midi_pitch,
            note_name: event.note_name.clone(),
            frequency_hz: event.frequency_hz,
            confidence: event.confidence,
            velocity: event.velocity,
            dynamic: event.dynamic(),
            hand,
            source_tier: event.source_tier,
            detected_at_sec: event.detected_at_sec,
        }
    }

    fn translate_follower_event(event: FollowerEvent, follower: &ScoreFollower) -> ProgressMessage {
        match event {
            FollowerEvent::GroupProgress(progress) => ProgressMessage::GroupProgress {
                group_index: progress.group_index,
                classification: progress.classification,
                hit_ratio: progress.hit_ratio,
                timing_delta_sec: progress.timing_delta_sec,
            },
            FollowerEvent::TempoChange { bpm, multiplier } => ProgressMessage::TempoChange { bpm, tempo_multiplier: multiplier },
            FollowerEvent::ExerciseComplete { .. } => ProgressMessage::ExerciseComplete { counters: follower.progress() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::ExpectedGroup;
    use pretty_assertions::assert_eq;

    const SAMPLE_RATE_HZ: f32 = 44_100.0;

    fn one_group_exercise() -> Exercise {
        Exercise {
            source_id: "fixture".into(),
            bpm: 120.0,
            beats_per_bar: 4,
            beat_unit: 1.0,
            time_signature: (4, 4),
            groups: vec![ExpectedGroup {
                group_index: 0,
                midi_pitches: vec![60],
                expected_time_sec: 0.0,
                timing_tolerance_sec: 0.5,
                timing_max_sec: 1.0,
                bar_index: 0,
                beat_position: 0.0,
                hand: Hand::Right,
                duration_sec: 0.3,
            }],
        }
    }

    fn session_with_fixture() -> Session {
        let mut catalog = ExerciseCatalog::new();
        catalog.register(one_group_exercise());
        let router = HybridRouter::new(SAMPLE_RATE_HZ);
        let preprocessor = Preprocessor::new(SAMPLE_RATE_HZ as u32, SAMPLE_RATE_HZ as u32).unwrap();
        Session::new(catalog, router, preprocessor, SAMPLE_RATE_HZ, "test-session")
    }

    fn sine_chunk(frequency_hz: f32, n: usize) -> Vec<f32> {
        (0..n).map(|i| (2.0 * std::f32::consts::PI * frequency_hz * i as f32 / SAMPLE_RATE_HZ).sin()).collect()
    }

    #[test]
    fn test_unknown_exercise_id_is_exercise_not_found() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Both, DetectionMode::Monophonic);
        let result = session.handle(ControlMessage::StartExercise { exercise_id: "does-not-exist".into(), config });
        assert!(matches!(result, Err(WoodshedError::ExerciseNotFound(_))));
    }

    #[test]
    fn test_start_exercise_replies_with_headline_metadata() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Right, DetectionMode::Monophonic);
        let messages = session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();

        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ProgressMessage::ExerciseStarted { total_groups, bpm, .. } => {
                assert_eq!(*total_groups, 1);
                assert!((bpm - 120.0).abs() < 1e-9);
            }
            other => panic!("expected ExerciseStarted, got {other:?}"),
        }
    }

    #[test]
    fn test_audio_chunk_before_count_in_is_not_active() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Both, DetectionMode::Monophonic);
        session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();

        let result = session.handle(ControlMessage::AudioChunk { samples: vec![0.0; 2048], sample_rate_hz: SAMPLE_RATE_HZ });
        assert!(matches!(result, Err(WoodshedError::NotActive)));
    }

    #[test]
    fn test_audio_chunk_at_mismatched_sample_rate_is_rejected() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Both, DetectionMode::Monophonic);
        session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();
        session.handle(ControlMessage::CountInComplete).unwrap();

        let result = session.handle(ControlMessage::AudioChunk { samples: vec![0.0; 2048], sample_rate_hz: 16_000.0 });
        assert!(matches!(result, Err(WoodshedError::SampleRateMismatch(_))));
    }

    #[test]
    fn test_count_in_then_matching_audio_chunk_advances_the_exercise() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Right, DetectionMode::Monophonic);
        session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();

        let started = session.handle(ControlMessage::CountInComplete).unwrap();
        assert_eq!(started, vec![ProgressMessage::TimingStarted]);

        let chunk = sine_chunk(crate::core::pitch::midi_to_frequency_hz(60), 3072);
        let messages = session.handle(ControlMessage::AudioChunk { samples: chunk, sample_rate_hz: SAMPLE_RATE_HZ }).unwrap();

        assert!(messages.iter().any(|m| matches!(m, ProgressMessage::NoteDetected { midi_pitch: 60, .. })));
        assert!(messages.iter().any(|m| matches!(m, ProgressMessage::GroupProgress { group_index: 0, .. })));
        assert!(messages.iter().any(|m| matches!(m, ProgressMessage::ExerciseComplete { .. })));
    }

    #[test]
    fn test_silent_audio_chunk_produces_no_messages() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Right, DetectionMode::Monophonic);
        session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();
        session.handle(ControlMessage::CountInComplete).unwrap();

        let messages = session.handle(ControlMessage::AudioChunk { samples: vec![0.0; 3072], sample_rate_hz: SAMPLE_RATE_HZ }).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_set_tempo_multiplier_emits_tempo_change() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Both, DetectionMode::Monophonic);
        session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();
        session.handle(ControlMessage::CountInComplete).unwrap();

        let messages = session.handle(ControlMessage::SetTempoMultiplier { value: 0.8 }).unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ProgressMessage::TempoChange { tempo_multiplier, .. } => assert!((tempo_multiplier - 0.8).abs() < 1e-9),
            other => panic!("expected TempoChange, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_exercise_then_count_in_is_not_active() {
        let mut session = session_with_fixture();
        let config = SessionConfig::new(Hand::Both, DetectionMode::Monophonic);
        session.handle(ControlMessage::StartExercise { exercise_id: "fixture".into(), config }).unwrap();
        session.handle(ControlMessage::StopExercise).unwrap();

        let result = session.handle(ControlMessage::CountInComplete);
        assert!(matches!(result, Err(WoodshedError::NotActive)));
    }
}
