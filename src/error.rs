//! The crate's typed error taxonomy.
//!
//! Every error that can cross a public API boundary is a variant of [`WoodshedError`], so
//! callers can match on kind instead of parsing messages. Transient detection failures (low
//! confidence, silence, an unclassifiable window) are deliberately **not** part of this enum —
//! detectors report those as an absent [`crate::core::event::NoteEvent`], not as an `Err`.

use thiserror::Error;

/// The crate's public result alias.
pub type Result<T> = std::result::Result<T, WoodshedError>;

/// All error kinds the public API can return.
#[derive(Debug, Error)]
pub enum WoodshedError {
    /// The MIDI file could not be parsed.
    #[error("malformed MIDI file: {0}")]
    MalformedMidi(String),

    /// The MIDI file uses a format this loader does not support (e.g. Type 2).
    #[error("unsupported MIDI format: {0}")]
    UnsupportedFormat(String),

    /// A requested resample ratio falls outside the supported range, or a detector received
    /// audio at a sample rate it cannot consume directly.
    #[error("sample rate mismatch: {0}")]
    SampleRateMismatch(String),

    /// The Tier 3 polyphonic transcription model could not be loaded or is not configured.
    #[error("polyphonic transcription model unavailable: {0}")]
    ModelUnavailable(String),

    /// The named exercise does not exist.
    #[error("exercise not found: {0}")]
    ExerciseNotFound(String),

    /// An operation was attempted on a follower that has not been started, or has already
    /// finished.
    #[error("follower is not active")]
    NotActive,

    /// `start()` was called on a follower that is already active.
    #[error("follower has already been started")]
    AlreadyStarted,

    /// A tempo multiplier outside `[0.5, 1.0]` was requested.
    #[error("invalid tempo multiplier {0}: must lie within [0.5, 1.0]")]
    InvalidTempoMultiplier(f32),

    /// An internal invariant was violated (e.g. non-monotonic event timestamps). Fatal for
    /// the session that produced it.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// Wraps lower-level I/O failures (reading a MIDI file from disk, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
