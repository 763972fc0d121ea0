//! Mode enums shared by the router, the follower, and the session control surface.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which detector tier a caller wants the [`crate::detect::router::HybridRouter`] to prefer.
///
/// This is the `mode` field of `start_exercise` (§6) and the input to tier selection (§4.5).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetectionMode {
    /// Prefer Tier 1 (YIN). The default: most practice exercises are single-line melodies.
    #[default]
    Monophonic,
    /// Prefer Tier 3 (ML transcription).
    Polyphonic,
    /// Let the router pick Tier 1, 2, or 3 based on the expected-pitch hint (§4.5).
    Auto,
}

/// How the [`crate::score::follower::ScoreFollower`] behaves at the end of an exercise, and
/// how it treats a group that times out.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FollowMode {
    /// Advance on timeout, stop after the final group (§4.7 default behavior).
    #[default]
    Standard,
    /// Like [`FollowMode::Standard`], but restarts from group 0 after the final group
    /// advances, incrementing a loop counter.
    Loop,
    /// Never advance a group by timeout; wait indefinitely for the pitch-class test to pass.
    /// Disables the Tempo Adapter for the duration of the exercise (§4.8).
    Wait,
}
