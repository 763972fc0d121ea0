//! Real-time audio-to-score reconciliation for interactive piano practice.
//!
//! Raw audio comes in through a [`dsp::preprocessor::Preprocessor`], gets pitch-detected by
//! whichever tier the [`detect::router::HybridRouter`] selects, and is matched against a
//! compiled [`core::event::Exercise`] by a [`score::follower::ScoreFollower`], which in turn
//! feeds a [`score::tempo::TempoAdapter`] that nudges the practice tempo up or down. The
//! [`session::Session`] type wires the whole pipeline behind a small control-message protocol.

pub mod core;
pub mod detect;
pub mod dsp;
pub mod error;
pub mod score;
pub mod session;

#[cfg(feature = "polyphonic")]
pub mod ml;

pub use error::{Result, WoodshedError};
