//! The score model: loading a MIDI file into an [`crate::core::event::Exercise`] (§4.6),
//! following it in real time (§4.7), and adapting tempo to the player (§4.8).

pub mod follower;
pub mod tempo;

#[cfg(feature = "midi")]
pub mod loader;
