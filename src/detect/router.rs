//! The Hybrid Router (§4.5): a stateless tier selector sitting in front of the three detector
//! tiers.
//!
//! The router never buffers audio across calls; each [`HybridRouter::detect`] invocation is
//! self-contained. Detector state (the YIN instance, an optional shared Tier 3 model handle)
//! lives on the router, but no per-request bookkeeping survives between calls.

#[cfg(feature = "polyphonic")]
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::event::{NoteEvent, SourceTier};
use crate::core::mode::DetectionMode;
use crate::detect::verification;
use crate::detect::yin::Yin;
use crate::error::{Result, WoodshedError};

#[cfg(feature = "polyphonic")]
use crate::ml::tier3::PolyphonicDetector;

/// Which tier a particular request resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectedTier {
    /// Tier 1 (YIN), monophonic.
    Monophonic,
    /// Tier 2, spectral verification against a known expected set.
    Verification,
    /// Tier 3, ML polyphonic transcription.
    Polyphonic,
}

/// Selects and invokes a detector tier per request, per the decision table in §4.5.
pub struct HybridRouter {
    yin: Yin,
    sample_rate_hz: f32,
    #[cfg(feature = "polyphonic")]
    polyphonic: Option<Arc<PolyphonicDetector>>,
}

impl HybridRouter {
    /// Builds a router over the given analysis sample rate. Tier 3 is unavailable until
    /// [`HybridRouter::with_polyphonic_model`] attaches a loaded model handle.
    pub fn new(sample_rate_hz: f32) -> Self {
        Self {
            yin: Yin::new(sample_rate_hz),
            sample_rate_hz,
            #[cfg(feature = "polyphonic")]
            polyphonic: None,
        }
    }

    /// Attaches a process-global Tier 3 model handle, shared read-only across sessions (§5).
    #[cfg(feature = "polyphonic")]
    pub fn with_polyphonic_model(mut self, model: Arc<PolyphonicDetector>) -> Self {
        self.polyphonic = Some(model);
        self
    }

    /// Resolves which tier a request of this shape would use, without running it.
    pub fn select_tier(&self, mode: DetectionMode, expected: Option<&[u8]>) -> SelectedTier {
        let expected_len = expected.map(|e| e.len()).unwrap_or(0);

        match mode {
            DetectionMode::Monophonic => SelectedTier::Monophonic,
            DetectionMode::Auto if expected_len == 1 => SelectedTier::Monophonic,
            DetectionMode::Auto if expected_len >= 2 => SelectedTier::Verification,
            DetectionMode::Polyphonic if expected_len == 1 => SelectedTier::Monophonic,
            _ => SelectedTier::Polyphonic,
        }
    }

    /// Whether a request of this shape is eligible to fall back to Tier 1 if Tier 3 is
    /// unavailable (§7's resource-error recovery policy).
    fn monophonic_eligible(mode: DetectionMode, expected: Option<&[u8]>) -> bool {
        // No expected set at all means the caller has no multi-note hint to lose by falling
        // back, so it counts as eligible; an expected set of two or more pitches does not,
        // since a monophonic detector can only ever confirm one of them.
        matches!(mode, DetectionMode::Monophonic) || expected.map(|e| e.len() <= 1).unwrap_or(true)
    }

    /// Runs the selected tier over `window` (assumed to already be at `self.sample_rate_hz`,
    /// except when routed to Tier 3, which expects a 16 kHz / 17 920-sample frame and is
    /// invoked through [`HybridRouter::detect_frame`] instead).
    pub fn detect(&self, window: &[f32], detected_at_sec: f64, mode: DetectionMode, expected: Option<&[u8]>) -> Result<Vec<NoteEvent>> {
        match self.select_tier(mode, expected) {
            SelectedTier::Monophonic => Ok(self.yin.detect(window, detected_at_sec).into_iter().collect()),

            SelectedTier::Verification => {
                let expected = expected.ok_or_else(|| {
                    WoodshedError::InvariantViolation("tier selection chose verification with no expected pitch set".into())
                })?;
                let result = verification::verify(window, self.sample_rate_hz, expected);
                debug!(matched = result.matched, confidence = result.confidence, "tier2 verification");

                if !result.matched {
                    return Ok(Vec::new());
                }

                Ok(expected
                    .iter()
                    .map(|&pitch| {
                        NoteEvent::new(
                            pitch,
                            crate::core::pitch::midi_to_frequency_hz(pitch),
                            result.confidence,
                            0.5,
                            detected_at_sec,
                            SourceTier::Verification,
                        )
                    })
                    .collect())
            }

            SelectedTier::Polyphonic => self.detect_polyphonic(window, detected_at_sec, mode, expected),
        }
    }

    #[cfg(feature = "polyphonic")]
    fn detect_polyphonic(&self, window: &[f32], detected_at_sec: f64, mode: DetectionMode, expected: Option<&[u8]>) -> Result<Vec<NoteEvent>> {
        match &self.polyphonic {
            Some(model) => model.detect(window, self.sample_rate_hz, detected_at_sec),
            None => {
                if Self::monophonic_eligible(mode, expected) {
                    warn!("tier3 model unavailable, falling back to tier1");
                    Ok(self.yin.detect(window, detected_at_sec).into_iter().collect())
                } else {
                    Err(WoodshedError::ModelUnavailable("no polyphonic transcription model attached to router".into()))
                }
            }
        }
    }

    #[cfg(not(feature = "polyphonic"))]
    fn detect_polyphonic(&self, window: &[f32], detected_at_sec: f64, mode: DetectionMode, expected: Option<&[u8]>) -> Result<Vec<NoteEvent>> {
        if Self::monophonic_eligible(mode, expected) {
            warn!("polyphonic feature disabled, falling back to tier1");
            Ok(self.yin.detect(window, detected_at_sec).into_iter().collect())
        } else {
            Err(WoodshedError::ModelUnavailable("crate built without the `polyphonic` feature".into()))
        }
    }
}
