//! Frame-level preprocessing: silence gating, windowing, and sample-rate conversion ahead of
//! a detector.

#[cfg(feature = "resample")]
use super::resample::Resampler32;

/// RMS below this level is treated as silence; no detector is invoked on the frame.
pub const SILENCE_RMS_THRESHOLD: f32 = 0.002;

/// Root-mean-square amplitude of a frame.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Applies a Hann window in place.
pub fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n <= 1 {
        return;
    }
    for (i, sample) in samples.iter_mut().enumerate() {
        let w = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos();
        *sample *= w;
    }
}

/// A raw audio frame paired with its sample rate.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono float samples in `[-1, 1]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate_hz: u32,
}

/// Converts incoming chunks at a fixed stream rate into frames suitable for a detector,
/// gating out silence and resampling when the detector expects a different rate.
pub struct Preprocessor {
    #[cfg(feature = "resample")]
    resampler: Option<Resampler32>,
    target_rate_hz: u32,
}

impl Preprocessor {
    /// Builds a preprocessor that resamples (if needed) from `input_rate_hz` to
    /// `target_rate_hz`.
    pub fn new(input_rate_hz: u32, target_rate_hz: u32) -> crate::error::Result<Self> {
        #[cfg(feature = "resample")]
        let resampler = if input_rate_hz == target_rate_hz { None } else { Some(Resampler32::new(input_rate_hz, target_rate_hz)?) };

        Ok(Self {
            #[cfg(feature = "resample")]
            resampler,
            target_rate_hz,
        })
    }

    /// Processes one chunk of raw samples, returning `None` if the chunk is silent and
    /// `Some(frame)` at the target rate otherwise.
    pub fn process(&mut self, samples: &[f32]) -> crate::error::Result<Option<AudioFrame>> {
        if rms(samples) < SILENCE_RMS_THRESHOLD {
            return Ok(None);
        }

        #[cfg(feature = "resample")]
        let resampled = match &mut self.resampler {
            Some(resampler) => resampler.process(samples).map_err(|e| crate::error::WoodshedError::SampleRateMismatch(e.to_string()))?,
            None => samples.to_vec(),
        };
        #[cfg(not(feature = "resample"))]
        let resampled = samples.to_vec();

        Ok(Some(AudioFrame { samples: resampled, sample_rate_hz: self.target_rate_hz }))
    }
}
