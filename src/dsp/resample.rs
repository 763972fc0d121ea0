//! Band-limited resampling between the audio stream's native rate and a detector's expected
//! rate, using an FFT-based windowed-sinc resampler so Tier 3 accuracy does not collapse to
//! naive-decimation aliasing.

use rubato::{FftFixedIn, Resampler};

use crate::core::base::Res;
use crate::error::WoodshedError;

/// Lower bound on the supported `input_rate / output_rate` ratio.
pub const MIN_RATIO: f64 = 0.25;
/// Upper bound on the supported `input_rate / output_rate` ratio.
pub const MAX_RATIO: f64 = 4.0;

/// A single-channel resampler between two fixed sample rates.
pub struct Resampler32 {
    inner: FftFixedIn<f32>,
    chunk_size: usize,
}

impl Resampler32 {
    /// Builds a resampler from `input_rate_hz` to `output_rate_hz` for mono audio.
    ///
    /// Fails with [`WoodshedError::SampleRateMismatch`] if the ratio between the two rates
    /// falls outside `[MIN_RATIO, MAX_RATIO]`.
    pub fn new(input_rate_hz: u32, output_rate_hz: u32) -> crate::error::Result<Self> {
        let ratio = input_rate_hz as f64 / output_rate_hz as f64;
        if !(MIN_RATIO..=MAX_RATIO).contains(&ratio) {
            return Err(WoodshedError::SampleRateMismatch(format!(
                "unsupported resample ratio {ratio:.3} ({input_rate_hz} Hz -> {output_rate_hz} Hz)"
            )));
        }

        let chunk_size = 1024;
        let inner = FftFixedIn::<f32>::new(input_rate_hz as usize, output_rate_hz as usize, chunk_size, 2, 1)
            .map_err(|e| WoodshedError::SampleRateMismatch(e.to_string()))?;

        Ok(Self { inner, chunk_size })
    }

    /// Resamples `input` in full, chunking internally to satisfy the resampler's fixed input
    /// size and padding the final partial chunk with silence.
    pub fn process(&mut self, input: &[f32]) -> Res<Vec<f32>> {
        let mut output = Vec::with_capacity(input.len());
        let mut offset = 0;

        while offset < input.len() {
            let end = (offset + self.chunk_size).min(input.len());
            let mut chunk = input[offset..end].to_vec();
            chunk.resize(self.chunk_size, 0.0);

            let resampled = self.inner.process(&[chunk], None)?;
            output.extend_from_slice(&resampled[0]);

            offset = end;
        }

        Ok(output)
    }
}
