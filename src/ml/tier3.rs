//! Tier 3 (§4.3): decodes the transcription model's per-key onset/frame/velocity tensors into
//! [`NoteEvent`]s, including the harmonic-suppression pass.

use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::{backend::Backend, Tensor};
use burn_ndarray::{NdArray, NdArrayDevice};

use crate::core::event::{NoteEvent, SourceTier};
use crate::core::pitch::{midi_to_frequency_hz, MIN_MIDI_PITCH};
use crate::error::{Result, WoodshedError};

use super::features::{flatten_features, frame_to_features, FRAME_SAMPLES, NUM_KEYS, SAMPLE_RATE_HZ, TIME_STEPS};
use super::model::{TranscriptionModel, TranscriptionModelConfig};

/// Onset probability at or above this counts as a candidate onset.
const ONSET_THRESHOLD: f32 = 0.3;
/// Frame (sustain) probability required at a candidate onset's time step.
const FRAME_THRESHOLD: f32 = 0.2;
/// Semitone offsets above an accepted pitch at which a weaker candidate is a harmonic, not a
/// genuine note. Directional: a candidate below an already-accepted pitch is never suppressed by
/// it, since a louder harmonic artifact must not discard a quieter genuine fundamental beneath it.
const HARMONIC_OFFSETS: [i16; 5] = [12, 19, 24, 28, 31];
/// A suppressed candidate's onset probability must be below this fraction of the accepted
/// candidate's for suppression to apply.
const SUPPRESSION_RATIO: f32 = 0.6;

/// The concrete backend Tier 3 inference runs on. The model never needs GPU-grade throughput
/// at this frame rate, so `burn-ndarray` keeps the dependency footprint to CPU-only crates.
pub type InferenceBackend = NdArray<f32>;

/// A raw (time_step, midi_pitch, onset, frame, velocity) candidate before suppression.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    time_step: usize,
    midi_pitch: u8,
    onset: f32,
    velocity: f32,
}

/// The Tier 3 polyphonic detector: an explicitly constructed, process-global, read-only model
/// handle (§5, §9) wrapping [`TranscriptionModel`].
pub struct PolyphonicDetector {
    model: TranscriptionModel<InferenceBackend>,
    device: NdArrayDevice,
}

impl PolyphonicDetector {
    /// Loads a detector from a serialized `burn` record. No trained weights ship with this
    /// crate (§9's "global state" note); callers supply their own, e.g. read from disk.
    pub fn load(config: &TranscriptionModelConfig, record_bytes: Vec<u8>) -> Result<Self> {
        let device = NdArrayDevice::Cpu;

        let recorder = BinBytesRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(record_bytes, &device)
            .map_err(|e| WoodshedError::ModelUnavailable(format!("failed to load transcription model record: {e}")))?;

        let model = TranscriptionModel::<InferenceBackend>::new(&device, config).load_record(record);

        Ok(Self { model, device })
    }

    /// Builds a detector around a freshly initialized (untrained) model, for tests and for
    /// exercising the pipeline shape before a trained model is available.
    pub fn new_untrained(config: &TranscriptionModelConfig) -> Self {
        let device = NdArrayDevice::Cpu;
        let model = TranscriptionModel::<InferenceBackend>::new(&device, config);
        Self { model, device }
    }

    /// Runs Tier 3 on one frame, returning zero or more [`NoteEvent`]s.
    ///
    /// `window` must be exactly [`FRAME_SAMPLES`] samples at [`SAMPLE_RATE_HZ`]; resample via
    /// [`crate::dsp::resample`] first (§4.1) if the audio stream runs at a different rate.
    /// `chunk_start_sec` is the wall-clock time of the frame's first sample.
    pub fn detect(&self, window: &[f32], sample_rate_hz: f32, chunk_start_sec: f64) -> Result<Vec<NoteEvent>> {
        if sample_rate_hz as u32 != SAMPLE_RATE_HZ || window.len() != FRAME_SAMPLES {
            return Err(WoodshedError::SampleRateMismatch(format!(
                "tier3 requires exactly {FRAME_SAMPLES} samples at {SAMPLE_RATE_HZ} Hz, got {} samples at {sample_rate_hz} Hz",
                window.len()
            )));
        }

        let features = frame_to_features(window);
        let flat = flatten_features(&features);

        let input = Tensor::<InferenceBackend, 1>::from_floats(flat.as_slice(), &self.device).reshape([1, TIME_STEPS, super::features::FEATURE_BINS]);

        let (onset, frame, velocity) = self.model.forward(input);

        let onset: Vec<f32> = onset.into_data().to_vec().map_err(|e| WoodshedError::ModelUnavailable(format!("{e:?}")))?;
        let frame: Vec<f32> = frame.into_data().to_vec().map_err(|e| WoodshedError::ModelUnavailable(format!("{e:?}")))?;
        let velocity: Vec<f32> = velocity.into_data().to_vec().map_err(|e| WoodshedError::ModelUnavailable(format!("{e:?}")))?;

        let step_duration_sec = (FRAME_SAMPLES as f64 / SAMPLE_RATE_HZ as f64) / TIME_STEPS as f64;

        Ok(decode_model_output(&onset, &frame, &velocity, chunk_start_sec, step_duration_sec))
    }
}

/// Decodes flattened `[TIME_STEPS * NUM_KEYS]` onset/frame/velocity tensors into [`NoteEvent`]s,
/// applying the decision policy and harmonic suppression of §4.3. Pure and model-free, so it
/// is exercised directly by tests without needing a trained (or even loaded) model.
fn decode_model_output(onset: &[f32], frame: &[f32], velocity: &[f32], chunk_start_sec: f64, step_duration_sec: f64) -> Vec<NoteEvent> {
    debug_assert_eq!(onset.len(), TIME_STEPS * NUM_KEYS);

    let mut candidates = Vec::new();
    for t in 0..TIME_STEPS {
        for k in 0..NUM_KEYS {
            let index = t * NUM_KEYS + k;
            if onset[index] >= ONSET_THRESHOLD && frame[index] >= FRAME_THRESHOLD {
                candidates.push(Candidate {
                    time_step: t,
                    midi_pitch: MIN_MIDI_PITCH + k as u8,
                    onset: onset[index],
                    velocity: velocity[index],
                });
            }
        }
    }

    // Sort by onset confidence descending so the strongest candidates get first claim during
    // suppression.
    candidates.sort_by(|a, b| b.onset.partial_cmp(&a.onset).unwrap_or(std::cmp::Ordering::Equal));

    let mut accepted: Vec<Candidate> = Vec::new();
    'candidates: for candidate in candidates {
        for already in &accepted {
            let distance = candidate.midi_pitch as i16 - already.midi_pitch as i16;
            if HARMONIC_OFFSETS.contains(&distance) && candidate.onset < SUPPRESSION_RATIO * already.onset {
                continue 'candidates;
            }
        }
        accepted.push(candidate);
    }

    accepted
        .into_iter()
        .map(|c| {
            let detected_at_sec = chunk_start_sec + c.time_step as f64 * step_duration_sec;
            NoteEvent::new(c.midi_pitch, midi_to_frequency_hz(c.midi_pitch), c.onset, c.velocity, detected_at_sec, SourceTier::Polyphonic)
        })
        .collect()
}
