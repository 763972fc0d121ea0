//! The Tier 3 transcription model: a small attention-plus-MLP network, mirroring the
//! reference stack's classifier shape but generalized from a single-token embedding to a
//! 32-step sequence so it can emit per-key onset/frame/velocity probabilities over time.

use burn::{
    config::Config,
    module::Module,
    nn::{
        self,
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
    },
    tensor::{activation::gelu, activation::sigmoid, backend::Backend, Tensor},
};

use super::features::{FEATURE_BINS, NUM_KEYS};

/// Hyperparameters for [`TranscriptionModel`].
#[derive(Debug, Config)]
pub struct TranscriptionModelConfig {
    /// Number of multi-head attention heads over the per-step feature vector.
    #[config(default = 8)]
    pub mha_heads: usize,
    /// Multi-head attention dropout rate.
    #[config(default = 0.1)]
    pub mha_dropout: f64,
    /// Hidden width of the MLP trunk between attention and the output heads.
    #[config(default = 256)]
    pub hidden_size: usize,
}

/// The Tier 3 polyphonic transcription model.
///
/// Input: a `[batch, TIME_STEPS, FEATURE_BINS]` spectral feature stack (see
/// [`crate::ml::features`]). Output: three `[batch, TIME_STEPS, NUM_KEYS]` tensors — onset,
/// frame (sustain), and velocity — already passed through sigmoid, per §4.3.
#[derive(Module, Debug)]
pub struct TranscriptionModel<B: Backend> {
    mha: MultiHeadAttention<B>,
    trunk_in: nn::Linear<B>,
    trunk_dropout: nn::Dropout,
    trunk_out: nn::Linear<B>,
    onset_head: nn::Linear<B>,
    frame_head: nn::Linear<B>,
    velocity_head: nn::Linear<B>,
}

impl<B: Backend> TranscriptionModel<B> {
    /// Builds a freshly (randomly) initialized model of the given shape. Callers load trained
    /// weights over it via [`burn::module::Module::load_record`] before running inference for
    /// real; this constructor alone is only useful to exercise the forward pass's shapes.
    pub fn new(device: &B::Device, config: &TranscriptionModelConfig) -> Self {
        let mha = MultiHeadAttentionConfig::new(FEATURE_BINS, config.mha_heads).with_dropout(config.mha_dropout).init::<B>(device);

        let hidden = config.hidden_size;
        let trunk_in = nn::LinearConfig::new(FEATURE_BINS, hidden).with_bias(true).init::<B>(device);
        let trunk_dropout = nn::DropoutConfig::new(config.mha_dropout).init();
        let trunk_out = nn::LinearConfig::new(hidden, FEATURE_BINS).with_bias(true).init::<B>(device);

        let onset_head = nn::LinearConfig::new(FEATURE_BINS, NUM_KEYS).with_bias(true).init::<B>(device);
        let frame_head = nn::LinearConfig::new(FEATURE_BINS, NUM_KEYS).with_bias(true).init::<B>(device);
        let velocity_head = nn::LinearConfig::new(FEATURE_BINS, NUM_KEYS).with_bias(true).init::<B>(device);

        Self {
            mha,
            trunk_in,
            trunk_dropout,
            trunk_out,
            onset_head,
            frame_head,
            velocity_head,
        }
    }

    /// Runs the model end to end, returning `(onset, frame, velocity)` probability tensors of
    /// shape `[batch, TIME_STEPS, NUM_KEYS]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>) {
        let attn = self.mha.forward(MhaInput::new(input.clone(), input.clone(), input));
        let x = attn.context;

        let x = self.trunk_in.forward(x);
        let x = gelu(x);
        let x = self.trunk_dropout.forward(x);
        let x = self.trunk_out.forward(x);

        let onset = sigmoid(self.onset_head.forward(x.clone()));
        let frame = sigmoid(self.frame_head.forward(x.clone()));
        let velocity = sigmoid(self.velocity_head.forward(x));

        (onset, frame, velocity)
    }
}
