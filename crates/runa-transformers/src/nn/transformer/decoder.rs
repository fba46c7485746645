use anyhow::Result;
use ndarray::{Array2, Array3};

use crate::nn::{ForwardMode, IncrementalStateBag};

/// A stack of Transformer decoder layers.
pub trait TransformerDecoder: Send + Sync {
    fn model_dim(&self) -> usize;

    /// Decodes `seqs` (`[batch, seq_len, model_dim]`) while attending to
    /// `encoder_output`.
    ///
    /// In incremental decoding the layers keep their attention states in
    /// `state_bag`; the caller advances its step.
    fn forward(
        &self,
        seqs: Array3<f32>,
        padding_mask: Option<Array2<f32>>,
        encoder_output: &Array3<f32>,
        encoder_padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)>;
}
