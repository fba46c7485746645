use anyhow::Result;
use ndarray::{Array2, Array3};

use crate::nn::ForwardMode;

/// A stack of Transformer encoder layers.
pub trait TransformerEncoder: Send + Sync {
    fn model_dim(&self) -> usize;

    /// Encodes `seqs` (`[batch, seq_len, model_dim]`).
    ///
    /// Returns the encoded sequences and their padding mask.
    fn forward(
        &self,
        seqs: Array3<f32>,
        padding_mask: Option<Array2<f32>>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)>;
}
