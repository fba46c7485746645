use anyhow::Result;
use ndarray::{Array1, Array2, Array3};

use crate::models::{Seq2SeqBatch, SequenceModelOutput};
use crate::nn::{ForwardMode, IncrementalStateBag};

/// The decoding half of a sequence-to-sequence model.
///
/// This is all a generator needs: given encoder output it decodes target
/// sequences, optionally one step at a time with an `IncrementalStateBag`,
/// and projects decoder output onto the target vocabulary.
pub trait Seq2SeqDecoder: Send + Sync {
    /// Decodes `seqs` (`[batch, seq_len]`) against `encoder_output`
    /// (`[batch, source_seq_len, model_dim]`).
    ///
    /// Returns the decoder output and its padding mask.
    fn decode(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        encoder_output: &Array3<f32>,
        encoder_padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)>;

    /// Projects decoder output onto the target vocabulary.
    fn project(
        &self,
        decoder_output: &Array3<f32>,
        decoder_padding_mask: Option<&Array2<f32>>,
    ) -> Result<SequenceModelOutput>;

    fn decode_and_project(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        encoder_output: &Array3<f32>,
        encoder_padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<SequenceModelOutput> {
        let (decoder_output, decoder_padding_mask) = self.decode(
            seqs,
            seq_lens,
            encoder_output,
            encoder_padding_mask,
            state_bag,
            mode,
        )?;

        self.project(&decoder_output, decoder_padding_mask.as_ref())
    }
}

/// A sequence-to-sequence model with an encoder and a decoder.
pub trait EncoderDecoderModel: Seq2SeqDecoder {
    fn model_dim(&self) -> usize;

    /// Encodes `seqs` (`[batch, seq_len]`) into `[batch, seq_len, model_dim]`
    /// and returns the padding mask of the encoder output.
    fn encode(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)>;

    /// Runs a full teacher-forced pass over `batch`.
    fn forward(&self, batch: &Seq2SeqBatch, mode: &mut ForwardMode<'_>) -> Result<SequenceModelOutput> {
        let (encoder_output, encoder_padding_mask) =
            self.encode(&batch.source_seqs, batch.source_seq_lens.as_ref(), mode)?;

        self.decode_and_project(
            &batch.target_seqs,
            batch.target_seq_lens.as_ref(),
            &encoder_output,
            encoder_padding_mask.as_ref(),
            None,
            mode,
        )
    }
}
