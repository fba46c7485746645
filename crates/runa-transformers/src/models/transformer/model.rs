use anyhow::Result;
use log::debug;
use ndarray::{Array1, Array2, Array3};

use crate::error::{ConfigError, ConfigResult};
use crate::models::{EncoderDecoderModel, Seq2SeqDecoder, SequenceModelOutput};
use crate::models::transformer::TransformerFrontend;
use crate::nn::transformer::{TransformerDecoder, TransformerEncoder};
use crate::nn::{ForwardMode, IncrementalStateBag, Projection};

/// An encoder-decoder Transformer assembled from its parts.
pub struct TransformerModel {
    model_dim: usize,
    encoder_frontend: Box<dyn TransformerFrontend>,
    encoder: Box<dyn TransformerEncoder>,
    decoder_frontend: Box<dyn TransformerFrontend>,
    decoder: Box<dyn TransformerDecoder>,
    final_proj: Box<dyn Projection>,
    target_pad_idx: Option<u32>,
}

impl TransformerModel {
    pub fn new(
        encoder_frontend: Box<dyn TransformerFrontend>,
        encoder: Box<dyn TransformerEncoder>,
        decoder_frontend: Box<dyn TransformerFrontend>,
        decoder: Box<dyn TransformerDecoder>,
        final_proj: Box<dyn Projection>,
        target_pad_idx: Option<u32>,
    ) -> ConfigResult<Self> {
        let model_dim = encoder.model_dim();

        let components = [
            ("encoder_frontend", encoder_frontend.model_dim()),
            ("decoder_frontend", decoder_frontend.model_dim()),
            ("decoder", decoder.model_dim()),
            ("final_proj", final_proj.input_dim()),
        ];
        for (name, dim) in components {
            if dim != model_dim {
                return Err(ConfigError::InvalidArgument(format!(
                    "`model_dim` of `{name}` must be equal to `model_dim` of `encoder` ({model_dim}), but is {dim} instead"
                )));
            }
        }

        debug!(
            "transformer model: model_dim={}, target_vocab={}, encoder_frontend=({}), decoder_frontend=({})",
            model_dim,
            final_proj.output_dim(),
            encoder_frontend,
            decoder_frontend
        );

        Ok(Self {
            model_dim,
            encoder_frontend,
            encoder,
            decoder_frontend,
            decoder,
            final_proj,
            target_pad_idx,
        })
    }

    pub fn target_pad_idx(&self) -> Option<u32> {
        self.target_pad_idx
    }
}

impl Seq2SeqDecoder for TransformerModel {
    fn decode(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        encoder_output: &Array3<f32>,
        encoder_padding_mask: Option<&Array2<f32>>,
        mut state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
        let (seqs, padding_mask) =
            self.decoder_frontend.forward(seqs, seq_lens, state_bag.as_deref_mut(), mode)?;

        self.decoder.forward(
            seqs,
            padding_mask,
            encoder_output,
            encoder_padding_mask,
            state_bag,
            mode,
        )
    }

    fn project(
        &self,
        decoder_output: &Array3<f32>,
        _decoder_padding_mask: Option<&Array2<f32>>,
    ) -> Result<SequenceModelOutput> {
        let logits = self.final_proj.forward(decoder_output)?;

        Ok(SequenceModelOutput::new(logits, self.target_pad_idx))
    }
}

impl EncoderDecoderModel for TransformerModel {
    fn model_dim(&self) -> usize {
        self.model_dim
    }

    fn encode(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
        let (seqs, padding_mask) = self.encoder_frontend.forward(seqs, seq_lens, None, mode)?;

        self.encoder.forward(seqs, padding_mask, mode)
    }
}
