//! Text-producing front-ends of `Seq2SeqGenerator`.

use std::sync::Arc;

use anyhow::Result;
use log::warn;
use ndarray::{Array1, Array2, Array3};

use crate::data::Collater;
use crate::data::text::{TextTokenDecoder, TextTokenEncoder, TextTokenizer, TokenizerMode};
use crate::generation::{Seq2SeqGenerator, SequenceGeneratorOptions, SequenceGeneratorOutput};
use crate::models::{EncoderDecoderModel, Seq2SeqDecoder, SequenceModelOutput};
use crate::nn::{ForwardMode, IncrementalStateBag};

/// Output of a sequence-to-text generation.
#[derive(Debug, Clone)]
pub struct SequenceToTextOutput {
    /// Best sentence of each search.
    pub sentences: Vec<String>,
    pub generator_output: SequenceGeneratorOutput,
    /// `[batch, source_seq_len, model_dim]`
    pub encoder_output: Array3<f32>,
    /// `[batch, source_seq_len]`
    pub encoder_padding_mask: Option<Array2<f32>>,
}

/// Lends the decoding half of a model to the generator.
struct ModelDecoder(Arc<dyn EncoderDecoderModel>);

impl Seq2SeqDecoder for ModelDecoder {
    fn decode(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        encoder_output: &Array3<f32>,
        encoder_padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
        self.0.decode(seqs, seq_lens, encoder_output, encoder_padding_mask, state_bag, mode)
    }

    fn project(
        &self,
        decoder_output: &Array3<f32>,
        decoder_padding_mask: Option<&Array2<f32>>,
    ) -> Result<SequenceModelOutput> {
        self.0.project(decoder_output, decoder_padding_mask)
    }
}

/// Generates text from input sequences.
///
/// How input sequences are interpreted is up to the model.
pub struct SequenceToTextGenerator {
    model: Arc<dyn EncoderDecoderModel>,
    token_decoder: Box<dyn TextTokenDecoder>,
    generator: Seq2SeqGenerator,
}

impl SequenceToTextGenerator {
    /// The target-language encoder's prefix becomes the prefix of every
    /// generated sequence.
    pub fn new(
        model: Arc<dyn EncoderDecoderModel>,
        tokenizer: &dyn TextTokenizer,
        target_lang: Option<&str>,
        opts: SequenceGeneratorOptions,
    ) -> Result<Self> {
        let token_decoder = tokenizer.create_decoder();

        let target_encoder =
            tokenizer.create_encoder(Some("translation"), target_lang, TokenizerMode::Target)?;

        let generator = Seq2SeqGenerator::new(
            Arc::new(ModelDecoder(model.clone())),
            *tokenizer.vocab_info(),
            Some(target_encoder.prefix_indices().to_vec()),
            opts,
        )?;

        Ok(Self { model, token_decoder, generator })
    }

    pub fn generator(&self) -> &Seq2SeqGenerator {
        &self.generator
    }

    /// `source_seqs` is `[batch, seq_len]`, `source_seq_lens` is `[batch]`.
    pub fn generate(
        &self,
        source_seqs: &Array2<u32>,
        source_seq_lens: Option<&Array1<usize>>,
    ) -> Result<Vec<String>> {
        Ok(self.generate_ex(source_seqs, source_seq_lens)?.sentences)
    }

    pub fn generate_ex(
        &self,
        source_seqs: &Array2<u32>,
        source_seq_lens: Option<&Array1<usize>>,
    ) -> Result<SequenceToTextOutput> {
        let (encoder_output, encoder_padding_mask) =
            self.model.encode(source_seqs, source_seq_lens, &mut ForwardMode::Eval)?;

        let generator_output = self.generator.generate(
            &encoder_output,
            encoder_padding_mask.as_ref(),
            Some(source_seqs.ncols()),
        )?;

        let prefix_len = self.generator.prefix_seq().len();
        let eos_idx = self.generator.eos_idx();

        let sentences = generator_output
            .best()
            .into_iter()
            .enumerate()
            .map(|(i, best)| match best {
                Some(hypothesis) => {
                    let seq = hypothesis.seq.as_slice();
                    let end = match seq.last() {
                        Some(&idx) if idx == eos_idx => seq.len() - 1,
                        _ => seq.len(),
                    };
                    self.token_decoder.decode(&seq[prefix_len.min(end)..end])
                }
                None => {
                    warn!("search {} produced no hypothesis", i);
                    Ok(String::new())
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SequenceToTextOutput {
            sentences,
            generator_output,
            encoder_output,
            encoder_padding_mask,
        })
    }
}

/// Translates text from one language to another.
pub struct TextTranslator {
    generator: SequenceToTextGenerator,
    source_encoder: Box<dyn TextTokenEncoder>,
    collater: Collater,
}

impl TextTranslator {
    pub fn new(
        model: Arc<dyn EncoderDecoderModel>,
        tokenizer: &dyn TextTokenizer,
        source_lang: Option<&str>,
        target_lang: Option<&str>,
        opts: SequenceGeneratorOptions,
    ) -> Result<Self> {
        let generator = SequenceToTextGenerator::new(model, tokenizer, target_lang, opts)?;

        let source_encoder =
            tokenizer.create_encoder(Some("translation"), source_lang, TokenizerMode::Source)?;

        let collater = Collater::new(tokenizer.vocab_info().pad_idx);

        Ok(Self { generator, source_encoder, collater })
    }

    pub fn translate(&self, source_sentences: &[&str]) -> Result<Vec<String>> {
        Ok(self.translate_ex(source_sentences)?.sentences)
    }

    pub fn translate_ex(&self, source_sentences: &[&str]) -> Result<SequenceToTextOutput> {
        let indices = source_sentences
            .iter()
            .map(|sentence| self.source_encoder.encode(sentence))
            .collect::<Result<Vec<_>>>()?;

        let batch = self.collater.collate(&indices)?;

        let seq_lens = if batch.is_ragged { Some(&batch.seq_lens) } else { None };

        self.generator.generate_ex(&batch.seqs, seq_lens)
    }
}
