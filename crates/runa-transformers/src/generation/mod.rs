//! Beam-search sequence generation.

pub mod beam_search;
pub mod logits_processor;
pub mod sequence_generator;
pub mod text;

pub use beam_search::{BeamSearch, StandardBeamSearch};
pub use logits_processor::{BannedSequenceLogitsProcessor, LogitsProcessor};
pub use sequence_generator::{
    Hypothesis, Seq2SeqGenerator, SequenceGeneratorOptions, SequenceGeneratorOutput,
};
pub use text::{SequenceToTextGenerator, SequenceToTextOutput, TextTranslator};
