//! Model-level contracts and the Transformer encoder-decoder assembly.

pub mod encoder_decoder;
pub mod seq2seq;
pub mod sequence;
pub mod transformer;

pub use encoder_decoder::{EncoderDecoderModel, Seq2SeqDecoder};
pub use seq2seq::Seq2SeqBatch;
pub use sequence::SequenceModelOutput;
