//! Core sequence-to-sequence components for building Transformer models
//!
//! This crate provides the embedding front-ends, neural building blocks and
//! beam-search generation used by encoder-decoder models, on top of `ndarray`.

pub mod activations;
pub mod data;
pub mod error;
pub mod generation;
pub mod models;
pub mod nn;
pub mod traits;
pub mod utils;

// Re-export commonly used items
pub use crate::{
    error::ConfigError,
    models::transformer::{
        FrontendOptions, TransformerEmbeddingFrontend, TransformerFrontend, TransformerModel,
    },
    nn::{
        Dropout, Embedding, ForwardMode, IncrementalStateBag, LayerNorm, PositionEncoder,
        StandardEmbedding, StandardLayerNorm,
    },
    utils::to_padding_mask,
};
pub use traits::{DType, Device};

// Prelude for easy imports
pub mod prelude {
    pub use crate::models::encoder_decoder::{EncoderDecoderModel, Seq2SeqDecoder};
    pub use crate::models::transformer::TransformerFrontend;
    pub use crate::nn::{ForwardMode, IncrementalStateBag};
    pub use crate::traits::{DType, Device};
}
