//! Transformer-specific building blocks and the encoder/decoder contracts.

pub mod attention;
mod decoder;
mod encoder;
pub mod ffn;
pub mod layer_norm;
mod norm_order;

pub use attention::{NaiveSdpa, Sdpa, create_default_sdpa};
pub use decoder::TransformerDecoder;
pub use encoder::TransformerEncoder;
pub use ffn::{FeedForwardNetwork, FeedForwardOptions, StandardFeedForwardNetwork};
pub use layer_norm::{LayerNormFactory, create_default_layer_norm, default_layer_norm_factory};
pub use norm_order::TransformerNormOrder;
