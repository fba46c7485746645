//! Neural building blocks shared by encoder and decoder stacks.
//!
//! Every module here is a plain struct behind a capability trait, so models
//! only depend on the contract (`Embedding`, `PositionEncoder`, `LayerNorm`,
//! `Projection`) and concrete implementations can be swapped freely.

mod dropout;
mod embedding;
mod incremental_state;
mod mode;
mod normalization;
mod position_encoder;
pub mod projection;
pub mod transformer;

pub use dropout::Dropout;
pub use embedding::{Embedding, StandardEmbedding};
pub use incremental_state::{AttentionState, IncrementalState, IncrementalStateBag};
pub use mode::ForwardMode;
pub use normalization::{LayerNorm, StandardLayerNorm};
pub use position_encoder::{LearnedPositionEncoder, PositionEncoder, SinusoidalPositionEncoder};
pub use projection::{Linear, Projection, TiedProjection};
