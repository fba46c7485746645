//! Embedding front-ends that turn token indices into model inputs.

use std::fmt;

use anyhow::Result;
use log::debug;
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::nn::transformer::{LayerNormFactory, default_layer_norm_factory};
use crate::nn::{Dropout, Embedding, ForwardMode, IncrementalStateBag, LayerNorm, PositionEncoder};
use crate::traits::{DType, Device};
use crate::utils::to_padding_mask;

/// Produces the input of a Transformer encoder or decoder from token indices.
pub trait TransformerFrontend: fmt::Display + Send + Sync {
    /// Dimensionality of the produced embeddings.
    fn model_dim(&self) -> usize;

    /// Embeds `seqs` (`[batch, seq_len]`).
    ///
    /// `seq_lens` holds the number of real elements of each sequence; when it
    /// is given and some sequence is shorter than `seq_len`, a float padding
    /// mask (`0.0` for real positions, `-inf` for padding) is returned along
    /// with the embeddings.
    ///
    /// `state_bag` carries incremental decoding state and is forwarded to
    /// position-aware submodules.
    fn forward(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)>;
}

/// Serializable switches of `TransformerEmbeddingFrontend`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendOptions {
    /// Skip scaling embeddings by `sqrt(model_dim)`.
    pub no_scale: bool,
    /// Apply layer normalization to the embeddings.
    pub layer_norm: bool,
    /// Dropout probability on the embeddings. `0.0` disables dropout.
    pub dropout_p: f32,
}

impl Default for FrontendOptions {
    fn default() -> Self {
        Self { no_scale: false, layer_norm: false, dropout_p: 0.1 }
    }
}

/// Token embedding followed by optional scaling, position encoding, layer
/// normalization and dropout, applied in that order.
pub struct TransformerEmbeddingFrontend {
    model_dim: usize,
    embed: Box<dyn Embedding>,
    no_scale: bool,
    scale: f32,
    pos_encoder: Option<Box<dyn PositionEncoder>>,
    layer_norm: Option<Box<dyn LayerNorm>>,
    dropout: Option<Dropout>,
}

impl TransformerEmbeddingFrontend {
    /// Creates a front-end with the default layer norm factory on the CPU.
    pub fn new(
        embed: Box<dyn Embedding>,
        pos_encoder: Option<Box<dyn PositionEncoder>>,
        opts: FrontendOptions,
    ) -> ConfigResult<Self> {
        let mut builder = Self::builder(embed).options(opts);
        builder.pos_encoder = pos_encoder;
        builder.build()
    }

    pub fn builder(embed: Box<dyn Embedding>) -> TransformerEmbeddingFrontendBuilder {
        TransformerEmbeddingFrontendBuilder {
            embed,
            pos_encoder: None,
            opts: FrontendOptions::default(),
            layer_norm_fn: None,
            device: None,
            dtype: None,
        }
    }

    pub fn embed(&self) -> &dyn Embedding {
        self.embed.as_ref()
    }

    /// `1.0` when scaling is disabled, `sqrt(model_dim)` otherwise.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pos_encoder(&self) -> Option<&dyn PositionEncoder> {
        self.pos_encoder.as_deref()
    }

    pub fn layer_norm(&self) -> Option<&dyn LayerNorm> {
        self.layer_norm.as_deref()
    }

    pub fn dropout(&self) -> Option<Dropout> {
        self.dropout
    }
}

impl TransformerFrontend for TransformerEmbeddingFrontend {
    fn model_dim(&self) -> usize {
        self.model_dim
    }

    fn forward(
        &self,
        seqs: &Array2<u32>,
        seq_lens: Option<&Array1<usize>>,
        state_bag: Option<&mut IncrementalStateBag>,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
        let mut embeds = self.embed.forward(seqs)?;

        let (batch_size, seq_len, _) = embeds.dim();
        let padding_mask = to_padding_mask((batch_size, seq_len), seq_lens)?;

        if self.scale != 1.0 {
            embeds *= self.scale;
        }

        if let Some(pos_encoder) = &self.pos_encoder {
            embeds = pos_encoder.forward(embeds, padding_mask.as_ref(), state_bag)?;
        }

        if let Some(layer_norm) = &self.layer_norm {
            embeds = layer_norm.forward(&embeds)?;
        }

        if let Some(dropout) = &self.dropout {
            embeds = dropout.forward(embeds, mode);
        }

        Ok((embeds, padding_mask))
    }
}

impl fmt::Display for TransformerEmbeddingFrontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model_dim={}", self.model_dim)?;
        if self.no_scale {
            write!(f, ", no_scale=true")?;
        }
        Ok(())
    }
}

/// Builder for `TransformerEmbeddingFrontend`.
pub struct TransformerEmbeddingFrontendBuilder {
    embed: Box<dyn Embedding>,
    pos_encoder: Option<Box<dyn PositionEncoder>>,
    opts: FrontendOptions,
    layer_norm_fn: Option<LayerNormFactory>,
    device: Option<Device>,
    dtype: Option<DType>,
}

impl TransformerEmbeddingFrontendBuilder {
    pub fn pos_encoder(mut self, pos_encoder: Box<dyn PositionEncoder>) -> Self {
        self.pos_encoder = Some(pos_encoder);
        self
    }

    /// Replaces all switches at once.
    pub fn options(mut self, opts: FrontendOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn no_scale(mut self, no_scale: bool) -> Self {
        self.opts.no_scale = no_scale;
        self
    }

    pub fn layer_norm(mut self, layer_norm: bool) -> Self {
        self.opts.layer_norm = layer_norm;
        self
    }

    /// Factory used to build the layer norm when `layer_norm` is enabled.
    pub fn layer_norm_fn(mut self, factory: LayerNormFactory) -> Self {
        self.layer_norm_fn = Some(factory);
        self
    }

    pub fn dropout_p(mut self, dropout_p: f32) -> Self {
        self.opts.dropout_p = dropout_p;
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn build(self) -> ConfigResult<TransformerEmbeddingFrontend> {
        let model_dim = self.embed.embedding_dim();

        if let Some(pos_encoder) = &self.pos_encoder {
            let encoding_dim = pos_encoder.encoding_dim();
            if encoding_dim != model_dim {
                return Err(ConfigError::DimensionMismatch { encoding_dim, model_dim });
            }
        }

        let scale = if self.opts.no_scale { 1.0 } else { (model_dim as f32).sqrt() };

        let layer_norm = if self.opts.layer_norm {
            let factory = self.layer_norm_fn.unwrap_or_else(default_layer_norm_factory);
            Some(factory(model_dim, self.device, self.dtype)?)
        } else {
            None
        };

        let dropout_p = self.opts.dropout_p;
        let dropout = if dropout_p > 0.0 {
            Some(Dropout::new(dropout_p)?)
        } else if dropout_p == 0.0 {
            None
        } else {
            return Err(ConfigError::InvalidDropoutProbability(dropout_p));
        };

        debug!(
            "embedding frontend: model_dim={}, scale={}, pos_encoder={}, layer_norm={}, dropout_p={}",
            model_dim,
            scale,
            self.pos_encoder.is_some(),
            layer_norm.is_some(),
            dropout.map_or(0.0, |d| d.p())
        );

        Ok(TransformerEmbeddingFrontend {
            model_dim,
            embed: self.embed,
            no_scale: self.opts.no_scale,
            scale,
            pos_encoder: self.pos_encoder,
            layer_norm,
            dropout,
        })
    }
}
