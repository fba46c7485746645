use anyhow::Result;
use log::debug;
use ndarray::Array3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::{Activation, apply_activation};
use crate::error::{ConfigError, ConfigResult};
use crate::nn::transformer::{TransformerNormOrder, create_default_layer_norm};
use crate::nn::{Dropout, ForwardMode, LayerNorm, Linear, Projection};

/// Position-wise feed-forward network of a Transformer layer.
pub trait FeedForwardNetwork: Send + Sync {
    fn model_dim(&self) -> usize;

    fn forward(&self, seqs: &Array3<f32>, mode: &mut ForwardMode<'_>) -> Result<Array3<f32>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedForwardOptions {
    pub inner_activation: Activation,
    pub inner_dropout_p: f32,
    pub bias: bool,
    pub norm_order: TransformerNormOrder,
}

impl Default for FeedForwardOptions {
    fn default() -> Self {
        Self {
            inner_activation: Activation::Relu,
            inner_dropout_p: 0.0,
            bias: true,
            norm_order: TransformerNormOrder::Post,
        }
    }
}

/// `output_proj(dropout(norm(act(inner_proj(x)))))`
///
/// The inner layer norm only exists with `TransformerNormOrder::PreWithNormformer`.
pub struct StandardFeedForwardNetwork {
    inner_proj: Linear,
    inner_activation: Activation,
    inner_layer_norm: Option<Box<dyn LayerNorm>>,
    inner_dropout: Option<Dropout>,
    output_proj: Linear,
}

impl StandardFeedForwardNetwork {
    /// Randomly initialized network.
    pub fn init<R: Rng + ?Sized>(
        model_dim: usize,
        inner_dim: usize,
        opts: FeedForwardOptions,
        rng: &mut R,
    ) -> ConfigResult<Self> {
        let inner_proj = Linear::init(model_dim, inner_dim, opts.bias, rng);
        let output_proj = Linear::init(inner_dim, model_dim, opts.bias, rng);

        Self::from_projections(inner_proj, output_proj, opts)
    }

    pub fn from_projections(
        inner_proj: Linear,
        output_proj: Linear,
        opts: FeedForwardOptions,
    ) -> ConfigResult<Self> {
        if inner_proj.output_dim() != output_proj.input_dim()
            || inner_proj.input_dim() != output_proj.output_dim()
        {
            return Err(ConfigError::InvalidArgument(format!(
                "projections don't chain: inner is {}->{}, output is {}->{}",
                inner_proj.input_dim(),
                inner_proj.output_dim(),
                output_proj.input_dim(),
                output_proj.output_dim()
            )));
        }

        let inner_dim = inner_proj.output_dim();

        let inner_layer_norm = if opts.norm_order == TransformerNormOrder::PreWithNormformer {
            Some(create_default_layer_norm(inner_dim, None, None)?)
        } else {
            None
        };

        let inner_dropout = if opts.inner_dropout_p > 0.0 {
            Some(Dropout::new(opts.inner_dropout_p)?)
        } else {
            None
        };

        debug!(
            "feed-forward network: model_dim={}, inner_dim={}, activation={:?}, normformer={}",
            inner_proj.input_dim(),
            inner_dim,
            opts.inner_activation,
            inner_layer_norm.is_some()
        );

        Ok(Self {
            inner_proj,
            inner_activation: opts.inner_activation,
            inner_layer_norm,
            inner_dropout,
            output_proj,
        })
    }
}

impl FeedForwardNetwork for StandardFeedForwardNetwork {
    fn model_dim(&self) -> usize {
        self.inner_proj.input_dim()
    }

    fn forward(&self, seqs: &Array3<f32>, mode: &mut ForwardMode<'_>) -> Result<Array3<f32>> {
        let mut hidden = self.inner_proj.forward(seqs)?;

        apply_activation(&mut hidden, self.inner_activation);

        if let Some(layer_norm) = &self.inner_layer_norm {
            hidden = layer_norm.forward(&hidden)?;
        }

        if let Some(dropout) = &self.inner_dropout {
            hidden = dropout.forward(hidden, mode);
        }

        self.output_proj.forward(&hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_relu_ffn() {
        // inner: [x0, -x0], output: sum of the two
        let inner = Linear::new(array![[1.0, 0.0], [-1.0, 0.0]], None).unwrap();
        let output = Linear::new(array![[1.0, 1.0], [0.0, 0.0]], None).unwrap();
        let opts = FeedForwardOptions { bias: false, ..Default::default() };
        let ffn = StandardFeedForwardNetwork::from_projections(inner, output, opts).unwrap();

        let x = Array3::from_shape_vec((1, 2, 2), vec![3.0, 9.0, -2.0, 9.0]).unwrap();
        let y = ffn.forward(&x, &mut ForwardMode::Eval).unwrap();

        // relu(x0) + relu(-x0) = |x0|
        assert_eq!(y.into_raw_vec_and_offset().0, vec![3.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_projections_must_chain() {
        let inner = Linear::new(ndarray::Array2::zeros((4, 2)), None).unwrap();
        let output = Linear::new(ndarray::Array2::zeros((2, 3)), None).unwrap();
        assert!(
            StandardFeedForwardNetwork::from_projections(inner, output, Default::default()).is_err()
        );
    }

    #[test]
    fn test_init_shapes_and_normformer() {
        let mut rng = StdRng::seed_from_u64(11);
        let opts = FeedForwardOptions {
            inner_activation: Activation::Gelu,
            inner_dropout_p: 0.1,
            norm_order: TransformerNormOrder::PreWithNormformer,
            ..Default::default()
        };
        let ffn = StandardFeedForwardNetwork::init(4, 16, opts, &mut rng).unwrap();

        assert_eq!(ffn.model_dim(), 4);
        assert!(ffn.inner_layer_norm.is_some());
        assert!(ffn.inner_dropout.is_some());

        let y = ffn.forward(&Array3::ones((2, 3, 4)), &mut ForwardMode::Eval).unwrap();
        assert_eq!(y.dim(), (2, 3, 4));
    }

    #[test]
    fn test_options_from_json() {
        let opts: FeedForwardOptions =
            serde_json::from_str(r#"{"inner_activation": "gelu", "norm_order": "pre"}"#).unwrap();
        assert_eq!(opts.inner_activation, Activation::Gelu);
        assert_eq!(opts.norm_order, TransformerNormOrder::Pre);
        assert!(opts.bias);
    }
}
