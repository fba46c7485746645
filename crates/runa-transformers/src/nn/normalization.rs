//! Layer normalization

use anyhow::{Result, anyhow, bail};
use ndarray::{Array1, Array3, Axis};

/// Normalizes the last axis of its input.
pub trait LayerNorm: Send + Sync {
    fn normalized_dim(&self) -> usize;

    fn forward(&self, seqs: &Array3<f32>) -> Result<Array3<f32>>;
}

/// Layer normalization over the last axis with an optional affine transform.
#[derive(Debug, Clone)]
pub struct StandardLayerNorm {
    dim: usize,
    weight: Option<Array1<f32>>,
    bias: Option<Array1<f32>>,
    eps: f32,
}

impl StandardLayerNorm {
    /// Creates a layer norm with weight `1` and bias `0` when `elementwise_affine` is set.
    pub fn new(dim: usize, eps: f32, elementwise_affine: bool) -> Self {
        let (weight, bias) = if elementwise_affine {
            (Some(Array1::ones(dim)), Some(Array1::zeros(dim)))
        } else {
            (None, None)
        };

        Self { dim, weight, bias, eps }
    }

    pub fn with_params(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> Result<Self> {
        if weight.len() != bias.len() {
            bail!(
                "layer norm weight ({}) and bias ({}) must have the same length",
                weight.len(),
                bias.len()
            );
        }

        Ok(Self { dim: weight.len(), weight: Some(weight), bias: Some(bias), eps })
    }

    pub fn eps(&self) -> f32 {
        self.eps
    }

    pub fn weight(&self) -> Option<&Array1<f32>> {
        self.weight.as_ref()
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }
}

impl LayerNorm for StandardLayerNorm {
    fn normalized_dim(&self) -> usize {
        self.dim
    }

    fn forward(&self, seqs: &Array3<f32>) -> Result<Array3<f32>> {
        let dim = seqs.shape()[2];
        if dim != self.dim {
            bail!(
                "layer norm expects a last dimension of {}, but the input has {}",
                self.dim,
                dim
            );
        }

        let mean = seqs
            .mean_axis(Axis(2))
            .ok_or_else(|| anyhow!("cannot normalize an empty axis"))?;
        let variance = seqs.var_axis(Axis(2), 0.0);

        let mean_expanded = mean.insert_axis(Axis(2));
        let inv_std = variance.insert_axis(Axis(2)).mapv(|v| 1.0 / (v + self.eps).sqrt());

        let mut normalized = (seqs - &mean_expanded) * &inv_std;

        if let Some(weight) = &self.weight {
            normalized *= weight;
        }
        if let Some(bias) = &self.bias {
            normalized += bias;
        }

        Ok(normalized)
    }
}
