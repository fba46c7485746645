//! Scaled dot-product attention.

use std::fmt::Debug;

use anyhow::{Result, anyhow, bail};
use ndarray::{Array3, Axis};

use crate::activations::softmax_last_axis_inplace;
use crate::error::ConfigResult;
use crate::nn::{Dropout, ForwardMode};

/// Computes scaled dot-product attention.
pub trait Sdpa: Debug + Send + Sync {
    fn attn_dropout_p(&self) -> f32;

    /// `queries` is `[batch, seq_len, k]`, `keys` is `[batch, kv_len, k]` and
    /// `values` is `[batch, kv_len, v]`. `mask` is additive and must broadcast
    /// to `[batch, seq_len, kv_len]`.
    ///
    /// Returns the attention output and, if `needs_weights`, the attention weights.
    fn forward(
        &self,
        queries: &Array3<f32>,
        keys: &Array3<f32>,
        values: &Array3<f32>,
        mask: Option<&Array3<f32>>,
        needs_weights: bool,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array3<f32>>)>;
}

/// Reference implementation built from batched matrix products.
#[derive(Debug, Clone)]
pub struct NaiveSdpa {
    attn_dropout: Option<Dropout>,
}

impl NaiveSdpa {
    pub fn new(attn_dropout_p: f32) -> ConfigResult<Self> {
        let attn_dropout =
            if attn_dropout_p > 0.0 { Some(Dropout::new(attn_dropout_p)?) } else { None };

        Ok(Self { attn_dropout })
    }
}

/// `out[b] = lhs[b] · rhs[b]ᵀ` when `transpose_rhs`, else `lhs[b] · rhs[b]`.
fn batched_matmul(lhs: &Array3<f32>, rhs: &Array3<f32>, transpose_rhs: bool) -> Array3<f32> {
    let batch_size = lhs.shape()[0];
    let rows = lhs.shape()[1];
    let cols = if transpose_rhs { rhs.shape()[1] } else { rhs.shape()[2] };

    let mut out = Array3::zeros((batch_size, rows, cols));
    for b in 0..batch_size {
        let l = lhs.index_axis(Axis(0), b);
        let r = rhs.index_axis(Axis(0), b);
        let product = if transpose_rhs { l.dot(&r.t()) } else { l.dot(&r) };
        out.index_axis_mut(Axis(0), b).assign(&product);
    }
    out
}

impl Sdpa for NaiveSdpa {
    fn attn_dropout_p(&self) -> f32 {
        self.attn_dropout.map_or(0.0, |d| d.p())
    }

    fn forward(
        &self,
        queries: &Array3<f32>,
        keys: &Array3<f32>,
        values: &Array3<f32>,
        mask: Option<&Array3<f32>>,
        needs_weights: bool,
        mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array3<f32>>)> {
        let (batch_size, _, k_dim) = queries.dim();
        let (kv_batch, kv_len, key_dim) = keys.dim();

        if kv_batch != batch_size || key_dim != k_dim {
            bail!("keys {:?} don't match queries {:?}", keys.dim(), queries.dim());
        }
        if values.shape()[0] != batch_size || values.shape()[1] != kv_len {
            bail!("values {:?} don't match keys {:?}", values.dim(), keys.dim());
        }

        let scaled_queries = queries * (k_dim as f32).powf(-0.5);

        let mut attn_weights = batched_matmul(&scaled_queries, keys, true);

        if let Some(mask) = mask {
            let mask = mask.broadcast(attn_weights.dim()).ok_or_else(|| {
                anyhow!(
                    "attention mask {:?} cannot be broadcast to {:?}",
                    mask.dim(),
                    attn_weights.dim()
                )
            })?;
            attn_weights += &mask;
        }

        softmax_last_axis_inplace(&mut attn_weights);

        if let Some(dropout) = &self.attn_dropout {
            attn_weights = dropout.forward(attn_weights, mode);
        }

        let attn = batched_matmul(&attn_weights, values, false);

        Ok((attn, needs_weights.then_some(attn_weights)))
    }
}

pub fn create_default_sdpa(attn_dropout_p: f32) -> ConfigResult<Box<dyn Sdpa>> {
    Ok(Box::new(NaiveSdpa::new(attn_dropout_p)?))
}
