use std::sync::Arc;

use anyhow::{Result, bail};
use ndarray::{Array2, Array3, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::Rng;
use rayon::prelude::*;

use crate::error::{ConfigError, ConfigResult};

/// Stores embeddings of a fixed dictionary.
pub trait Embedding: Send + Sync {
    /// Size of the dictionary.
    fn num_embeddings(&self) -> usize;

    /// Dimensionality of the returned embeddings.
    fn embedding_dim(&self) -> usize;

    /// Index of the padding entry, if any.
    fn pad_idx(&self) -> Option<u32>;

    /// Looks up `seqs` (`[batch, seq_len]`) and returns `[batch, seq_len, embedding_dim]`.
    fn forward(&self, seqs: &Array2<u32>) -> Result<Array3<f32>>;
}

/// Dense `f32` lookup table.
///
/// The table lives behind an `Arc` so an output projection can share it
/// (see `TiedProjection`).
#[derive(Debug, Clone)]
pub struct StandardEmbedding {
    weight: Arc<Array2<f32>>,
    pad_idx: Option<u32>,
}

impl StandardEmbedding {
    pub fn new(weight: Array2<f32>, pad_idx: Option<u32>) -> ConfigResult<Self> {
        Self::from_arc(Arc::new(weight), pad_idx)
    }

    pub fn from_arc(weight: Arc<Array2<f32>>, pad_idx: Option<u32>) -> ConfigResult<Self> {
        let (num_embeddings, embedding_dim) = weight.dim();

        if num_embeddings == 0 || embedding_dim == 0 {
            return Err(ConfigError::InvalidArgument(format!(
                "embedding table must be non-empty, but has shape {:?}",
                weight.dim()
            )));
        }

        if let Some(idx) = pad_idx {
            if idx as usize >= num_embeddings {
                return Err(ConfigError::InvalidArgument(format!(
                    "`pad_idx` must be less than `num_embeddings` ({num_embeddings}), but is {idx} instead"
                )));
            }
        }

        Ok(Self { weight, pad_idx })
    }

    /// Randomly initialized table, `N(0, 1)` with a zero pad row.
    pub fn init<R: Rng + ?Sized>(
        num_embeddings: usize,
        embedding_dim: usize,
        pad_idx: Option<u32>,
        rng: &mut R,
    ) -> ConfigResult<Self> {
        let mut weight =
            Array2::<f32>::random_using((num_embeddings, embedding_dim), StandardNormal, rng);

        if let Some(idx) = pad_idx {
            if (idx as usize) < num_embeddings {
                weight.row_mut(idx as usize).fill(0.0);
            }
        }

        Self::new(weight, pad_idx)
    }

    pub fn weight(&self) -> &Arc<Array2<f32>> {
        &self.weight
    }
}

impl Embedding for StandardEmbedding {
    fn num_embeddings(&self) -> usize {
        self.weight.nrows()
    }

    fn embedding_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn pad_idx(&self) -> Option<u32> {
        self.pad_idx
    }

    fn forward(&self, seqs: &Array2<u32>) -> Result<Array3<f32>> {
        let (batch_size, seq_len) = seqs.dim();
        let vocab_size = self.num_embeddings();

        if let Some(&idx) = seqs.iter().find(|&&idx| idx as usize >= vocab_size) {
            bail!(
                "token index {} is out of range for an embedding table of size {}",
                idx,
                vocab_size
            );
        }

        let weight = &self.weight;
        let mut hidden = Array3::<f32>::zeros((batch_size, seq_len, self.embedding_dim()));

        hidden
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(seqs.axis_iter(Axis(0)))
            .for_each(|(mut batch_out, ids)| {
                for (pos, &idx) in ids.iter().enumerate() {
                    batch_out.row_mut(pos).assign(&weight.row(idx as usize));
                }
            });

        Ok(hidden)
    }
}
