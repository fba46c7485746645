use anyhow::{Result, bail};
use ndarray::{Array2, Array3, Axis, s};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand::Rng;

use crate::error::{ConfigError, ConfigResult};
use crate::nn::IncrementalStateBag;

/// Encodes sequences with positional information.
pub trait PositionEncoder: Send + Sync {
    /// Dimensionality of the position encodings.
    fn encoding_dim(&self) -> usize;

    /// Longest sequence the encoder can handle, if bounded.
    fn max_seq_len(&self) -> Option<usize>;

    /// Adds positional information to `seqs` (`[batch, seq_len, encoding_dim]`).
    ///
    /// With a state bag the first position is `state_bag.step()`, so
    /// incremental decoding continues where the previous call stopped.
    fn forward(
        &self,
        seqs: Array3<f32>,
        padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
    ) -> Result<Array3<f32>>;
}

fn start_step(state_bag: Option<&mut IncrementalStateBag>) -> usize {
    state_bag.map_or(0, |bag| bag.step())
}

/// Adds rows `start..start + seq_len` of `table` to every sequence of the batch.
fn add_table_rows(
    mut seqs: Array3<f32>,
    table: &Array2<f32>,
    start: usize,
) -> Result<Array3<f32>> {
    let (_, seq_len, dim) = seqs.dim();
    let (max_seq_len, encoding_dim) = table.dim();

    if dim != encoding_dim {
        bail!(
            "the last dimension of `seqs` ({}) must match the encoding dimension ({})",
            dim,
            encoding_dim
        );
    }

    let end = start + seq_len;
    if end > max_seq_len {
        bail!(
            "the input sequence length must be less than or equal to the maximum sequence length ({}), but is {} instead",
            max_seq_len,
            end
        );
    }

    let positions = table.slice(s![start..end, ..]).insert_axis(Axis(0));
    seqs += &positions;

    Ok(seqs)
}

/// Fixed sinusoidal position encodings.
///
/// Row `p` of the table is `[sin(p * f_0), .., sin(p * f_{h-1}), cos(p * f_0), .., cos(p * f_{h-1})]`
/// with `h = encoding_dim / 2` and `f_i = 10000^(-i / (h - 1))`.
#[derive(Debug, Clone)]
pub struct SinusoidalPositionEncoder {
    table: Array2<f32>,
}

impl SinusoidalPositionEncoder {
    pub fn new(encoding_dim: usize, max_seq_len: usize) -> ConfigResult<Self> {
        if encoding_dim == 0 || encoding_dim % 2 != 0 {
            return Err(ConfigError::InvalidArgument(format!(
                "`encoding_dim` must be even and non-zero, but is {encoding_dim} instead"
            )));
        }

        Ok(Self { table: Self::build_table(encoding_dim, max_seq_len) })
    }

    fn build_table(encoding_dim: usize, max_seq_len: usize) -> Array2<f32> {
        let half = encoding_dim / 2;

        let freqs: Vec<f64> = if half == 1 {
            vec![1.0]
        } else {
            let step = 10000f64.ln() / (half - 1) as f64;
            (0..half).map(|i| (-(i as f64) * step).exp()).collect()
        };

        Array2::from_shape_fn((max_seq_len, encoding_dim), |(pos, j)| {
            let pos = pos as f64;
            if j < half {
                (pos * freqs[j]).sin() as f32
            } else {
                (pos * freqs[j - half]).cos() as f32
            }
        })
    }

    pub fn table(&self) -> &Array2<f32> {
        &self.table
    }
}

impl PositionEncoder for SinusoidalPositionEncoder {
    fn encoding_dim(&self) -> usize {
        self.table.ncols()
    }

    fn max_seq_len(&self) -> Option<usize> {
        Some(self.table.nrows())
    }

    fn forward(
        &self,
        seqs: Array3<f32>,
        _padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
    ) -> Result<Array3<f32>> {
        add_table_rows(seqs, &self.table, start_step(state_bag))
    }
}

/// Learned position embeddings, one row per position.
#[derive(Debug, Clone)]
pub struct LearnedPositionEncoder {
    weight: Array2<f32>,
}

impl LearnedPositionEncoder {
    pub fn new<R: Rng + ?Sized>(encoding_dim: usize, max_seq_len: usize, rng: &mut R) -> Self {
        Self {
            weight: Array2::random_using((max_seq_len, encoding_dim), StandardNormal, rng),
        }
    }

    pub fn from_weight(weight: Array2<f32>) -> Self {
        Self { weight }
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }
}

impl PositionEncoder for LearnedPositionEncoder {
    fn encoding_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn max_seq_len(&self) -> Option<usize> {
        Some(self.weight.nrows())
    }

    fn forward(
        &self,
        seqs: Array3<f32>,
        _padding_mask: Option<&Array2<f32>>,
        state_bag: Option<&mut IncrementalStateBag>,
    ) -> Result<Array3<f32>> {
        add_table_rows(seqs, &self.weight, start_step(state_bag))
    }
}
