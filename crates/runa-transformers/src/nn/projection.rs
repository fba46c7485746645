//! Linear projections applied to the last axis of `[batch, seq_len, dim]` tensors.

use std::sync::Arc;

use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Array3};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;

use crate::error::{ConfigError, ConfigResult};

/// Applies a linear transformation to incoming data.
pub trait Projection: Send + Sync {
    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;

    fn forward(&self, x: &Array3<f32>) -> Result<Array3<f32>>;
}

/// `x · Wᵀ (+ b)` with `W` laid out `[out_features, in_features]`.
fn project(x: &Array3<f32>, weight: &Array2<f32>, bias: Option<&Array1<f32>>) -> Result<Array3<f32>> {
    let (batch_size, seq_len, in_dim) = x.dim();
    let (out_dim, weight_in_dim) = weight.dim();

    if in_dim != weight_in_dim {
        bail!(
            "projection expects a last dimension of {}, but the input has {}",
            weight_in_dim,
            in_dim
        );
    }

    let x_2d = x.to_shape((batch_size * seq_len, in_dim))?;
    let mut out = x_2d.dot(&weight.t());

    if let Some(bias) = bias {
        out += bias;
    }

    Ok(out.into_shape_with_order((batch_size, seq_len, out_dim))?)
}

#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Option<Array1<f32>>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Option<Array1<f32>>) -> ConfigResult<Self> {
        if let Some(b) = &bias {
            if b.len() != weight.nrows() {
                return Err(ConfigError::InvalidArgument(format!(
                    "bias length ({}) must match the number of output features ({})",
                    b.len(),
                    weight.nrows()
                )));
            }
        }
        Ok(Self { weight, bias })
    }

    /// Uniform `(-1/√in, 1/√in)` initialization.
    pub fn init<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, bias: bool, rng: &mut R) -> Self {
        let bound = 1.0 / (input_dim.max(1) as f32).sqrt();
        let dist = Uniform::new(-bound, bound);

        let weight = Array2::random_using((output_dim, input_dim), dist, rng);
        let bias = bias.then(|| Array1::random_using(output_dim, dist, rng));

        Self { weight, bias }
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Array1<f32>> {
        self.bias.as_ref()
    }
}

impl Projection for Linear {
    fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn output_dim(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: &Array3<f32>) -> Result<Array3<f32>> {
        project(x, &self.weight, self.bias.as_ref())
    }
}

/// Projects onto a vocabulary by reusing an embedding table as the weight.
#[derive(Debug, Clone)]
pub struct TiedProjection {
    weight: Arc<Array2<f32>>,
}

impl TiedProjection {
    pub fn new(weight: Arc<Array2<f32>>) -> Self {
        Self { weight }
    }
}

impl Projection for TiedProjection {
    fn input_dim(&self) -> usize {
        self.weight.ncols()
    }

    fn output_dim(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: &Array3<f32>) -> Result<Array3<f32>> {
        project(x, &self.weight, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_linear_forward() {
        let linear = Linear::new(array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]], Some(array![0.5, 0.0, -1.0]))
            .unwrap();

        let x = Array3::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = linear.forward(&x).unwrap();

        assert_eq!(y.dim(), (1, 2, 3));
        assert_eq!(y.into_raw_vec_and_offset().0, vec![1.5, 4.0, 2.0, 3.5, 8.0, 6.0]);
    }

    #[test]
    fn test_input_dim_mismatch() {
        let linear = Linear::new(Array2::zeros((3, 2)), None).unwrap();
        assert!(linear.forward(&Array3::zeros((1, 1, 4))).is_err());
    }

    #[test]
    fn test_bad_bias_is_rejected() {
        assert!(Linear::new(Array2::zeros((3, 2)), Some(Array1::zeros(2))).is_err());
    }

    #[test]
    fn test_init_respects_bound() {
        let mut rng = StdRng::seed_from_u64(0);
        let linear = Linear::init(16, 4, true, &mut rng);
        assert_eq!(linear.weight().dim(), (4, 16));
        assert!(linear.weight().iter().all(|v| v.abs() <= 0.25));
        assert_eq!(linear.bias().map(|b| b.len()), Some(4));
    }

    #[test]
    fn test_tied_projection_shares_table() {
        let table = Arc::new(array![[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let proj = TiedProjection::new(table.clone());

        let x = Array3::from_shape_vec((1, 1, 2), vec![2.0, 3.0]).unwrap();
        let logits = proj.forward(&x).unwrap();

        assert_eq!(proj.output_dim(), 3);
        assert_eq!(logits.into_raw_vec_and_offset().0, vec![2.0, 3.0, 5.0]);
        assert_eq!(Arc::strong_count(&table), 2);
    }
}
