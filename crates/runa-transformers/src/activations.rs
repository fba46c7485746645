//! Activation functions and softmax operations.

use std::str::FromStr;

use ndarray::{Array1, Array3, ArrayBase, Axis, DataMut, Dimension, Ix1};
use serde::{Deserialize, Serialize};

/// Minimum array size for parallel execution.
pub const PARALLEL_THRESHOLD: usize = 16_384;

const SQRT_2_OVER_PI: f32 = 0.7978845608;
const GELU_COEFF: f32 = 0.044715;

/// Supported activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    #[serde(alias = "gelu_new")]
    Gelu,
    #[serde(alias = "swish")]
    Silu,
    Tanh,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "gelu" | "gelu_new" => Ok(Activation::Gelu),
            "silu" | "swish" => Ok(Activation::Silu),
            "tanh" => Ok(Activation::Tanh),
            _ => Err(format!("unknown activation function: {}", s)),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Relu
    }
}

#[inline(always)]
pub fn relu_scalar(x: f32) -> f32 {
    x.max(0.0)
}

#[inline(always)]
pub fn gelu_scalar(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

#[inline(always)]
pub fn silu_scalar(x: f32) -> f32 {
    if x <= -20.0 {
        0.0
    } else if x >= 20.0 {
        x
    } else {
        x / (1.0 + (-x).exp())
    }
}

impl Activation {
    #[inline(always)]
    pub fn scalar(&self, x: f32) -> f32 {
        match self {
            Activation::Relu => relu_scalar(x),
            Activation::Gelu => gelu_scalar(x),
            Activation::Silu => silu_scalar(x),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Applies activation in-place to an array of any rank.
pub fn apply_activation<S, D>(arr: &mut ArrayBase<S, D>, activation: Activation)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
{
    if arr.len() >= PARALLEL_THRESHOLD {
        arr.par_mapv_inplace(|x| activation.scalar(x));
    } else {
        arr.mapv_inplace(|x| activation.scalar(x));
    }
}

/// Applies softmax in-place to a slice.
pub fn softmax_inplace(slice: &mut [f32]) {
    if slice.is_empty() {
        return;
    }

    let max = slice.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    if max == f32::NEG_INFINITY {
        // Fully masked row
        slice.iter_mut().for_each(|v| *v = 0.0);
        return;
    }

    let mut sum = 0.0;
    for v in slice.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    if sum > 0.0 {
        let scale = 1.0 / sum;
        for v in slice.iter_mut() {
            *v *= scale;
        }
    }
}

/// Applies softmax along the last axis of a 3D array.
pub fn softmax_last_axis_inplace(scores: &mut Array3<f32>) {
    scores.lanes_mut(Axis(2)).into_iter().for_each(|mut row| {
        if let Some(slice) = row.as_slice_mut() {
            softmax_inplace(slice);
        } else {
            let mut owned = row.to_vec();
            softmax_inplace(&mut owned);
            row.iter_mut().zip(owned).for_each(|(dst, src)| *dst = src);
        }
    });
}

/// Numerically stable log-softmax of a 1D array.
pub fn log_softmax_1d<S>(logits: &ArrayBase<S, Ix1>) -> Array1<f32>
where
    S: ndarray::Data<Elem = f32>,
{
    let max_val = logits.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let scaled_logits = logits.mapv(|x| x - max_val);
    let exp_sum = scaled_logits.mapv(f32::exp).sum();
    scaled_logits - exp_sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_softmax_inplace_sums_to_one() {
        let mut v = [1.0, 2.0, 3.0];
        softmax_inplace(&mut v);
        assert!((v.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(v[2] > v[1] && v[1] > v[0]);
    }

    #[test]
    fn test_softmax_masked_entries_are_zero() {
        let mut v = [0.0, f32::NEG_INFINITY, 0.0];
        softmax_inplace(&mut v);
        assert_eq!(v[1], 0.0);
        assert!((v[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_fully_masked_row() {
        let mut v = [f32::NEG_INFINITY, f32::NEG_INFINITY];
        softmax_inplace(&mut v);
        assert_eq!(v, [0.0, 0.0]);
    }

    #[test]
    fn test_softmax_last_axis() {
        let mut scores = Array3::from_shape_vec((1, 2, 2), vec![0.0, 0.0, 1000.0, 1000.0]).unwrap();
        softmax_last_axis_inplace(&mut scores);
        for v in scores.iter() {
            assert!((v - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_log_softmax_matches_log_of_softmax() {
        let logits = array![1.0f32, 2.0, 3.0];
        let log_probs = log_softmax_1d(&logits);

        let mut probs = logits.to_vec();
        softmax_inplace(&mut probs);
        for i in 0..3 {
            assert!((log_probs[i] - probs[i].ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_activation_from_str() {
        assert_eq!("ReLU".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("swish".parse::<Activation>().unwrap(), Activation::Silu);
        assert!("nope".parse::<Activation>().is_err());
    }

    #[test]
    fn test_apply_relu() {
        let mut x = array![[-1.0f32, 2.0], [0.5, -0.5]];
        apply_activation(&mut x, Activation::Relu);
        assert_eq!(x, array![[0.0, 2.0], [0.5, 0.0]]);
    }
}
