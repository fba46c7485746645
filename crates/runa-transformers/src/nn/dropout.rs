use ndarray::{Array, Dimension};
use rand::Rng;

use crate::error::{ConfigError, ConfigResult};
use crate::nn::ForwardMode;

/// Inverted dropout.
///
/// In `ForwardMode::Train` each element is zeroed with probability `p` and
/// the survivors are scaled by `1 / (1 - p)`. With `p == 1` everything is
/// zeroed. In `ForwardMode::Eval` the input is returned untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    pub fn new(p: f32) -> ConfigResult<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidDropoutProbability(p));
        }
        Ok(Self { p })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    pub fn forward<D: Dimension>(
        &self,
        mut x: Array<f32, D>,
        mode: &mut ForwardMode<'_>,
    ) -> Array<f32, D> {
        let Some(rng) = mode.rng() else {
            return x;
        };
        if self.p == 0.0 {
            return x;
        }
        if self.p == 1.0 {
            x.fill(0.0);
            return x;
        }

        let keep_scale = 1.0 / (1.0 - self.p);
        x.iter_mut().for_each(|v| {
            if rng.r#gen::<f32>() < self.p {
                *v = 0.0;
            } else {
                *v *= keep_scale;
            }
        });
        x
    }
}

impl std::fmt::Display for Dropout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dropout(p={})", self.p)
    }
}
