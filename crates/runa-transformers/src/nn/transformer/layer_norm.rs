use std::sync::Arc;

use log::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::nn::{LayerNorm, StandardLayerNorm};
use crate::traits::{DType, Device};

/// Constructs layer normalization modules of a given dimensionality.
pub type LayerNormFactory = Arc<
    dyn Fn(usize, Option<Device>, Option<DType>) -> ConfigResult<Box<dyn LayerNorm>> + Send + Sync,
>;

pub const DEFAULT_LAYER_NORM_EPS: f32 = 1e-5;

/// Creates the default layer norm: affine, `eps = 1e-5`, on the CPU.
pub fn create_default_layer_norm(
    model_dim: usize,
    device: Option<Device>,
    dtype: Option<DType>,
) -> ConfigResult<Box<dyn LayerNorm>> {
    let device = device.unwrap_or_default();
    if !device.is_cpu() {
        return Err(ConfigError::UnsupportedDevice(device));
    }

    if let Some(dtype) = dtype {
        if dtype != DType::F32 {
            debug!("layer norm parameters are kept in f32 (requested {:?})", dtype);
        }
    }

    Ok(Box::new(StandardLayerNorm::new(model_dim, DEFAULT_LAYER_NORM_EPS, true)))
}

pub fn default_layer_norm_factory() -> LayerNormFactory {
    Arc::new(create_default_layer_norm)
}
