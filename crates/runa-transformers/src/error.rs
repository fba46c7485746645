//! Configuration errors raised while assembling modules.

use thiserror::Error;

use crate::traits::Device;

/// Errors that can occur when constructing a module.
///
/// These are fatal and surface at construction time. Errors raised during a
/// forward pass are plain `anyhow::Error`s and propagate unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Position encoder and embedding table disagree on dimensionality.
    #[error(
        "`encoding_dim` of `pos_encoder` and `embedding_dim` of `embed` must be equal, but are {encoding_dim} and {model_dim} instead"
    )]
    DimensionMismatch { encoding_dim: usize, model_dim: usize },

    /// Dropout probability outside of `[0, 1)`.
    #[error("dropout probability must be in [0, 1), but is {0} instead")]
    InvalidDropoutProbability(f32),

    /// The CPU modules cannot be materialized on the requested device.
    #[error("device {0:?} is not supported by this module")]
    UnsupportedDevice(Device),

    /// Any other invalid constructor argument.
    #[error("{0}")]
    InvalidArgument(String),
}

/// Result type for module construction.
pub type ConfigResult<T> = Result<T, ConfigError>;
