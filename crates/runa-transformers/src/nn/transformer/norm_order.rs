use serde::{Deserialize, Serialize};

/// Where layer normalization is applied inside a Transformer layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerNormOrder {
    /// After the residual connection, as in the original Transformer.
    #[default]
    Post,
    /// Before each sublayer.
    Pre,
    /// Pre-normalization with the extra NormFormer layer norms.
    PreWithNormformer,
}
