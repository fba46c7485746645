mod frontend;
mod model;

pub use frontend::{
    FrontendOptions, TransformerEmbeddingFrontend, TransformerEmbeddingFrontendBuilder,
    TransformerFrontend,
};
pub use model::TransformerModel;

#[cfg(test)]
mod tests;
