//! Vocabulary metadata, batch collation and text tokenization.

mod collater;
pub mod text;
mod vocabulary_info;

pub use collater::{Collater, SequenceData};
pub use vocabulary_info::VocabularyInfo;
