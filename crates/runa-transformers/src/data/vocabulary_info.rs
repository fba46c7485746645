use serde::{Deserialize, Serialize};

/// Describes the vocabulary used by a tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyInfo {
    /// Number of tokens in the vocabulary.
    pub size: usize,
    pub unk_idx: Option<u32>,
    pub bos_idx: Option<u32>,
    pub eos_idx: Option<u32>,
    pub pad_idx: Option<u32>,
}

impl VocabularyInfo {
    pub fn new(
        size: usize,
        unk_idx: Option<u32>,
        bos_idx: Option<u32>,
        eos_idx: Option<u32>,
        pad_idx: Option<u32>,
    ) -> Self {
        Self { size, unk_idx, bos_idx, eos_idx, pad_idx }
    }
}
