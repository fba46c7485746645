use anyhow::{Result, bail};
use ndarray::{Array1, Array2};

/// A batch of token sequences padded to a common length.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceData {
    /// `[batch, max_seq_len]`
    pub seqs: Array2<u32>,
    /// Length of each sequence before padding.
    pub seq_lens: Array1<usize>,
    /// `true` if the sequences had different lengths.
    pub is_ragged: bool,
}

/// Concatenates token sequences into a single padded batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct Collater {
    pad_idx: Option<u32>,
}

impl Collater {
    pub fn new(pad_idx: Option<u32>) -> Self {
        Self { pad_idx }
    }

    pub fn collate(&self, seqs: &[Vec<u32>]) -> Result<SequenceData> {
        if seqs.is_empty() {
            bail!("cannot collate an empty batch");
        }

        let seq_lens = Array1::from_iter(seqs.iter().map(Vec::len));
        let max_len = seq_lens.iter().copied().max().unwrap_or(0);
        let is_ragged = seq_lens.iter().any(|&len| len != max_len);

        let pad_idx = match (self.pad_idx, is_ragged) {
            (Some(pad_idx), _) => pad_idx,
            (None, false) => 0,
            (None, true) => {
                bail!("sequences of a batch must have the same length when no padding index is set")
            }
        };

        let mut batch = Array2::from_elem((seqs.len(), max_len), pad_idx);
        for (mut row, seq) in batch.rows_mut().into_iter().zip(seqs) {
            for (dst, &idx) in row.iter_mut().zip(seq) {
                *dst = idx;
            }
        }

        Ok(SequenceData { seqs: batch, seq_lens, is_ragged })
    }
}
