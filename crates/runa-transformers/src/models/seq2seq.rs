use ndarray::{Array1, Array2};

/// A batch of source and target sequences for sequence-to-sequence models.
#[derive(Debug, Clone)]
pub struct Seq2SeqBatch {
    /// `[batch, source_seq_len]`
    pub source_seqs: Array2<u32>,
    pub source_seq_lens: Option<Array1<usize>>,
    /// `[batch, target_seq_len]`
    pub target_seqs: Array2<u32>,
    pub target_seq_lens: Option<Array1<usize>>,
}

impl Seq2SeqBatch {
    pub fn batch_size(&self) -> usize {
        self.target_seqs.nrows()
    }

    /// Number of source elements, excluding padding.
    pub fn num_source_elements(&self) -> usize {
        count_elements(&self.source_seqs, self.source_seq_lens.as_ref())
    }

    /// Number of target elements, excluding padding.
    pub fn num_target_elements(&self) -> usize {
        count_elements(&self.target_seqs, self.target_seq_lens.as_ref())
    }
}

fn count_elements(seqs: &Array2<u32>, seq_lens: Option<&Array1<usize>>) -> usize {
    match seq_lens {
        Some(lens) => lens.sum(),
        None => seqs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_element_counts() {
        let batch = Seq2SeqBatch {
            source_seqs: Array2::zeros((2, 5)),
            source_seq_lens: Some(array![5, 2]),
            target_seqs: Array2::zeros((2, 4)),
            target_seq_lens: None,
        };

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.num_source_elements(), 7);
        assert_eq!(batch.num_target_elements(), 8);
    }
}
