use anyhow::{Result, bail};
use ndarray::{Array2, Array3, Axis};

use crate::activations::log_softmax_1d;

/// Output of a sequence model.
#[derive(Debug, Clone)]
pub struct SequenceModelOutput {
    /// Unnormalized scores, `[batch, seq_len, vocab_size]`.
    pub logits: Array3<f32>,
    /// Index of the padding token in the target vocabulary.
    pub pad_idx: Option<u32>,
}

impl SequenceModelOutput {
    pub fn new(logits: Array3<f32>, pad_idx: Option<u32>) -> Self {
        Self { logits, pad_idx }
    }

    /// Summed negative log-likelihood of `targets` (`[batch, seq_len]`).
    ///
    /// Positions holding `pad_idx` do not contribute.
    pub fn compute_loss(&self, targets: &Array2<u32>) -> Result<f32> {
        let (batch_size, seq_len, vocab_size) = self.logits.dim();

        if targets.dim() != (batch_size, seq_len) {
            bail!(
                "targets {:?} don't match logits {:?}",
                targets.dim(),
                self.logits.dim()
            );
        }

        let mut loss = 0.0;
        for (logits, targets) in self.logits.outer_iter().zip(targets.outer_iter()) {
            for (step_logits, &target) in logits.axis_iter(Axis(0)).zip(targets.iter()) {
                if Some(target) == self.pad_idx {
                    continue;
                }
                if target as usize >= vocab_size {
                    bail!("target index {} is out of range for a vocabulary of {}", target, vocab_size);
                }
                loss -= log_softmax_1d(&step_logits)[target as usize];
            }
        }

        Ok(loss)
    }
}
