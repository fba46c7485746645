use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Result, bail};
use ndarray::{Array2, ArrayView2};

use crate::error::{ConfigError, ConfigResult};

/// Modifies next-step log probabilities in place before beam selection.
pub trait LogitsProcessor: Debug + Send + Sync {
    /// `seqs` is `[batch, step_nr + 1]`, the sequences generated so far;
    /// `lprobs` is `[batch, vocab_size]`.
    fn process(&self, seqs: ArrayView2<'_, u32>, lprobs: &mut Array2<f32>) -> Result<()>;
}

fn check_batch(seqs: &ArrayView2<'_, u32>, lprobs: &Array2<f32>) -> Result<()> {
    if seqs.nrows() != lprobs.nrows() {
        bail!(
            "`seqs` has {} rows, but `lprobs` has {}",
            seqs.nrows(),
            lprobs.nrows()
        );
    }
    Ok(())
}

/// Prevents the generation of banned token sequences.
///
/// The last token of a banned sequence gets `-inf` wherever the generated
/// sequence ends with the rest of it.
#[derive(Debug, Clone)]
pub struct BannedSequenceLogitsProcessor {
    banned: Vec<(Vec<u32>, u32)>,
}

impl BannedSequenceLogitsProcessor {
    pub fn new(banned_seqs: Vec<Vec<u32>>) -> ConfigResult<Self> {
        let mut banned = Vec::with_capacity(banned_seqs.len());

        for mut seq in banned_seqs {
            let Some(last) = seq.pop() else {
                return Err(ConfigError::InvalidArgument(
                    "`banned_seqs` must not contain an empty sequence".to_string(),
                ));
            };
            banned.push((seq, last));
        }

        Ok(Self { banned })
    }
}

impl LogitsProcessor for BannedSequenceLogitsProcessor {
    fn process(&self, seqs: ArrayView2<'_, u32>, lprobs: &mut Array2<f32>) -> Result<()> {
        check_batch(&seqs, lprobs)?;

        let vocab_size = lprobs.ncols();
        let seq_len = seqs.ncols();

        for (seq, mut row) in seqs.outer_iter().zip(lprobs.outer_iter_mut()) {
            for (prefix, token) in &self.banned {
                if *token as usize >= vocab_size {
                    bail!("banned token {} is out of range for a vocabulary of {}", token, vocab_size);
                }
                if prefix.len() > seq_len {
                    continue;
                }

                let tail = seq.iter().skip(seq_len - prefix.len());
                if tail.eq(prefix.iter()) {
                    row[*token as usize] = f32::NEG_INFINITY;
                }
            }
        }

        Ok(())
    }
}

/// Bans any token that would repeat an n-gram already present in the sequence.
#[derive(Debug, Clone, Copy)]
pub struct NoRepeatNgramLogitsProcessor {
    ngram_size: usize,
}

impl NoRepeatNgramLogitsProcessor {
    pub fn new(ngram_size: usize) -> ConfigResult<Self> {
        if ngram_size == 0 {
            return Err(ConfigError::InvalidArgument("`ngram_size` must be at least 1".to_string()));
        }
        Ok(Self { ngram_size })
    }
}

impl LogitsProcessor for NoRepeatNgramLogitsProcessor {
    fn process(&self, seqs: ArrayView2<'_, u32>, lprobs: &mut Array2<f32>) -> Result<()> {
        check_batch(&seqs, lprobs)?;

        let n = self.ngram_size;
        for (seq, mut row) in seqs.outer_iter().zip(lprobs.outer_iter_mut()) {
            let tokens = seq.to_vec();
            if tokens.len() + 1 < n {
                continue;
            }

            // The last n-1 tokens form the prefix of the next n-gram.
            let current_prefix = &tokens[tokens.len() + 1 - n..];
            for window in tokens.windows(n) {
                if &window[..n - 1] == current_prefix {
                    let banned = window[n - 1] as usize;
                    if banned < row.len() {
                        row[banned] = f32::NEG_INFINITY;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Penalizes tokens already present in the sequence.
///
/// Negative scores are multiplied by `penalty`, positive ones divided by it.
#[derive(Debug, Clone, Copy)]
pub struct RepetitionPenaltyLogitsProcessor {
    penalty: f32,
}

impl RepetitionPenaltyLogitsProcessor {
    pub fn new(penalty: f32) -> ConfigResult<Self> {
        if !(penalty > 0.0) {
            return Err(ConfigError::InvalidArgument(format!(
                "`penalty` must be positive, but is {penalty} instead"
            )));
        }
        Ok(Self { penalty })
    }
}

impl LogitsProcessor for RepetitionPenaltyLogitsProcessor {
    fn process(&self, seqs: ArrayView2<'_, u32>, lprobs: &mut Array2<f32>) -> Result<()> {
        check_batch(&seqs, lprobs)?;

        if self.penalty == 1.0 {
            return Ok(());
        }

        for (seq, mut row) in seqs.outer_iter().zip(lprobs.outer_iter_mut()) {
            let mut seen = seq.to_vec();
            seen.sort_unstable();
            seen.dedup();

            let vocab_size = row.len();
            for idx in seen.into_iter().map(|t| t as usize).filter(|&i| i < vocab_size) {
                let score = row[idx];
                row[idx] = if score < 0.0 { score * self.penalty } else { score / self.penalty };
            }
        }

        Ok(())
    }
}

/// Applies several processors in order.
#[derive(Debug, Clone, Default)]
pub struct ComposedLogitsProcessor {
    processors: Vec<Arc<dyn LogitsProcessor>>,
}

impl ComposedLogitsProcessor {
    pub fn new(processors: Vec<Arc<dyn LogitsProcessor>>) -> Self {
        Self { processors }
    }

    pub fn push(&mut self, processor: Arc<dyn LogitsProcessor>) {
        self.processors.push(processor);
    }
}

impl LogitsProcessor for ComposedLogitsProcessor {
    fn process(&self, seqs: ArrayView2<'_, u32>, lprobs: &mut Array2<f32>) -> Result<()> {
        for processor in &self.processors {
            processor.process(seqs.view(), lprobs)?;
        }
        Ok(())
    }
}
