use std::fmt::Debug;

use anyhow::{Result, bail};
use ndarray::{ArrayView1, ArrayView2};

/// Candidates produced by one beam search step, sorted by descending score.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamStep {
    /// Cumulative score of each candidate.
    pub scores: Vec<f32>,
    /// Token appended by each candidate.
    pub vocab_indices: Vec<u32>,
    /// Beam each candidate extends.
    pub beam_indices: Vec<usize>,
}

impl BeamStep {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Selects the next candidates of a single search.
pub trait BeamSearch: Debug + Send + Sync {
    /// Takes a step.
    ///
    /// `lprobs` holds the next-step log probabilities of each beam,
    /// `[beam_size, vocab_size]`; `last_scores` holds the cumulative score
    /// of each beam so far. On the start step all beams are identical.
    fn step(
        &self,
        step_nr: usize,
        is_start_step: bool,
        lprobs: ArrayView2<'_, f32>,
        last_scores: ArrayView1<'_, f32>,
    ) -> Result<BeamStep>;
}

/// Ranks every `(beam, token)` continuation by cumulative score and keeps
/// the best `min(2 * beam_size, vocab_size - 1)`.
///
/// Twice the beam size is kept so that enough candidates survive after the
/// ones ending in EOS are set aside.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBeamSearch;

impl BeamSearch for StandardBeamSearch {
    fn step(
        &self,
        _step_nr: usize,
        is_start_step: bool,
        lprobs: ArrayView2<'_, f32>,
        last_scores: ArrayView1<'_, f32>,
    ) -> Result<BeamStep> {
        let (beam_size, vocab_size) = lprobs.dim();

        if last_scores.len() != beam_size {
            bail!(
                "`last_scores` has {} elements, but there are {} beams",
                last_scores.len(),
                beam_size
            );
        }
        if beam_size == 0 || vocab_size < 2 {
            bail!("cannot search over {} beams and {} tokens", beam_size, vocab_size);
        }

        // The beams of the first step are copies of each other.
        let num_active = if is_start_step { 1 } else { beam_size };

        let mut candidates: Vec<(f32, usize, u32)> = Vec::with_capacity(num_active * vocab_size);
        for (beam_idx, beam_lprobs) in lprobs.outer_iter().take(num_active).enumerate() {
            let last_score = last_scores[beam_idx];
            for (vocab_idx, &lprob) in beam_lprobs.iter().enumerate() {
                candidates.push((lprob + last_score, beam_idx, vocab_idx as u32));
            }
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate((2 * beam_size).min(vocab_size - 1));

        let mut step = BeamStep {
            scores: Vec::with_capacity(candidates.len()),
            vocab_indices: Vec::with_capacity(candidates.len()),
            beam_indices: Vec::with_capacity(candidates.len()),
        };
        for (score, beam_idx, vocab_idx) in candidates {
            step.scores.push(score);
            step.vocab_indices.push(vocab_idx);
            step.beam_indices.push(beam_idx);
        }

        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, array};

    #[test]
    fn test_start_step_only_expands_first_beam() {
        let lprobs = array![[-1.0f32, -0.5, -3.0, -2.0], [-0.1, -0.1, -0.1, -0.1]];
        let step = StandardBeamSearch
            .step(0, true, lprobs.view(), Array1::zeros(2).view())
            .unwrap();

        // min(2 * 2, 4 - 1) = 3
        assert_eq!(step.len(), 3);
        assert_eq!(step.beam_indices, vec![0, 0, 0]);
        assert_eq!(step.vocab_indices, vec![1, 0, 3]);
        assert_eq!(step.scores, vec![-0.5, -1.0, -2.0]);
    }

    #[test]
    fn test_scores_are_cumulative() {
        let lprobs = array![
            [-1.0f32, -2.0, -3.0, -4.0, -5.0, -6.0],
            [-0.5, -2.5, -3.5, -4.5, -5.5, -6.5]
        ];
        let last_scores = array![-1.0f32, -3.0];

        let step = StandardBeamSearch.step(3, false, lprobs.view(), last_scores.view()).unwrap();

        assert_eq!(step.len(), 4);
        assert_eq!(step.scores, vec![-2.0, -3.0, -3.5, -4.0]);
        assert_eq!(step.beam_indices, vec![0, 0, 1, 0]);
        assert_eq!(step.vocab_indices, vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_mismatched_scores() {
        let lprobs = Array2::<f32>::zeros((2, 4));
        assert!(StandardBeamSearch.step(0, false, lprobs.view(), Array1::zeros(3).view()).is_err());
    }
}
