//! Beam-search generation over an encoder-decoder model.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use ndarray::{Array2, Array3, Axis, s};
use serde::{Deserialize, Serialize};

use crate::activations::log_softmax_1d;
use crate::data::{Collater, SequenceData, VocabularyInfo};
use crate::error::{ConfigError, ConfigResult};
use crate::generation::{BeamSearch, LogitsProcessor, StandardBeamSearch};
use crate::models::Seq2SeqDecoder;
use crate::nn::{ForwardMode, IncrementalStateBag};

/// A finished sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// The generated sequence, including the prefix and the final EOS.
    pub seq: Vec<u32>,
    /// Score of the sequence, length-normalized if requested.
    pub score: f32,
    /// Score contributed by each step; the first element is always `0`.
    pub step_scores: Vec<f32>,
}

/// Hypotheses of every search of a batch, best first.
#[derive(Debug, Clone)]
pub struct SequenceGeneratorOutput {
    pub results: Vec<Vec<Hypothesis>>,
    pub pad_idx: Option<u32>,
}

impl SequenceGeneratorOutput {
    /// Best hypothesis of each search, `None` if a search produced nothing.
    pub fn best(&self) -> Vec<Option<&Hypothesis>> {
        self.results.iter().map(|hypotheses| hypotheses.first()).collect()
    }

    /// Pads the `hypo_idx`-th hypothesis of every search into a single batch.
    pub fn collate(&self, hypo_idx: usize) -> Result<SequenceData> {
        let seqs = self
            .results
            .iter()
            .enumerate()
            .map(|(i, hypotheses)| {
                hypotheses.get(hypo_idx).map(|h| h.seq.clone()).ok_or_else(|| {
                    anyhow!("search {} has no hypothesis at index {}", i, hypo_idx)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Collater::new(self.pad_idx).collate(&seqs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceGeneratorOptions {
    /// Number of hypotheses kept per search.
    pub beam_size: usize,
    /// Minimum length of generated sequences, EOS excluded.
    pub min_seq_len: usize,
    /// `(a, b)` so that the maximum length is `a * source_seq_len + b`.
    pub soft_max_seq_len: Option<(usize, usize)>,
    /// Absolute maximum length of generated sequences.
    pub hard_max_seq_len: usize,
    /// Exponent of the length normalization.
    pub len_penalty: f32,
    /// Subtracted from the UNK log probability.
    pub unk_penalty: f32,
    /// Divide final scores by `(length)^len_penalty`.
    pub normalize_scores: bool,
    /// Defaults to `StandardBeamSearch`.
    #[serde(skip)]
    pub search: Option<Arc<dyn BeamSearch>>,
    #[serde(skip)]
    pub logits_processor: Option<Arc<dyn LogitsProcessor>>,
}

impl Default for SequenceGeneratorOptions {
    fn default() -> Self {
        Self {
            beam_size: 5,
            min_seq_len: 1,
            soft_max_seq_len: Some((1, 200)),
            hard_max_seq_len: 1024,
            len_penalty: 1.0,
            unk_penalty: 0.0,
            normalize_scores: true,
            search: None,
            logits_processor: None,
        }
    }
}

/// Generates target sequences from encoder output with beam search.
pub struct Seq2SeqGenerator {
    decoder: Arc<dyn Seq2SeqDecoder>,
    vocab_info: VocabularyInfo,
    eos_idx: u32,
    prefix_seq: Vec<u32>,
    beam_size: usize,
    search: Arc<dyn BeamSearch>,
    opts: SequenceGeneratorOptions,
}

impl Seq2SeqGenerator {
    /// `prefix_seq` is the sequence every hypothesis starts with; it
    /// defaults to the BOS token.
    pub fn new(
        decoder: Arc<dyn Seq2SeqDecoder>,
        vocab_info: VocabularyInfo,
        prefix_seq: Option<Vec<u32>>,
        opts: SequenceGeneratorOptions,
    ) -> ConfigResult<Self> {
        let eos_idx = vocab_info.eos_idx.ok_or_else(|| {
            ConfigError::InvalidArgument("`vocab_info` must have `eos_idx` set".to_string())
        })?;

        let special = [vocab_info.unk_idx, vocab_info.bos_idx, Some(eos_idx), vocab_info.pad_idx];
        if let Some(idx) = special.into_iter().flatten().find(|&i| i as usize >= vocab_info.size) {
            return Err(ConfigError::InvalidArgument(format!(
                "special token index {idx} is out of range for a vocabulary of {}",
                vocab_info.size
            )));
        }

        let prefix_seq = match prefix_seq {
            Some(prefix_seq) => prefix_seq,
            None => vec![vocab_info.bos_idx.ok_or_else(|| {
                ConfigError::InvalidArgument(
                    "`vocab_info` must have `bos_idx` set if `prefix_seq` is not given".to_string(),
                )
            })?],
        };

        if prefix_seq.is_empty() {
            return Err(ConfigError::InvalidArgument(
                "`prefix_seq` must contain at least one element".to_string(),
            ));
        }

        let beam_size = opts.beam_size.min(vocab_info.size);
        if beam_size == 0 {
            return Err(ConfigError::InvalidArgument(
                "`beam_size` must be greater than zero".to_string(),
            ));
        }

        let search: Arc<dyn BeamSearch> = match &opts.search {
            Some(search) => search.clone(),
            None => Arc::new(StandardBeamSearch),
        };

        Ok(Self { decoder, vocab_info, eos_idx, prefix_seq, beam_size, search, opts })
    }

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    pub fn prefix_seq(&self) -> &[u32] {
        &self.prefix_seq
    }

    pub fn eos_idx(&self) -> u32 {
        self.eos_idx
    }

    pub fn options(&self) -> &SequenceGeneratorOptions {
        &self.opts
    }

    /// Maximum length of generated sequences, prefix and EOS included.
    pub fn max_seq_len(&self, source_seq_len: Option<usize>) -> usize {
        match (self.opts.soft_max_seq_len, source_seq_len) {
            (Some((a, b)), Some(len)) => (a * len + b).min(self.opts.hard_max_seq_len),
            _ => self.opts.hard_max_seq_len,
        }
    }

    /// Generates hypotheses for every sequence of `encoder_output`
    /// (`[batch, source_seq_len, model_dim]`).
    pub fn generate(
        &self,
        encoder_output: &Array3<f32>,
        encoder_padding_mask: Option<&Array2<f32>>,
        source_seq_len: Option<usize>,
    ) -> Result<SequenceGeneratorOutput> {
        let start = Instant::now();

        let (num_searches, encoder_seq_len, _) = encoder_output.dim();

        if let Some(mask) = encoder_padding_mask {
            if mask.dim() != (num_searches, encoder_seq_len) {
                bail!(
                    "encoder padding mask {:?} doesn't match encoder output {:?}",
                    mask.dim(),
                    encoder_output.dim()
                );
            }
        }

        let max_seq_len = self.max_seq_len(source_seq_len);
        let prefix_len = self.prefix_seq.len();

        if max_seq_len == 0 {
            bail!("the maximum sequence length must be greater than zero");
        }
        if prefix_len >= max_seq_len {
            bail!(
                "the prefix sequence ({} tokens) must be shorter than the maximum sequence length ({})",
                prefix_len,
                max_seq_len
            );
        }

        if num_searches == 0 {
            return Ok(SequenceGeneratorOutput { results: Vec::new(), pad_idx: self.vocab_info.pad_idx });
        }

        // Every search runs `beam_size` beams over the same encoder output.
        let fan_out: Vec<usize> = (0..num_searches)
            .flat_map(|i| std::iter::repeat(i).take(self.beam_size))
            .collect();

        let mut state = SearchState {
            generator: self,
            encoder_output: encoder_output.select(Axis(0), &fan_out),
            encoder_padding_mask: encoder_padding_mask.map(|m| m.select(Axis(0), &fan_out)),
            state_bag: IncrementalStateBag::new(),
            max_seq_len,
            seqs: Array2::from_elem(
                (fan_out.len(), max_seq_len),
                self.vocab_info.pad_idx.unwrap_or(0),
            ),
            scores: Array2::zeros((fan_out.len(), max_seq_len)),
            active_searches: (0..num_searches).collect(),
            results: vec![Vec::new(); num_searches],
        };

        state.bootstrap()?;

        let mut num_steps = 0;
        for step_nr in (prefix_len - 1)..(max_seq_len - 1) {
            num_steps += 1;
            if !state.step(step_nr)? {
                break;
            }
        }

        let mut results = state.results;
        for hypotheses in &mut results {
            hypotheses.sort_by(|a, b| b.score.total_cmp(&a.score));
        }

        info!(
            "generated {} searches (beam size {}) in {} steps, {:.2?}",
            num_searches,
            self.beam_size,
            num_steps,
            start.elapsed()
        );

        Ok(SequenceGeneratorOutput { results, pad_idx: self.vocab_info.pad_idx })
    }
}

/// Mutable state of one `generate` call.
///
/// Rows of `seqs`, `scores`, the encoder tensors and the state bag are laid
/// out as `beam_size` consecutive beams per active search.
struct SearchState<'a> {
    generator: &'a Seq2SeqGenerator,
    encoder_output: Array3<f32>,
    encoder_padding_mask: Option<Array2<f32>>,
    state_bag: IncrementalStateBag,
    max_seq_len: usize,
    seqs: Array2<u32>,
    /// Cumulative scores.
    scores: Array2<f32>,
    /// Index into `results` of each active search.
    active_searches: Vec<usize>,
    results: Vec<Vec<Hypothesis>>,
}

impl SearchState<'_> {
    fn bootstrap(&mut self) -> Result<()> {
        let generator = self.generator;
        let prefix_seq = &generator.prefix_seq;
        let prefix_len = prefix_seq.len();

        for (j, &idx) in prefix_seq.iter().enumerate() {
            self.seqs.column_mut(j).fill(idx);
        }

        if prefix_len == 1 {
            return Ok(());
        }

        // Prime the state bag with everything but the last prefix token,
        // which the first step consumes.
        let prefix = self.seqs.slice(s![.., ..prefix_len - 1]).to_owned();

        let output = generator.decoder.decode_and_project(
            &prefix,
            None,
            &self.encoder_output,
            self.encoder_padding_mask.as_ref(),
            Some(&mut self.state_bag),
            &mut ForwardMode::Eval,
        )?;

        self.state_bag.increment_step(prefix_len - 1);

        if output.logits.dim().0 != self.seqs.nrows() || output.logits.dim().1 != prefix_len - 1 {
            bail!(
                "decoder returned logits of shape {:?} for a prefix of shape {:?}",
                output.logits.dim(),
                prefix.dim()
            );
        }

        for (row, logits) in output.logits.outer_iter().enumerate() {
            let mut score = 0.0;
            for (j, step_logits) in logits.outer_iter().enumerate() {
                let next = prefix_seq[j + 1] as usize;
                let lprobs = log_softmax_1d(&step_logits);
                score += lprobs
                    .get(next)
                    .copied()
                    .ok_or_else(|| anyhow!("prefix token {} is out of range of the logits", next))?;
                self.scores[[row, j + 1]] = score;
            }
        }

        Ok(())
    }

    /// Runs one step; returns `false` once every search is finished.
    fn step(&mut self, step_nr: usize) -> Result<bool> {
        let generator = self.generator;
        let vocab_info = &generator.vocab_info;
        let opts = &generator.opts;
        let beam_size = generator.beam_size;
        let batch_size = self.seqs.nrows();

        let input = self.seqs.slice(s![.., step_nr..step_nr + 1]).to_owned();

        let output = generator.decoder.decode_and_project(
            &input,
            None,
            &self.encoder_output,
            self.encoder_padding_mask.as_ref(),
            Some(&mut self.state_bag),
            &mut ForwardMode::Eval,
        )?;

        self.state_bag.increment_step(1);

        let (out_batch, out_len, vocab_size) = output.logits.dim();
        if out_batch != batch_size || out_len != 1 {
            bail!(
                "decoder returned logits of shape {:?} for a single step of {} sequences",
                output.logits.dim(),
                batch_size
            );
        }
        if vocab_size != vocab_info.size {
            bail!(
                "decoder projects onto {} tokens, but the vocabulary has {}",
                vocab_size,
                vocab_info.size
            );
        }

        let mut lprobs = Array2::<f32>::zeros((batch_size, vocab_size));
        for (mut row, logits) in lprobs.outer_iter_mut().zip(output.logits.outer_iter()) {
            row.assign(&log_softmax_1d(&logits.row(0)));
        }

        if let Some(pad_idx) = vocab_info.pad_idx {
            lprobs.column_mut(pad_idx as usize).fill(f32::NEG_INFINITY);
        }

        if let Some(unk_idx) = vocab_info.unk_idx {
            lprobs.column_mut(unk_idx as usize).mapv_inplace(|v| v - opts.unk_penalty);
        }

        let eos_idx = generator.eos_idx as usize;
        if step_nr == self.max_seq_len - 2 {
            // Only EOS is allowed at the last step.
            let eos_lprobs = lprobs.column(eos_idx).to_owned();
            lprobs.fill(f32::NEG_INFINITY);
            lprobs.column_mut(eos_idx).assign(&eos_lprobs);
        } else if step_nr < opts.min_seq_len {
            lprobs.column_mut(eos_idx).fill(f32::NEG_INFINITY);
        }

        if let Some(processor) = &opts.logits_processor {
            processor.process(self.seqs.slice(s![.., ..step_nr + 1]), &mut lprobs)?;
        }

        let is_start_step = step_nr + 1 == generator.prefix_seq.len();

        let mut new_order = Vec::with_capacity(batch_size);
        let mut next_tokens = Vec::with_capacity(batch_size);
        let mut next_scores = Vec::with_capacity(batch_size);
        let mut still_active = Vec::with_capacity(self.active_searches.len());

        for (block, &search_idx) in self.active_searches.iter().enumerate() {
            let first_row = block * beam_size;
            let rows = first_row..first_row + beam_size;

            let step = generator.search.step(
                step_nr,
                is_start_step,
                lprobs.slice(s![rows.clone(), ..]),
                self.scores.slice(s![rows, step_nr]),
            )?;

            let hypotheses = &mut self.results[search_idx];
            let mut continuing: Vec<(usize, u32, f32)> = Vec::with_capacity(beam_size);
            let mut finished = false;

            let candidates = step.scores.iter().zip(&step.vocab_indices).zip(&step.beam_indices);
            for (rank, ((&score, &token), &beam_idx)) in candidates.enumerate() {
                if beam_idx >= beam_size {
                    bail!("beam search selected beam {} of {}", beam_idx, beam_size);
                }
                let row = first_row + beam_idx;

                if token == generator.eos_idx {
                    // EOS candidates outside of the top `beam_size` are ignored.
                    if rank < beam_size && score.is_finite() {
                        hypotheses.push(finalize(&self.seqs, &self.scores, row, step_nr, token, score, opts));
                        if hypotheses.len() >= beam_size {
                            finished = true;
                            break;
                        }
                    }
                } else if continuing.len() < beam_size {
                    continuing.push((row, token, score));
                }
            }

            if finished || continuing.is_empty() {
                debug!(
                    "search {} finished at step {} with {} hypotheses",
                    search_idx,
                    step_nr,
                    hypotheses.len()
                );
                continue;
            }

            // Keep the block size fixed; filler beams can never finish.
            while continuing.len() < beam_size {
                let (row, token, _) = continuing[continuing.len() - 1];
                continuing.push((row, token, f32::NEG_INFINITY));
            }

            still_active.push(search_idx);
            for (row, token, score) in continuing {
                new_order.push(row);
                next_tokens.push(token);
                next_scores.push(score);
            }
        }

        let pruned = still_active.len() != self.active_searches.len();
        self.active_searches = still_active;

        if self.active_searches.is_empty() {
            return Ok(false);
        }

        self.seqs = self.seqs.select(Axis(0), &new_order);
        self.scores = self.scores.select(Axis(0), &new_order);

        for (i, (&token, &score)) in next_tokens.iter().zip(&next_scores).enumerate() {
            self.seqs[[i, step_nr + 1]] = token;
            self.scores[[i, step_nr + 1]] = score;
        }

        if pruned {
            self.encoder_output = self.encoder_output.select(Axis(0), &new_order);
            self.encoder_padding_mask =
                self.encoder_padding_mask.as_ref().map(|m| m.select(Axis(0), &new_order));
        }

        self.state_bag.reorder(&new_order)?;

        Ok(true)
    }
}

fn finalize(
    seqs: &Array2<u32>,
    scores: &Array2<f32>,
    row: usize,
    step_nr: usize,
    eos_idx: u32,
    score: f32,
    opts: &SequenceGeneratorOptions,
) -> Hypothesis {
    let mut seq = seqs.slice(s![row, ..=step_nr]).to_vec();
    seq.push(eos_idx);

    let mut step_scores = Vec::with_capacity(step_nr + 2);
    let mut prev = 0.0;
    for &cumulative in scores.slice(s![row, ..=step_nr]).iter().chain(std::iter::once(&score)) {
        step_scores.push(cumulative - prev);
        prev = cumulative;
    }

    let score = if opts.normalize_scores {
        score / ((step_nr + 1) as f32).powf(opts.len_penalty)
    } else {
        score
    };

    Hypothesis { seq, score, step_scores }
}
