//! Text tokenization contracts and a `tokenizers`-backed implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::VocabularyInfo;

/// Whether an encoder produces model input or decoder targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerMode {
    Source,
    Target,
}

/// Creates encoders and decoders for a given vocabulary.
pub trait TextTokenizer: Send + Sync {
    /// Creates an encoder for `task` and `lang`.
    fn create_encoder(
        &self,
        task: Option<&str>,
        lang: Option<&str>,
        mode: TokenizerMode,
    ) -> Result<Box<dyn TextTokenEncoder>>;

    fn create_decoder(&self) -> Box<dyn TextTokenDecoder>;

    fn vocab_info(&self) -> &VocabularyInfo;
}

/// Encodes text into token indices.
pub trait TextTokenEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Indices prepended to every encoded sentence.
    fn prefix_indices(&self) -> &[u32];
}

/// Decodes token indices into text.
pub trait TextTokenDecoder: Send + Sync {
    fn decode(&self, indices: &[u32]) -> Result<String>;
}

/// Adapts a Hugging Face `Tokenizer` to the text tokenizer contracts.
///
/// Encoded sentences follow the multilingual translation convention:
/// source sentences are `[lang] tokens [eos]`, target sentences are
/// `[eos, lang] tokens [eos]`. The language token is looked up by formatting
/// `lang_token_format` (e.g. `"__{lang}__"`).
#[derive(Clone)]
pub struct HfTextTokenizer {
    tokenizer: Arc<Tokenizer>,
    vocab_info: VocabularyInfo,
    lang_token_format: Option<String>,
}

impl HfTextTokenizer {
    pub fn new(tokenizer: Tokenizer, vocab_info: VocabularyInfo) -> Self {
        Self { tokenizer: Arc::new(tokenizer), vocab_info, lang_token_format: None }
    }

    /// Builds the vocabulary info by looking up the given special tokens.
    pub fn with_special_tokens(
        tokenizer: Tokenizer,
        unk_token: Option<&str>,
        bos_token: Option<&str>,
        eos_token: Option<&str>,
        pad_token: Option<&str>,
    ) -> Result<Self> {
        let lookup = |token: Option<&str>| -> Result<Option<u32>> {
            token
                .map(|t| {
                    tokenizer
                        .token_to_id(t)
                        .ok_or_else(|| anyhow!("special token `{}` is not in the vocabulary", t))
                })
                .transpose()
        };

        let vocab_info = VocabularyInfo::new(
            tokenizer.get_vocab_size(true),
            lookup(unk_token)?,
            lookup(bos_token)?,
            lookup(eos_token)?,
            lookup(pad_token)?,
        );

        debug!("tokenizer vocabulary: {:?}", vocab_info);

        Ok(Self::new(tokenizer, vocab_info))
    }

    pub fn from_file(
        path: impl AsRef<Path>,
        unk_token: Option<&str>,
        bos_token: Option<&str>,
        eos_token: Option<&str>,
        pad_token: Option<&str>,
    ) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| anyhow!(e))?;
        Self::with_special_tokens(tokenizer, unk_token, bos_token, eos_token, pad_token)
    }

    /// Sets the pattern of language tokens; `{lang}` is replaced by the language code.
    pub fn with_lang_token_format(mut self, format: impl Into<String>) -> Self {
        self.lang_token_format = Some(format.into());
        self
    }

    fn lang_token_idx(&self, lang: &str) -> Result<u32> {
        let format = self
            .lang_token_format
            .as_deref()
            .ok_or_else(|| anyhow!("tokenizer has no language tokens, but `lang` is `{}`", lang))?;

        let token = format.replace("{lang}", lang);
        self.tokenizer
            .token_to_id(&token)
            .ok_or_else(|| anyhow!("language `{}` is not supported (no token `{}`)", lang, token))
    }
}

impl TextTokenizer for HfTextTokenizer {
    fn create_encoder(
        &self,
        task: Option<&str>,
        lang: Option<&str>,
        mode: TokenizerMode,
    ) -> Result<Box<dyn TextTokenEncoder>> {
        if let Some(task) = task {
            if task != "translation" {
                bail!("`task` must be 'translation', but is '{}' instead", task);
            }
        }

        let eos_idx = self
            .vocab_info
            .eos_idx
            .ok_or_else(|| anyhow!("tokenizer vocabulary has no end-of-sequence token"))?;

        let lang_idx = lang.map(|l| self.lang_token_idx(l)).transpose()?;

        let mut prefix_indices = Vec::with_capacity(2);
        if mode == TokenizerMode::Target {
            prefix_indices.push(eos_idx);
        }
        prefix_indices.extend(lang_idx);

        Ok(Box::new(HfTextTokenEncoder {
            tokenizer: self.tokenizer.clone(),
            prefix_indices,
            suffix_indices: vec![eos_idx],
        }))
    }

    fn create_decoder(&self) -> Box<dyn TextTokenDecoder> {
        Box::new(HfTextTokenDecoder { tokenizer: self.tokenizer.clone() })
    }

    fn vocab_info(&self) -> &VocabularyInfo {
        &self.vocab_info
    }
}

struct HfTextTokenEncoder {
    tokenizer: Arc<Tokenizer>,
    prefix_indices: Vec<u32>,
    suffix_indices: Vec<u32>,
}

impl TextTokenEncoder for HfTextTokenEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, false).map_err(|e| anyhow!(e))?;
        let ids = encoding.get_ids();

        let mut indices =
            Vec::with_capacity(self.prefix_indices.len() + ids.len() + self.suffix_indices.len());
        indices.extend_from_slice(&self.prefix_indices);
        indices.extend_from_slice(ids);
        indices.extend_from_slice(&self.suffix_indices);

        Ok(indices)
    }

    fn prefix_indices(&self) -> &[u32] {
        &self.prefix_indices
    }
}

struct HfTextTokenDecoder {
    tokenizer: Arc<Tokenizer>,
}

impl TextTokenDecoder for HfTextTokenDecoder {
    fn decode(&self, indices: &[u32]) -> Result<String> {
        self.tokenizer.decode(indices, true).map_err(|e| anyhow!(e))
    }
}

#[cfg(test)]
mod tests;
