use std::str::FromStr;

use super::*;

const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": {
    "type": "Whitespace"
  },
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "<pad>": 0,
      "<unk>": 1,
      "<s>": 2,
      "</s>": 3,
      "__eng__": 4,
      "__fra__": 5,
      "hello": 6,
      "world": 7,
      "bonjour": 8,
      "monde": 9
    },
    "unk_token": "<unk>"
  }
}"#;

fn tokenizer() -> HfTextTokenizer {
    let hf = Tokenizer::from_str(TOKENIZER_JSON).unwrap();
    HfTextTokenizer::with_special_tokens(hf, Some("<unk>"), Some("<s>"), Some("</s>"), Some("<pad>"))
        .unwrap()
        .with_lang_token_format("__{lang}__")
}

#[test]
fn test_vocab_info_from_special_tokens() {
    let info = *tokenizer().vocab_info();
    assert_eq!(info, VocabularyInfo::new(10, Some(1), Some(2), Some(3), Some(0)));
}

#[test]
fn test_unknown_special_token_is_an_error() {
    let hf = Tokenizer::from_str(TOKENIZER_JSON).unwrap();
    assert!(HfTextTokenizer::with_special_tokens(hf, None, None, Some("<eos>"), None).is_err());
}

#[test]
fn test_source_encoder_prefixes_language() {
    let encoder = tokenizer()
        .create_encoder(Some("translation"), Some("eng"), TokenizerMode::Source)
        .unwrap();

    assert_eq!(encoder.prefix_indices(), &[4]);
    assert_eq!(encoder.encode("hello world").unwrap(), vec![4, 6, 7, 3]);
    assert_eq!(encoder.encode("hello there").unwrap(), vec![4, 6, 1, 3]);
}

#[test]
fn test_target_encoder_starts_with_eos() {
    let encoder = tokenizer().create_encoder(None, Some("fra"), TokenizerMode::Target).unwrap();

    assert_eq!(encoder.prefix_indices(), &[3, 5]);
    assert_eq!(encoder.encode("bonjour").unwrap(), vec![3, 5, 8, 3]);
}

#[test]
fn test_encoder_without_language() {
    let encoder = tokenizer().create_encoder(None, None, TokenizerMode::Source).unwrap();
    assert!(encoder.prefix_indices().is_empty());
    assert_eq!(encoder.encode("monde").unwrap(), vec![9, 3]);
}

#[test]
fn test_bad_task_or_language() {
    let tokenizer = tokenizer();
    assert!(tokenizer.create_encoder(Some("lm"), None, TokenizerMode::Source).is_err());
    assert!(tokenizer.create_encoder(None, Some("deu"), TokenizerMode::Source).is_err());
}

#[test]
fn test_decoder_joins_tokens() {
    let decoder = tokenizer().create_decoder();
    assert_eq!(decoder.decode(&[8, 9]).unwrap(), "bonjour monde");
}

#[test]
fn test_mode_serde() {
    assert_eq!(serde_json::to_string(&TokenizerMode::Target).unwrap(), "\"target\"");
}
