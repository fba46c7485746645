use std::sync::{Arc, Mutex};

use anyhow::Result;
use ndarray::{Array1, Array2, Array3, array, s};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;
use crate::error::{ConfigError, ConfigResult};
use crate::models::{EncoderDecoderModel, Seq2SeqBatch, Seq2SeqDecoder};
use crate::nn::transformer::{LayerNormFactory, TransformerDecoder, TransformerEncoder};
use crate::nn::{
    ForwardMode, IncrementalStateBag, LayerNorm, SinusoidalPositionEncoder, StandardEmbedding,
    StandardLayerNorm, TiedProjection,
};
use crate::traits::{DType, Device};

// ========================================================================
//  Helpers
// ========================================================================

struct IdentityEncoder(usize);

impl TransformerEncoder for IdentityEncoder {
    fn model_dim(&self) -> usize {
        self.0
    }

    fn forward(
        &self,
        seqs: Array3<f32>,
        padding_mask: Option<Array2<f32>>,
        _mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
        Ok((seqs, padding_mask))
    }
}

struct IdentityDecoder(usize);

impl TransformerDecoder for IdentityDecoder {
    fn model_dim(&self) -> usize {
        self.0
    }

    fn forward(
        &self,
        seqs: Array3<f32>,
        padding_mask: Option<Array2<f32>>,
        _encoder_output: &Array3<f32>,
        _encoder_padding_mask: Option<&Array2<f32>>,
        _state_bag: Option<&mut IncrementalStateBag>,
        _mode: &mut ForwardMode<'_>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)> {
        Ok((seqs, padding_mask))
    }
}

fn identity_table(dim: usize) -> Arc<Array2<f32>> {
    Arc::new(Array2::eye(dim))
}

fn plain_frontend(table: Arc<Array2<f32>>) -> TransformerEmbeddingFrontend {
    let embed = StandardEmbedding::from_arc(table, Some(0)).unwrap();
    TransformerEmbeddingFrontend::builder(Box::new(embed))
        .no_scale(true)
        .dropout_p(0.0)
        .build()
        .unwrap()
}

// ========================================================================
//  Front-end configuration
// ========================================================================

#[test]
fn test_display_reports_scaling() {
    let scaled = TransformerEmbeddingFrontend::new(
        Box::new(StandardEmbedding::new(Array2::zeros((4, 16)), None).unwrap()),
        None,
        FrontendOptions::default(),
    )
    .unwrap();
    assert_eq!(scaled.to_string(), "model_dim=16");
    assert_eq!(scaled.scale(), 4.0);

    let unscaled = plain_frontend(identity_table(4));
    assert_eq!(unscaled.to_string(), "model_dim=4, no_scale=true");
    assert_eq!(unscaled.scale(), 1.0);

    // sqrt(1) == 1, but scaling is still enabled.
    let unit = TransformerEmbeddingFrontend::builder(Box::new(
        StandardEmbedding::new(Array2::zeros((4, 1)), None).unwrap(),
    ))
    .dropout_p(0.0)
    .build()
    .unwrap();
    assert_eq!(unit.scale(), 1.0);
    assert_eq!(unit.to_string(), "model_dim=1");
}

#[test]
fn test_default_options_enable_dropout_only() {
    let frontend = TransformerEmbeddingFrontend::new(
        Box::new(StandardEmbedding::new(Array2::zeros((4, 8)), None).unwrap()),
        None,
        FrontendOptions::default(),
    )
    .unwrap();

    assert_eq!(frontend.dropout().map(|d| d.p()), Some(0.1));
    assert!(frontend.layer_norm().is_none());
    assert!(frontend.pos_encoder().is_none());
    assert_eq!(frontend.embed().num_embeddings(), 4);
}

#[test]
fn test_layer_norm_factory_receives_model_dim_and_device() {
    let seen = Arc::new(Mutex::new(None::<(usize, Option<Device>)>));
    let seen_in_factory = seen.clone();
    let factory: LayerNormFactory = Arc::new(
        move |dim: usize, device: Option<Device>, _dtype: Option<DType>| -> ConfigResult<Box<dyn LayerNorm>> {
            *seen_in_factory.lock().unwrap() = Some((dim, device));
            Ok(Box::new(StandardLayerNorm::new(dim, 1e-5, false)))
        },
    );

    let frontend = TransformerEmbeddingFrontend::builder(Box::new(
        StandardEmbedding::new(Array2::zeros((4, 6)), None).unwrap(),
    ))
    .layer_norm(true)
    .layer_norm_fn(factory)
    .device(Device::Cpu)
    .build()
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), Some((6, Some(Device::Cpu))));
    assert_eq!(frontend.layer_norm().map(|n| n.normalized_dim()), Some(6));
}

#[test]
fn test_default_layer_norm_on_gpu_is_rejected() {
    let result = TransformerEmbeddingFrontend::builder(Box::new(
        StandardEmbedding::new(Array2::zeros((4, 6)), None).unwrap(),
    ))
    .layer_norm(true)
    .device(Device::Wgpu)
    .build();

    assert!(matches!(result, Err(ConfigError::UnsupportedDevice(Device::Wgpu))));
}

#[test]
fn test_invalid_dropout_is_rejected() {
    let build = |p: f32| {
        TransformerEmbeddingFrontend::builder(Box::new(
            StandardEmbedding::new(Array2::zeros((4, 6)), None).unwrap(),
        ))
        .dropout_p(p)
        .build()
    };

    assert!(matches!(build(-0.5), Err(ConfigError::InvalidDropoutProbability(_))));
    assert!(matches!(build(1.5), Err(ConfigError::InvalidDropoutProbability(_))));
    assert!(build(0.0).unwrap().dropout().is_none());
    assert_eq!(build(1.0).unwrap().dropout().map(|d| d.p()), Some(1.0));
}

#[test]
fn test_options_from_json() {
    let opts: FrontendOptions = serde_json::from_str(r#"{"no_scale": true}"#).unwrap();
    assert_eq!(opts, FrontendOptions { no_scale: true, layer_norm: false, dropout_p: 0.1 });

    let json = serde_json::to_string(&FrontendOptions::default()).unwrap();
    assert!(json.contains("\"dropout_p\":0.1"));
}

#[test]
fn test_dropout_only_applies_in_training() {
    let frontend = TransformerEmbeddingFrontend::builder(Box::new(
        StandardEmbedding::new(Array2::ones((4, 32)), None).unwrap(),
    ))
    .no_scale(true)
    .dropout_p(0.5)
    .build()
    .unwrap();

    let seqs = array![[1u32, 2, 3]];

    let (eval, _) = frontend.forward(&seqs, None, None, &mut ForwardMode::Eval).unwrap();
    assert!(eval.iter().all(|&v| v == 1.0));

    let mut rng = StdRng::seed_from_u64(5);
    let (train, _) = frontend.forward(&seqs, None, None, &mut ForwardMode::train(&mut rng)).unwrap();
    assert!(train.iter().any(|&v| v == 0.0));
    assert!(train.iter().all(|&v| v == 0.0 || v == 2.0));
}

#[test]
fn test_embedding_errors_propagate() {
    let frontend = plain_frontend(identity_table(4));
    let err = frontend
        .forward(&array![[9u32]], None, None, &mut ForwardMode::Eval)
        .unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

// ========================================================================
//  TransformerModel
// ========================================================================

fn tied_model(dim: usize) -> TransformerModel {
    let table = identity_table(dim);
    TransformerModel::new(
        Box::new(plain_frontend(table.clone())),
        Box::new(IdentityEncoder(dim)),
        Box::new(plain_frontend(table.clone())),
        Box::new(IdentityDecoder(dim)),
        Box::new(TiedProjection::new(table)),
        Some(0),
    )
    .unwrap()
}

#[test]
fn test_model_forward_with_tied_projection() {
    let model = tied_model(4);
    assert_eq!(model.model_dim(), 4);

    let batch = Seq2SeqBatch {
        source_seqs: array![[1u32, 2], [3, 0]],
        source_seq_lens: Some(array![2, 1]),
        target_seqs: array![[2u32, 3, 1], [1, 0, 0]],
        target_seq_lens: Some(array![3, 1]),
    };

    let output = model.forward(&batch, &mut ForwardMode::Eval).unwrap();

    assert_eq!(output.logits.dim(), (2, 3, 4));
    assert_eq!(output.pad_idx, Some(0));
    assert_eq!(output.logits.slice(s![0, 1, ..]), array![0.0f32, 0.0, 0.0, 1.0]);
    assert_eq!(output.logits.slice(s![1, 0, ..]), array![0.0f32, 1.0, 0.0, 0.0]);
}

#[test]
fn test_model_encode_returns_padding_mask() {
    let model = tied_model(4);
    let (output, mask) = model
        .encode(&array![[1u32, 2, 3], [1, 0, 0]], Some(&Array1::from(vec![3, 1])), &mut ForwardMode::Eval)
        .unwrap();

    assert_eq!(output.dim(), (2, 3, 4));
    let mask = mask.unwrap();
    assert_eq!(mask.row(0).to_vec(), vec![0.0, 0.0, 0.0]);
    assert_eq!(mask[[1, 1]], f32::NEG_INFINITY);
}

#[test]
fn test_model_rejects_mismatched_components() {
    let table = identity_table(4);
    let result = TransformerModel::new(
        Box::new(plain_frontend(table.clone())),
        Box::new(IdentityEncoder(4)),
        Box::new(plain_frontend(table)),
        Box::new(IdentityDecoder(8)),
        Box::new(TiedProjection::new(identity_table(4))),
        None,
    );

    match result {
        Err(ConfigError::InvalidArgument(msg)) => assert!(msg.contains("`decoder`")),
        _ => panic!("expected InvalidArgument"),
    }
}

#[test]
fn test_incremental_decode_continues_positions() {
    let dim = 4;
    let table = identity_table(dim);
    let decoder_frontend = TransformerEmbeddingFrontend::builder(Box::new(
        StandardEmbedding::from_arc(table.clone(), None).unwrap(),
    ))
    .pos_encoder(Box::new(SinusoidalPositionEncoder::new(dim, 16).unwrap()))
    .no_scale(true)
    .dropout_p(0.0)
    .build()
    .unwrap();

    let model = TransformerModel::new(
        Box::new(plain_frontend(table.clone())),
        Box::new(IdentityEncoder(dim)),
        Box::new(decoder_frontend),
        Box::new(IdentityDecoder(dim)),
        Box::new(TiedProjection::new(table)),
        None,
    )
    .unwrap();

    let encoder_output = Array3::zeros((1, 2, dim));

    let (full, _) = model
        .decode(&array![[1u32, 2, 3]], None, &encoder_output, None, None, &mut ForwardMode::Eval)
        .unwrap();

    let mut bag = IncrementalStateBag::new();
    bag.increment_step(2);
    let (step, _) = model
        .decode(&array![[3u32]], None, &encoder_output, None, Some(&mut bag), &mut ForwardMode::Eval)
        .unwrap();

    assert_eq!(step.slice(s![0, 0, ..]), full.slice(s![0, 2, ..]));
}
