use super::masks::*;
use ndarray::{arr1, Array2, Array3};

#[test]
fn test_padding_mask_absent_without_seq_lens() {
    let mask = to_padding_mask((2, 4), None).unwrap();
    assert!(mask.is_none());
}

#[test]
fn test_padding_mask_absent_when_all_full_length() {
    let seq_lens = arr1(&[4, 4]);
    let mask = to_padding_mask((2, 4), Some(&seq_lens)).unwrap();
    assert!(mask.is_none());
}

#[test]
fn test_padding_mask_marks_positions_past_length() {
    let seq_lens = arr1(&[4, 2, 0]);
    let mask = to_padding_mask((3, 4), Some(&seq_lens)).unwrap().unwrap();

    assert_eq!(mask.dim(), (3, 4));
    for (b, &len) in seq_lens.iter().enumerate() {
        for j in 0..4 {
            if j >= len {
                assert_eq!(mask[[b, j]], f32::NEG_INFINITY, "b={} j={}", b, j);
            } else {
                assert_eq!(mask[[b, j]], 0.0, "b={} j={}", b, j);
            }
        }
    }
}

#[test]
fn test_padding_mask_rejects_wrong_batch() {
    let seq_lens = arr1(&[1, 2, 3]);
    assert!(to_padding_mask((2, 4), Some(&seq_lens)).is_err());
}

#[test]
fn test_padding_mask_rejects_length_past_seq_len() {
    let seq_lens = arr1(&[4, 5]);
    let err = to_padding_mask((2, 4), Some(&seq_lens)).unwrap_err();
    assert!(err.to_string().contains("seq_lens[1] is 5"));
}

#[test]
fn test_padding_mask_round_trips_seq_lens() {
    let seq_lens = arr1(&[3, 1]);
    let mask = to_padding_mask((2, 3), Some(&seq_lens)).unwrap().unwrap();
    assert_eq!(padding_mask_to_seq_lens(&mask), seq_lens);
}

#[test]
fn test_apply_padding_mask_zeroes_padding() {
    let seqs = Array3::<f32>::ones((2, 3, 2));
    let seq_lens = arr1(&[3, 1]);
    let mask = to_padding_mask((2, 3), Some(&seq_lens)).unwrap().unwrap();

    let out = apply_padding_mask(seqs, &mask).unwrap();

    assert_eq!(out[[0, 2, 1]], 1.0);
    assert_eq!(out[[1, 0, 0]], 1.0);
    assert_eq!(out[[1, 1, 0]], 0.0);
    assert_eq!(out[[1, 2, 1]], 0.0);
}

#[test]
fn test_causal_mask() {
    let mask = create_causal_mask(3, 3);

    // Expected:
    // [[0, -inf, -inf],
    //  [0,    0, -inf],
    //  [0,    0,    0]]
    let inf = f32::NEG_INFINITY;
    let expected =
        Array2::from_shape_vec((3, 3), vec![0.0, inf, inf, 0.0, 0.0, inf, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(mask, expected);
}

#[test]
fn test_causal_mask_with_past() {
    // One new query attending over two cached steps plus itself
    let mask = create_causal_mask(1, 3);
    assert!(mask.iter().all(|&m| m == 0.0));
}

#[test]
fn test_expand_padding_mask() {
    let seq_lens = arr1(&[2, 1]);
    let mask = to_padding_mask((2, 2), Some(&seq_lens)).unwrap().unwrap();
    let expanded = expand_padding_mask(&mask, 3);

    assert_eq!(expanded.dim(), (2, 3, 2));
    for q in 0..3 {
        assert_eq!(expanded[[0, q, 1]], 0.0);
        assert_eq!(expanded[[1, q, 1]], f32::NEG_INFINITY);
    }
}
