use anyhow::{Result, anyhow};
use ndarray::{Array1, Array2, Array3, Axis, Zip};

/// Value stored at masked positions of an additive float mask.
pub const MASK_VALUE: f32 = f32::NEG_INFINITY;

/// Create the float padding mask of a batch from its sequence lengths.
///
/// `shape` is `(batch_size, seq_len)` of the batch the mask describes.
/// Returns `None` when `seq_lens` is `None`, or when no sequence is shorter
/// than `seq_len` (there is nothing to mask). Otherwise the mask has shape
/// `[batch_size, seq_len]` with `0.0` for real positions and `-inf` for
/// padding. A length greater than `seq_len` is an error.
pub fn to_padding_mask(
    shape: (usize, usize),
    seq_lens: Option<&Array1<usize>>,
) -> Result<Option<Array2<f32>>> {
    let Some(seq_lens) = seq_lens else {
        return Ok(None);
    };

    let (batch_size, seq_len) = shape;

    if seq_lens.len() != batch_size {
        return Err(anyhow!(
            "seq_lens has {} elements but the batch size is {}",
            seq_lens.len(),
            batch_size
        ));
    }

    if let Some((b, &len)) = seq_lens.iter().enumerate().find(|&(_, &len)| len > seq_len) {
        return Err(anyhow!(
            "seq_lens[{}] is {} but the sequence length is {}",
            b,
            len,
            seq_len
        ));
    }

    if seq_lens.iter().all(|&len| len == seq_len) {
        return Ok(None);
    }

    let mask = Array2::from_shape_fn((batch_size, seq_len), |(b, j)| {
        if j >= seq_lens[b] {
            MASK_VALUE
        } else {
            0.0
        }
    });

    Ok(Some(mask))
}

/// Zero out the padded positions of `seqs`.
///
/// `seqs` is `[batch, seq_len, dim]` and `padding_mask` is `[batch, seq_len]`.
pub fn apply_padding_mask(mut seqs: Array3<f32>, padding_mask: &Array2<f32>) -> Result<Array3<f32>> {
    let (batch_size, seq_len, _) = seqs.dim();

    if padding_mask.dim() != (batch_size, seq_len) {
        return Err(anyhow!(
            "padding mask shape {:?} doesn't match sequence shape {:?}",
            padding_mask.dim(),
            (batch_size, seq_len)
        ));
    }

    Zip::from(seqs.lanes_mut(Axis(2)))
        .and(padding_mask)
        .for_each(|mut row, &m| {
            if m == MASK_VALUE {
                row.fill(0.0);
            }
        });

    Ok(seqs)
}

/// Create an additive causal attention mask.
///
/// # Arguments
/// * `q_len` - Number of query positions (usually 1 during incremental decoding)
/// * `total_len` - Total key positions (past steps + current)
///
/// Returns `[q_len, total_len]`, `0.0` where attention is allowed and `-inf`
/// where the key lies in the future of the query.
pub fn create_causal_mask(q_len: usize, total_len: usize) -> Array2<f32> {
    let past_len = total_len.saturating_sub(q_len);

    Array2::from_shape_fn((q_len, total_len), |(i, j)| {
        // The query at index 'i' sits at absolute position 'past_len + i'
        if j <= past_len + i {
            0.0
        } else {
            MASK_VALUE
        }
    })
}

/// Expand a `[batch, kv_len]` key padding mask to `[batch, q_len, kv_len]`
/// so it can be added to attention scores.
pub fn expand_padding_mask(padding_mask: &Array2<f32>, q_len: usize) -> Array3<f32> {
    let (batch_size, kv_len) = padding_mask.dim();
    let expanded = padding_mask.view().insert_axis(Axis(1));

    let mut out = Array3::zeros((batch_size, q_len, kv_len));
    out.assign(&expanded);
    out
}

/// Number of real (unmasked) positions per row of a padding mask.
pub fn padding_mask_to_seq_lens(padding_mask: &Array2<f32>) -> Array1<usize> {
    padding_mask.map_axis(Axis(1), |row| row.iter().filter(|&&m| m != MASK_VALUE).count())
}
