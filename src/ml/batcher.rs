// ============================================================
// Layer 5 — Translation Batcher
// ============================================================
// Converts a host-side Batch (Vec<Vec<u32>>) into tensors on
// the target device.
//
// Input:  Batch with N rows, L_in input columns, L_out label columns
// Output: TranslationBatch with
//           input_ids             [N, L_in]   Int
//           encoder_padding_mask  [N, L_in]   Bool (true = padding)
//           labels                [N, L_out]  Int
//           decoder_input_ids     [N, L_out]  Int
//
// decoder_input_ids is the label row shifted one position to the
// right, with pad_id as the decoder start token:
//
//   labels            = [ Hallo  Welt  </s>  <pad> ]
//   decoder_input_ids = [ <pad>  Hallo Welt  </s>  ]
//
// Padding already happened in the collator; here we only flatten
// row-major and reshape.

use burn::{prelude::*, tensor::TensorData};

use crate::domain::batch::Batch;

/// A batch of translation examples ready for the model.
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    pub input_ids: Tensor<B, 2, Int>,
    pub encoder_padding_mask: Tensor<B, 2, Bool>,
    pub labels: Tensor<B, 2, Int>,
    pub decoder_input_ids: Tensor<B, 2, Int>,
}

/// Holds the device tensors are created on.
#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn to_tensors(&self, batch: &Batch) -> TranslationBatch<B> {
        let n = batch.len();
        let pad = batch.pad_id as i64;

        let input_ids = self.int_matrix(&batch.input_ids, n, batch.input_len());
        let labels = self.int_matrix(&batch.labels, n, batch.label_len());

        let shifted: Vec<Vec<u32>> = batch
            .labels
            .iter()
            .map(|row| shift_right(row, batch.pad_id))
            .collect();
        let decoder_input_ids = self.int_matrix(&shifted, n, batch.label_len());

        // Derived from the tensor rather than copied from the host mask,
        // so the two can never disagree.
        let encoder_padding_mask = input_ids.clone().equal_elem(pad);

        TranslationBatch { input_ids, encoder_padding_mask, labels, decoder_input_ids }
    }

    /// Row-major flatten then reshape to [rows, cols].
    pub fn int_matrix(&self, rows: &[Vec<u32>], n: usize, len: usize) -> Tensor<B, 2, Int> {
        let flat: Vec<i64> = rows
            .iter()
            .flat_map(|row| row.iter().map(|&id| id as i64))
            .collect();
        Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [n, len]), &self.device)
    }
}

/// `[a, b, c]` → `[start, a, b]`, same length.
pub fn shift_right(labels: &[u32], start_id: u32) -> Vec<u32> {
    if labels.is_empty() {
        return Vec::new();
    }
    let mut shifted = Vec::with_capacity(labels.len());
    shifted.push(start_id);
    shifted.extend_from_slice(&labels[..labels.len() - 1]);
    shifted
}
