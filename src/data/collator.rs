// ============================================================
// Layer 4 — Batch Collator
// ============================================================
// Stacks N tokenized examples into one rectangular Batch.
//
// Dynamic padding:
//   L_in  = longest input_ids in THIS batch
//   L_out = longest label_ids in THIS batch (independent of L_in)
// Every row is right-padded with pad_id up to its field's
// length. Nothing is padded to a global max_seq_len, so a batch
// of short sentences costs only as much as its longest row.
//
// The encoder padding mask is read straight off the padded
// input ids: mask[i][j] == (input_ids[i][j] == pad_id).
//
// Example order is preserved; shuffling happens when the
// dataset decides the epoch order, not here.

use crate::domain::batch::Batch;
use crate::domain::translation_pair::TokenizedExample;

#[derive(Debug, Clone, Copy)]
pub struct Collator {
    pad_id: u32,
}

impl Collator {
    pub fn new(pad_id: u32) -> Self {
        Self { pad_id }
    }

    pub fn collate(&self, examples: &[TokenizedExample]) -> Batch {
        let input_len = examples.iter().map(|e| e.input_ids.len()).max().unwrap_or(0);
        let label_len = examples.iter().map(|e| e.label_ids.len()).max().unwrap_or(0);

        let input_ids: Vec<Vec<u32>> = examples
            .iter()
            .map(|e| pad_right(&e.input_ids, input_len, self.pad_id))
            .collect();
        let labels: Vec<Vec<u32>> = examples
            .iter()
            .map(|e| pad_right(&e.label_ids, label_len, self.pad_id))
            .collect();

        let encoder_padding_mask = input_ids
            .iter()
            .map(|row| row.iter().map(|&id| id == self.pad_id).collect())
            .collect();

        Batch { input_ids, labels, encoder_padding_mask, pad_id: self.pad_id }
    }
}

fn pad_right(ids: &[u32], len: usize, pad_id: u32) -> Vec<u32> {
    let mut row = Vec::with_capacity(len);
    row.extend_from_slice(ids);
    row.resize(len, pad_id);
    row
}
