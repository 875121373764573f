// ============================================================
// Layer 3 — Batch Domain Type
// ============================================================
// A Batch is the rectangular form of N tokenized examples:
//
//   input_ids             [N × L_in]   right-padded with pad_id
//   labels                [N × L_out]  right-padded with pad_id
//   encoder_padding_mask  [N × L_in]   true where input_ids == pad_id
//
// L_in and L_out are the longest sequences in THIS batch,
// computed independently. A Batch lives for one training step
// (or one evaluation step) and is then dropped.

/// One collated batch of token ids, still on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub input_ids: Vec<Vec<u32>>,
    pub labels: Vec<Vec<u32>>,
    pub encoder_padding_mask: Vec<Vec<bool>>,
    pub pad_id: u32,
}

impl Batch {
    /// Number of examples in the batch.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Padded input length (L_in).
    pub fn input_len(&self) -> usize {
        self.input_ids.first().map_or(0, Vec::len)
    }

    /// Padded label length (L_out).
    pub fn label_len(&self) -> usize {
        self.labels.first().map_or(0, Vec::len)
    }

    /// Number of label positions that are not padding.
    pub fn num_nonpad_labels(&self) -> usize {
        self.labels
            .iter()
            .flatten()
            .filter(|&&id| id != self.pad_id)
            .count()
    }
}
