// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw sentence pairs on disk to host-side
// batches of token ids:
//
//   .jsonl corpus
//       │
//       ▼
//   JsonlPairLoader      → reads RawPairs
//       │
//       ▼
//   split_off_eval       → carves an evaluation set if none given
//       │
//       ▼
//   SequencePreprocessor → task prefix, tokenize, truncate (parallel)
//       │
//       ▼
//   TranslationDataset   → Burn Dataset + per-epoch ordering
//       │
//       ▼
//   Collator             → dynamic right-padding + padding mask
//
// Tensors are only created in Layer 5 (ml::batcher).

/// Loads JSON-lines translation corpora
pub mod loader;

/// Turns RawPairs into TokenizedExamples
pub mod preprocessor;

/// Pads tokenized examples into one rectangular Batch
pub mod collator;

/// Implements Burn's Dataset trait for tokenized examples
pub mod dataset;

/// Shuffles and splits pairs into train/evaluation sets
pub mod splitter;
