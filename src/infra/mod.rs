// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the output directory:
//
//   checkpoint.rs      — model weights (Burn CompactRecorder),
//                        TrainConfig and the last saved step
//   tokenizer_store.rs — builds or loads tokenizer.json and
//                        adapts it to the TextTokenizer trait
//   metrics.rs         — metrics.jsonl, the MetricsSink used
//                        by the training loop
//
// Reference: Burn Book §5 (Records and Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// JSON-lines metrics sink
pub mod metrics;
