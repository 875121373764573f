// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define what the
// translation trainer works with.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Everything that touches tensors, disks or tokenizer files
// implements one of the traits declared in `traits.rs`, so the
// control loop can be tested without a GPU.

// Raw text pairs and their tokenized form
pub mod translation_pair;

// One collated, rectangular batch of token ids
pub mod batch;

// Step counters, per-step outputs and evaluation results
pub mod training_state;

// The error taxonomy shared by every layer
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
