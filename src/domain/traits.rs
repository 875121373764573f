// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop is written against these traits, never
// against concrete types:
//
//   PairSource      → where raw sentence pairs come from
//   TextTokenizer   → text ↔ token ids, with a reserved pad id
//   MetricsSink     → where step-keyed metrics go
//   InferenceMode   → train/inference mode switch of a model
//   Seq2SeqLearner  → the model + optimiser + scheduler bundle
//
// Production implementations live in the data, ml and infra
// layers; `src/testing.rs` provides doubles for unit tests.

use std::ops::Deref;

use anyhow::Result;

use crate::domain::batch::Batch;
use crate::domain::training_state::{GenerationPolicy, StepOutput};
use crate::domain::translation_pair::RawPair;

// ─── PairSource ───────────────────────────────────────────────────────────────
/// Any component that can load raw translation pairs.
pub trait PairSource {
    fn load_all(&self) -> Result<Vec<RawPair>>;
}

// ─── TextTokenizer ────────────────────────────────────────────────────────────
/// Text ↔ token-id conversion.
///
/// Source text and label text go through separate methods
/// because the label side may follow different special-token
/// conventions than the encoder input.
pub trait TextTokenizer: Send + Sync {
    /// Tokenize encoder input, including its special tokens.
    fn encode_source(&self, text: &str) -> Result<Vec<u32>>;

    /// Tokenize a target sentence for use as labels.
    fn encode_target(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode ids to text, dropping special and padding tokens.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    fn pad_id(&self) -> u32;

    fn eos_id(&self) -> u32;
}

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Receives key/value metrics keyed by `global_step`.
pub trait MetricsSink {
    fn log(&mut self, step: usize, metrics: &[(&str, f64)]) -> Result<()>;
}

// ─── InferenceMode ────────────────────────────────────────────────────────────
/// A model that can be switched between training and inference.
///
/// Callers should not pair these calls by hand; use
/// [`InferenceGuard`], which restores training mode when it is
/// dropped on every exit path.
pub trait InferenceMode {
    fn enter_inference_mode(&mut self);
    fn exit_inference_mode(&mut self);
}

/// Scoped inference mode. Training mode comes back on drop,
/// including early returns through `?` and unwinding panics.
pub struct InferenceGuard<'a, M: InferenceMode + ?Sized> {
    model: &'a mut M,
}

impl<'a, M: InferenceMode + ?Sized> InferenceGuard<'a, M> {
    pub fn enter(model: &'a mut M) -> Self {
        model.enter_inference_mode();
        tracing::debug!("Model switched to inference mode");
        Self { model }
    }
}

impl<M: InferenceMode + ?Sized> Deref for InferenceGuard<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: InferenceMode + ?Sized> Drop for InferenceGuard<'_, M> {
    fn drop(&mut self) {
        self.model.exit_inference_mode();
        tracing::debug!("Model switched back to training mode");
    }
}

// ─── Seq2SeqLearner ───────────────────────────────────────────────────────────
/// The single writer of model parameters.
///
/// `train_step` is the only method that mutates parameters.
/// `generate` only reads them and must be called while an
/// [`InferenceGuard`] is held.
pub trait Seq2SeqLearner: InferenceMode {
    /// Forward, backward, optimiser step, scheduler step.
    fn train_step(&mut self, batch: &Batch, with_accuracy: bool) -> Result<StepOutput>;

    /// Generated token ids per example, without the decoder
    /// start token and without trailing padding.
    fn generate(
        &self,
        batch: &Batch,
        policy: GenerationPolicy,
        max_length: usize,
    ) -> Result<Vec<Vec<u32>>>;

    /// Persist parameters and configuration, replacing the
    /// previous checkpoint.
    fn save_checkpoint(&self, global_step: usize) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Flag {
        inference: bool,
        transitions: Vec<bool>,
    }

    impl InferenceMode for Flag {
        fn enter_inference_mode(&mut self) {
            self.inference = true;
            self.transitions.push(true);
        }

        fn exit_inference_mode(&mut self) {
            self.inference = false;
            self.transitions.push(false);
        }
    }

    fn fails_inside(flag: &mut Flag) -> Result<()> {
        let guard = InferenceGuard::enter(flag);
        assert!(guard.inference);
        anyhow::bail!("generation failed")
    }

    #[test]
    fn guard_restores_training_mode_on_drop() {
        let mut flag = Flag::default();
        {
            let guard = InferenceGuard::enter(&mut flag);
            assert!(guard.inference);
        }
        assert!(!flag.inference);
        assert_eq!(flag.transitions, vec![true, false]);
    }

    #[test]
    fn guard_restores_training_mode_on_error() {
        let mut flag = Flag::default();
        assert!(fails_inside(&mut flag).is_err());
        assert!(!flag.inference);
        assert_eq!(flag.transitions, vec![true, false]);
    }
}
