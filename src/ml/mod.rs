// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code apart
// from the checkpoint recorder in infra.
//
// What's in this layer:
//
//   batcher.rs    — host Batch → tensors, shifted decoder input
//   model.rs      — encoder-decoder transformer and its loss
//   generation.rs — greedy and beam-search decoding
//   scheduler.rs  — warmup + decay learning-rate schedules
//   step.rs       — Step Executor: one optimisation step and
//                   the masked token accuracy diagnostic
//   learner.rs    — BurnLearner, the Seq2SeqLearner that owns
//                   model, optimiser, scheduler and checkpoints
//   bleu.rs       — corpus BLEU (sacreBLEU defaults)
//   evaluator.rs  — Decoder/Evaluator over the held-out set
//   trainer.rs    — Loop Controller for a whole run
//   inferencer.rs — single-sentence translation from a checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            Papineni et al. (2002) BLEU

/// Tensor conversion of collated batches
pub mod batcher;

/// Encoder-decoder transformer architecture
pub mod model;

/// Greedy and beam-search generation
pub mod generation;

/// Learning-rate schedules
pub mod scheduler;

/// One optimisation step
pub mod step;

/// Burn-backed Seq2SeqLearner
pub mod learner;

/// Corpus-level BLEU
pub mod bleu;

/// Generation-based evaluation
pub mod evaluator;

/// Training loop with periodic evaluation and checkpointing
pub mod trainer;

/// Loads a checkpoint and translates text
pub mod inferencer;
