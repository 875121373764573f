// ============================================================
// Layer 4 — Train/Evaluation Splitter
// ============================================================
// When the run has no separate evaluation file, a fixed number
// of pairs is carved off the training corpus to serve as the
// held-out set.
//
// Why shuffle before splitting?
//   Corpora are often ordered by source document. Without a
//   shuffle, the held-out set would come from one document only.
//
// The shuffle uses a fixed seed so the same corpus always yields
// the same evaluation set, independent of the training seed.
//
// Reference: rand crate documentation (SliceRandom)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Seed used for the held-out split.
pub const SPLIT_SEED: u64 = 42;

/// Shuffle `samples` and move `eval_size` of them into a
/// second vec. Returns `(train, eval)`.
///
/// `eval_size` is clamped to the number of samples.
pub fn split_off_eval<T>(mut samples: Vec<T>, eval_size: usize, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = total.saturating_sub(eval_size);

    // split_off(n) removes elements [n..] and returns them
    let eval = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} evaluation",
        samples.len(),
        eval.len(),
    );

    (samples, eval)
}

/// Keep at most `limit` samples (used by `--debug` runs).
pub fn take_subset<T>(mut samples: Vec<T>, limit: usize) -> Vec<T> {
    samples.truncate(limit);
    samples
}
