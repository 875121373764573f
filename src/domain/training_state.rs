// ============================================================
// Layer 3 — Training State and Results
// ============================================================
// TrainingState is owned by the loop controller. `global_step`
// is the only clock: logging, evaluation and termination all
// read it, and it moves forward by exactly one per batch.

use serde::{Deserialize, Serialize};

/// Smoothing factor for the running loss.
const LOSS_EMA_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub global_step: usize,
    pub epoch: usize,
    /// Exponential moving average of the training loss.
    pub running_loss: Option<f64>,
    pub learning_rate: f64,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished optimisation step into the state.
    pub fn record_step(&mut self, output: &StepOutput) {
        self.global_step += 1;
        self.learning_rate = output.learning_rate;
        self.running_loss = Some(match self.running_loss {
            Some(prev) => LOSS_EMA_ALPHA * output.loss + (1.0 - LOSS_EMA_ALPHA) * prev,
            None => output.loss,
        });
    }
}

/// What one optimisation step reports back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub loss: f64,
    /// Learning rate after the scheduler advanced.
    pub learning_rate: f64,
    /// Masked token accuracy; `None` when it was not requested
    /// or the batch had no non-padding labels.
    pub accuracy: Option<f64>,
}

/// Result of one full pass over the evaluation set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub bleu_score: f64,
    pub mean_generation_length: f64,
}

/// Decoding strategy used during evaluation and translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationPolicy {
    Greedy,
    BeamSearch { beam_size: usize },
}

impl GenerationPolicy {
    /// Number of hypotheses kept per example.
    pub fn width(&self) -> usize {
        match self {
            GenerationPolicy::Greedy => 1,
            GenerationPolicy::BeamSearch { beam_size } => *beam_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(loss: f64) -> StepOutput {
        StepOutput { loss, learning_rate: 1e-3, accuracy: None }
    }

    #[test]
    fn global_step_moves_by_one_per_record() {
        let mut state = TrainingState::new();
        for expected in 1..=5 {
            state.record_step(&step(1.0));
            assert_eq!(state.global_step, expected);
        }
    }

    #[test]
    fn running_loss_is_smoothed() {
        let mut state = TrainingState::new();
        state.record_step(&step(2.0));
        assert_eq!(state.running_loss, Some(2.0));
        state.record_step(&step(1.0));
        let loss = state.running_loss.unwrap();
        assert!((loss - 1.9).abs() < 1e-12);
    }

    #[test]
    fn greedy_has_width_one() {
        assert_eq!(GenerationPolicy::Greedy.width(), 1);
        assert_eq!(GenerationPolicy::BeamSearch { beam_size: 4 }.width(), 4);
    }
}
