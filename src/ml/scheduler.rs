// ============================================================
// Layer 5 — Learning-Rate Schedules
// ============================================================
// Linear warmup followed by a decay shape. The schedule type is
// parsed once from its name and resolved into an LrScheduler;
// the training loop only calls `current_lr` and `advance`.

use std::f64::consts::PI;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

/// End learning rate of the polynomial schedule.
const POLYNOMIAL_LR_END: f64 = 1e-7;
const POLYNOMIAL_POWER: f64 = 1.0;
/// Cosine half-waves over the decay phase.
const COSINE_CYCLES: f64 = 0.5;
/// Hard restarts of the cosine-with-restarts schedule.
const RESTART_CYCLES: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrSchedulerType {
    Linear,
    Cosine,
    CosineWithRestarts,
    Polynomial,
    Constant,
    ConstantWithWarmup,
}

impl FromStr for LrSchedulerType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "cosine" => Ok(Self::Cosine),
            "cosine_with_restarts" => Ok(Self::CosineWithRestarts),
            "polynomial" => Ok(Self::Polynomial),
            "constant" => Ok(Self::Constant),
            "constant_with_warmup" => Ok(Self::ConstantWithWarmup),
            other => Err(PipelineError::Config(format!(
                "unknown lr_scheduler_type '{other}' (expected linear, cosine, \
                 cosine_with_restarts, polynomial, constant or constant_with_warmup)"
            ))),
        }
    }
}

/// Shape applied after warmup, with its constants resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Decay {
    Linear,
    Cosine { cycles: f64 },
    CosineWithRestarts { cycles: f64 },
    Polynomial { lr_end: f64, power: f64 },
    Constant,
}

#[derive(Clone, Debug)]
pub struct LrScheduler {
    step: usize,
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    /// `constant` skips warmup entirely.
    use_warmup: bool,
    decay: Decay,
}

impl LrScheduler {
    pub fn new(kind: LrSchedulerType, base_lr: f64, warmup_steps: usize, total_steps: usize) -> Self {
        let (use_warmup, decay) = match kind {
            LrSchedulerType::Linear => (true, Decay::Linear),
            LrSchedulerType::Cosine => (true, Decay::Cosine { cycles: COSINE_CYCLES }),
            LrSchedulerType::CosineWithRestarts => {
                (true, Decay::CosineWithRestarts { cycles: RESTART_CYCLES })
            }
            LrSchedulerType::Polynomial => (
                true,
                Decay::Polynomial { lr_end: POLYNOMIAL_LR_END, power: POLYNOMIAL_POWER },
            ),
            LrSchedulerType::Constant => (false, Decay::Constant),
            LrSchedulerType::ConstantWithWarmup => (true, Decay::Constant),
        };
        Self { step: 0, base_lr, warmup_steps, total_steps, use_warmup, decay }
    }

    /// Multiplier on the base learning rate at `step`.
    fn factor(&self, step: usize) -> f64 {
        if self.use_warmup && step < self.warmup_steps {
            return step as f64 / self.warmup_steps.max(1) as f64;
        }

        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        let progress = step.saturating_sub(self.warmup_steps) as f64 / decay_steps;

        match self.decay {
            Decay::Constant => 1.0,
            Decay::Linear => {
                (self.total_steps.saturating_sub(step) as f64 / decay_steps).max(0.0)
            }
            Decay::Cosine { cycles } => {
                (0.5 * (1.0 + (PI * cycles * 2.0 * progress).cos())).max(0.0)
            }
            Decay::CosineWithRestarts { cycles } => {
                if progress >= 1.0 {
                    0.0
                } else {
                    (0.5 * (1.0 + (PI * ((cycles * progress) % 1.0)).cos())).max(0.0)
                }
            }
            Decay::Polynomial { lr_end, power } => {
                if step > self.total_steps {
                    lr_end / self.base_lr
                } else {
                    let remaining = 1.0 - progress;
                    ((self.base_lr - lr_end) * remaining.powf(power) + lr_end) / self.base_lr
                }
            }
        }
    }

    /// Learning rate for the next optimiser step.
    pub fn current_lr(&self) -> f64 {
        self.base_lr * self.factor(self.step)
    }

    pub fn advance(&mut self) {
        self.step += 1;
    }

    #[cfg(test)]
    pub fn step(&self) -> usize {
        self.step
    }
}
