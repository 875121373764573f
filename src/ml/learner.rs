// ============================================================
// Layer 5 — Burn Learner
// ============================================================
// The production Seq2SeqLearner: model, AdamW optimiser, LR
// scheduler and checkpoint manager behind one owner.
//
// Training mode and inference mode are two different values:
//
//   training   Seq2SeqTransformer<Autodiff<B>>, dropout active
//   inference  Seq2SeqTransformer<B> from model.valid(),
//              no autodiff graph, dropout disabled
//
// Entering inference mode takes a `valid()` snapshot of the
// current weights; leaving it drops the snapshot. `generate`
// only ever sees the snapshot, so it cannot touch parameters.

use anyhow::{Context, Result};
use burn::{backend::Autodiff, module::AutodiffModule, optim::Optimizer, prelude::*};

use crate::application::train_use_case::TrainConfig;
use crate::domain::batch::Batch;
use crate::domain::error::PipelineError;
use crate::domain::training_state::{GenerationPolicy, StepOutput};
use crate::domain::traits::{InferenceMode, Seq2SeqLearner};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::batcher::TranslationBatcher;
use crate::ml::generation;
use crate::ml::model::Seq2SeqTransformer;
use crate::ml::scheduler::LrScheduler;
use crate::ml::step::execute_step;

pub struct BurnLearner<B: Backend, O> {
    // `None` only while an optimiser step holds the model.
    model:             Option<Seq2SeqTransformer<Autodiff<B>>>,
    optim:             O,
    scheduler:         LrScheduler,
    batcher:           TranslationBatcher<Autodiff<B>>,
    inference:         Option<Seq2SeqTransformer<B>>,
    inference_batcher: TranslationBatcher<B>,
    checkpoints:       CheckpointManager,
    config:            TrainConfig,
    pad_id:            u32,
    eos_id:            u32,
}

impl<B, O> BurnLearner<B, O>
where
    B: Backend,
    O: Optimizer<Seq2SeqTransformer<Autodiff<B>>, Autodiff<B>>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model:       Seq2SeqTransformer<Autodiff<B>>,
        optim:       O,
        scheduler:   LrScheduler,
        device:      B::Device,
        checkpoints: CheckpointManager,
        config:      TrainConfig,
        pad_id:      u32,
        eos_id:      u32,
    ) -> Self {
        Self {
            model: Some(model),
            optim,
            scheduler,
            batcher: TranslationBatcher::new(device.clone()),
            inference: None,
            inference_batcher: TranslationBatcher::new(device),
            checkpoints,
            config,
            pad_id,
            eos_id,
        }
    }

    fn model(&self) -> Result<&Seq2SeqTransformer<Autodiff<B>>> {
        self.model
            .as_ref()
            .context("model was lost by a failed optimiser step")
    }

    #[cfg(test)]
    pub fn is_in_inference_mode(&self) -> bool {
        self.inference.is_some()
    }
}

impl<B, O> InferenceMode for BurnLearner<B, O>
where
    B: Backend,
    O: Optimizer<Seq2SeqTransformer<Autodiff<B>>, Autodiff<B>>,
{
    fn enter_inference_mode(&mut self) {
        self.inference = self.model.as_ref().map(|m| m.valid());
    }

    fn exit_inference_mode(&mut self) {
        self.inference = None;
    }
}

impl<B, O> Seq2SeqLearner for BurnLearner<B, O>
where
    B: Backend,
    O: Optimizer<Seq2SeqTransformer<Autodiff<B>>, Autodiff<B>>,
{
    fn train_step(&mut self, batch: &Batch, with_accuracy: bool) -> Result<StepOutput> {
        if self.inference.is_some() {
            anyhow::bail!("train_step called while the model is in inference mode");
        }
        let model = self
            .model
            .take()
            .context("model was lost by a failed optimiser step")?;
        let tensors = self.batcher.to_tensors(batch);

        let (model, output) = execute_step(
            model,
            &mut self.optim,
            &mut self.scheduler,
            &tensors,
            self.pad_id,
            with_accuracy,
        );
        self.model = Some(model);
        Ok(output)
    }

    fn generate(
        &self,
        batch:      &Batch,
        policy:     GenerationPolicy,
        max_length: usize,
    ) -> Result<Vec<Vec<u32>>> {
        let model = self
            .inference
            .as_ref()
            .ok_or(PipelineError::InferenceModeRequired)?;
        let tensors = self.inference_batcher.to_tensors(batch);
        Ok(generation::generate(model, &tensors, policy, self.eos_id, max_length))
    }

    fn save_checkpoint(&self, global_step: usize) -> Result<()> {
        self.checkpoints.save_model(self.model()?, global_step)?;
        self.checkpoints.save_config(&self.config)?;
        tracing::info!(
            "Saved checkpoint at step {} to '{}'",
            global_step,
            self.checkpoints.dir().display()
        );
        Ok(())
    }
}
