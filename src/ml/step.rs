// ============================================================
// Layer 5 — Step Executor
// ============================================================
// One optimisation step, always in this order:
//
//   1. forward pass, teacher-forced loss (pad labels ignored)
//   2. backward pass
//   3. optimiser update with the scheduler's current rate
//   4. scheduler advance
//
// Gradients are consumed by the optimiser update, so nothing
// carries over to the next call: there is no accumulation.
//
// Token accuracy is a diagnostic. It is only computed when the
// caller asks for it, and it is averaged over positions whose
// label is not pad.

use burn::{
    backend::Autodiff,
    optim::{GradientsParams, Optimizer},
    prelude::*,
};

use crate::domain::error::PipelineError;
use crate::domain::training_state::StepOutput;
use crate::ml::batcher::TranslationBatch;
use crate::ml::model::Seq2SeqTransformer;
use crate::ml::scheduler::LrScheduler;

/// Fraction of non-pad label positions where argmax(logits) == label.
///
/// logits: [batch, len, vocab], labels: [batch, len]
pub fn masked_accuracy<B: Backend>(
    logits: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
    pad_id: u32,
) -> Result<f64, PipelineError> {
    let [batch_size, len] = labels.dims();
    let real = labels.clone().equal_elem(pad_id as i64).bool_not().int();

    let total: i64 = real.clone().sum().into_scalar().elem::<i64>();
    if total == 0 {
        return Err(PipelineError::DivisionDegeneracy);
    }

    let predictions = logits.argmax(2).reshape([batch_size, len]);
    let correct: i64 = (predictions.equal(labels).int() * real)
        .sum()
        .into_scalar()
        .elem::<i64>();

    Ok(correct as f64 / total as f64)
}

/// Run one step. The model is moved in and the updated model is
/// returned, as burn optimisers consume the module they update.
pub fn execute_step<B, O>(
    model:         Seq2SeqTransformer<Autodiff<B>>,
    optim:         &mut O,
    scheduler:     &mut LrScheduler,
    batch:         &TranslationBatch<Autodiff<B>>,
    pad_id:        u32,
    with_accuracy: bool,
) -> (Seq2SeqTransformer<Autodiff<B>>, StepOutput)
where
    B: Backend,
    O: Optimizer<Seq2SeqTransformer<Autodiff<B>>, Autodiff<B>>,
{
    let (loss, logits) = model.forward_loss(batch);
    let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

    let accuracy = if with_accuracy {
        match masked_accuracy(logits, batch.labels.clone(), pad_id) {
            Ok(acc) => Some(acc),
            Err(err) => {
                tracing::warn!("Skipping token accuracy: {err}");
                None
            }
        }
    } else {
        None
    };

    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optim.step(scheduler.current_lr(), model, grads);
    scheduler.advance();

    let output = StepOutput {
        loss: loss_val,
        learning_rate: scheduler.current_lr(),
        accuracy,
    };
    (model, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::collator::Collator;
    use crate::domain::translation_pair::TokenizedExample;
    use crate::ml::batcher::TranslationBatcher;
    use crate::ml::scheduler::LrSchedulerType;
    use crate::testing::tiny_model_config;
    use burn::{backend::NdArray, optim::AdamWConfig, tensor::TensorData};

    type TB = NdArray;
    type AB = Autodiff<NdArray>;

    fn logits_preferring(tokens: &[[usize; 3]; 2], vocab: usize) -> Tensor<TB, 3> {
        let mut values = vec![0.0f32; 2 * 3 * vocab];
        for (b, row) in tokens.iter().enumerate() {
            for (t, &tok) in row.iter().enumerate() {
                values[(b * 3 + t) * vocab + tok] = 5.0;
            }
        }
        Tensor::from_data(TensorData::new(values, [2, 3, vocab]), &Default::default())
    }

    fn labels(rows: [[i64; 3]; 2]) -> Tensor<TB, 2, Int> {
        let flat: Vec<i64> = rows.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [2, 3]), &Default::default())
    }

    #[test]
    fn accuracy_ignores_pad_positions() {
        // Row 0: 2/2 correct, pad predicted wrong; row 1: 1/3 correct.
        let logits = logits_preferring(&[[4, 5, 3], [6, 2, 2]], 8);
        let acc = masked_accuracy(logits, labels([[4, 5, 0], [6, 7, 1]]), 0).unwrap();
        assert!((acc - 3.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn all_pad_labels_are_degenerate() {
        let logits = logits_preferring(&[[0, 0, 0], [0, 0, 0]], 4);
        let err = masked_accuracy(logits, labels([[0, 0, 0], [0, 0, 0]]), 0).unwrap_err();
        assert_eq!(err, PipelineError::DivisionDegeneracy);
    }

    #[test]
    fn step_advances_scheduler_and_reports_next_rate() {
        let device = Default::default();
        let model: Seq2SeqTransformer<AB> = tiny_model_config().init(&device);
        let mut optim = AdamWConfig::new().init();
        let mut scheduler = LrScheduler::new(LrSchedulerType::Linear, 1e-2, 2, 10);

        let batch = Collator::new(0).collate(&[
            TokenizedExample::new(vec![4, 5, 1], vec![7, 1]),
            TokenizedExample::new(vec![6, 1], vec![8, 9, 1]),
        ]);
        let batch = TranslationBatcher::<AB>::new(device).to_tensors(&batch);

        let (model, first) = execute_step(model, &mut optim, &mut scheduler, &batch, 0, true);
        assert!(first.loss.is_finite());
        assert!((first.learning_rate - 5e-3).abs() < 1e-12);
        assert!(first.accuracy.is_some());

        let (_, second) = execute_step(model, &mut optim, &mut scheduler, &batch, 0, false);
        assert!((second.learning_rate - 1e-2).abs() < 1e-12);
        assert_eq!(second.accuracy, None);
        assert_eq!(scheduler.step(), 2);
    }
}
