// ============================================================
// Layer 5 — Training Loop (Loop Controller)
// ============================================================
// The top-level state machine of a run:
//
//   for epoch in 0..num_train_epochs
//     for batch in shuffled(train)
//       train_step → global_step += 1 → log loss / lr / epoch
//       every logging_steps     → log token accuracy
//       every eval_every_steps  → evaluate, log BLEU, save,
//       or at max_train_steps     show one decoded example
//       global_step ≥ max_train_steps → stop, even mid-epoch
//   final save (unconditional)
//
// `global_step` is the only clock. It is never reset at an
// epoch boundary, and every scheduling decision reads it.
//
// The loop talks to the model only through Seq2SeqLearner and
// to the metrics transport only through MetricsSink, so it runs
// unchanged against test doubles.

use anyhow::Result;
use burn::data::dataset::Dataset;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};

use crate::application::train_use_case::TrainConfig;
use crate::data::collator::Collator;
use crate::data::dataset::TranslationDataset;
use crate::domain::error::PipelineError;
use crate::domain::training_state::TrainingState;
use crate::domain::traits::{MetricsSink, Seq2SeqLearner, TextTokenizer};
use crate::ml::evaluator::{DecodedBatch, Evaluator};

// ─── Step budget ──────────────────────────────────────────────────────────────
/// How long the run is, resolved once before the first step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBudget {
    pub max_train_steps:  usize,
    /// Only gates the outer loop when no step override was given;
    /// with an override it is derived for logging and always suffices.
    pub num_train_epochs: usize,
    pub steps_per_epoch:  usize,
}

impl StepBudget {
    pub fn resolve(num_train_epochs: usize, max_train_steps: Option<usize>, steps_per_epoch: usize) -> Self {
        match max_train_steps {
            Some(max) => Self {
                max_train_steps:  max,
                num_train_epochs: max.div_ceil(steps_per_epoch.max(1)),
                steps_per_epoch,
            },
            None => Self {
                max_train_steps: num_train_epochs * steps_per_epoch,
                num_train_epochs,
                steps_per_epoch,
            },
        }
    }
}

/// Evaluation and checkpoint trigger for the step that just finished.
pub fn should_evaluate(global_step: usize, eval_every_steps: usize, max_train_steps: usize) -> bool {
    global_step % eval_every_steps.max(1) == 0 || global_step == max_train_steps
}

// ─── TrainingLoop ─────────────────────────────────────────────────────────────
pub struct TrainingLoop<'a, T: TextTokenizer> {
    cfg:       &'a TrainConfig,
    tokenizer: &'a T,
    collator:  Collator,
}

impl<'a, T: TextTokenizer> TrainingLoop<'a, T> {
    pub fn new(cfg: &'a TrainConfig, tokenizer: &'a T) -> Self {
        Self { cfg, tokenizer, collator: Collator::new(tokenizer.pad_id()) }
    }

    /// Run the whole schedule. Returns the final state.
    pub fn run<L, S>(
        &self,
        learner: &mut L,
        sink:    &mut S,
        train:   &TranslationDataset,
        eval:    &TranslationDataset,
    ) -> Result<TrainingState>
    where
        L: Seq2SeqLearner,
        S: MetricsSink,
    {
        let cfg = self.cfg;
        if train.example_count() == 0 {
            return Err(PipelineError::EmptyTrainingSet.into());
        }

        let budget = StepBudget::resolve(
            cfg.num_train_epochs,
            cfg.max_train_steps,
            train.steps_per_epoch(cfg.batch_size),
        );

        tracing::info!("***** Running training *****");
        tracing::info!("  Num examples = {}", train.example_count());
        tracing::info!("  Num epochs = {}", budget.num_train_epochs);
        tracing::info!("  Total optimization steps = {}", budget.max_train_steps);

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        self.log_data_preview(train, &mut rng)?;

        let pb = ProgressBar::new(budget.max_train_steps as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
                .progress_chars("=>-"),
        );

        let mut state = TrainingState::new();

        'epochs: for epoch in 0..budget.num_train_epochs {
            state.epoch = epoch;
            let order = train.epoch_order(Some(&mut rng));

            for indices in order.chunks(cfg.batch_size.max(1)) {
                let batch = train.collate(indices, &self.collator);

                // Accuracy is only paid for on steps that will log it, and
                // only defined when some label is not padding.
                let with_accuracy = (state.global_step + 1) % cfg.logging_steps.max(1) == 0
                    && batch.num_nonpad_labels() > 0;

                let output = learner.train_step(&batch, with_accuracy)?;
                state.record_step(&output);
                let step = state.global_step;

                pb.inc(1);
                pb.set_message(format!("loss {:.4}", state.running_loss.unwrap_or(output.loss)));

                sink.log(step, &[
                    ("train_loss", output.loss),
                    ("learning_rate", output.learning_rate),
                    ("epoch", epoch as f64),
                ])?;

                if with_accuracy {
                    if let Some(accuracy) = output.accuracy {
                        sink.log(step, &[("train_batch_word_accuracy", accuracy)])?;
                    }
                }

                if should_evaluate(step, cfg.eval_every_steps, budget.max_train_steps) {
                    self.evaluate_and_save(learner, sink, eval, step, &mut rng)?;
                }

                if step >= budget.max_train_steps {
                    break 'epochs;
                }
            }
        }

        pb.finish_with_message("done");

        tracing::info!("Saving final model checkpoint");
        learner.save_checkpoint(state.global_step)?;

        Ok(state)
    }

    fn evaluate_and_save<L, S>(
        &self,
        learner: &mut L,
        sink:    &mut S,
        eval:    &TranslationDataset,
        step:    usize,
        rng:     &mut StdRng,
    ) -> Result<()>
    where
        L: Seq2SeqLearner,
        S: MetricsSink,
    {
        let evaluator = Evaluator::new(self.tokenizer, self.cfg.generation_policy(), self.cfg.max_seq_length);
        let outcome = evaluator.evaluate(learner, eval.batches(self.cfg.batch_size, &self.collator))?;

        sink.log(step, &[
            ("eval/bleu", outcome.result.bleu_score),
            ("eval/generation_length", outcome.result.mean_generation_length),
        ])?;
        tracing::info!(
            "Step {}: eval/bleu = {:.2}, eval/generation_length = {:.2}",
            step, outcome.result.bleu_score, outcome.result.mean_generation_length,
        );

        learner.save_checkpoint(step)?;
        log_generation_example(&outcome.last_batch, rng);
        Ok(())
    }

    /// Decoded training examples, so a broken preprocessing run is
    /// visible before any compute is spent on it.
    fn log_data_preview(&self, train: &TranslationDataset, rng: &mut StdRng) -> Result<()> {
        let n = train.example_count();
        for index in sample(rng, n, n.min(2)).into_vec() {
            if let Some(example) = train.get(index) {
                tracing::info!("Sample {} of the training set:", index);
                tracing::info!("  Decoded input_ids: {}", self.tokenizer.decode(&example.input_ids)?);
                tracing::info!("  Decoded labels: {}", self.tokenizer.decode(&example.label_ids)?);
            }
        }

        let first: Vec<usize> = (0..n.min(self.cfg.batch_size.max(1))).collect();
        let batch = train.collate(&first, &self.collator);
        tracing::info!("Look at the data that we input into the model:");
        for row in sample(rng, batch.len(), batch.len().min(2)).into_vec() {
            tracing::info!("  Decoded input_ids: {}", self.tokenizer.decode(&batch.input_ids[row])?);
            tracing::info!("  Decoded labels: {}", self.tokenizer.decode(&batch.labels[row])?);
        }
        Ok(())
    }
}

fn log_generation_example(last: &DecodedBatch, rng: &mut StdRng) {
    if last.is_empty() {
        return;
    }
    let i = rng.gen_range(0..last.len());
    tracing::info!("Generation example:");
    tracing::info!("  Input sentence: {}", last.inputs[i]);
    tracing::info!("  Generated sentence: {}", last.predictions[i]);
    tracing::info!("  Reference sentence: {}", last.references[i]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::SequencePreprocessor;
    use crate::domain::translation_pair::RawPair;
    use crate::testing::{Generation, RecordingSink, ScriptedLearner, WhitespaceTokenizer};

    const WORDS: &str = "translate English to German: one two three four five six seven eight nine ten \
                         eins zwei drei vier fünf sechs sieben acht neun zehn ist eine zahl";

    fn tokenizer() -> WhitespaceTokenizer {
        WhitespaceTokenizer::from_corpus(&[WORDS])
    }

    fn dataset(tok: &WhitespaceTokenizer, n: usize) -> TranslationDataset {
        let en = ["one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten"];
        let de = ["eins", "zwei", "drei", "vier", "fünf", "sechs", "sieben", "acht", "neun", "zehn"];
        let pairs: Vec<RawPair> = (0..n)
            // Four-word targets so every BLEU n-gram order has counts.
            .map(|i| {
                let target = format!("{} ist eine zahl", de[i % 10]);
                RawPair::new([("en", en[i % 10].to_string()), ("de", target)])
            })
            .collect();
        let pre = SequencePreprocessor::new(tok, "en", "de", 16);
        TranslationDataset::new(pre.process_all(&pairs, 2).unwrap())
    }

    fn config(epochs: usize, max_steps: Option<usize>, eval_every: usize, logging: usize) -> TrainConfig {
        TrainConfig {
            batch_size:       2,
            num_train_epochs: epochs,
            max_train_steps:  max_steps,
            eval_every_steps: eval_every,
            logging_steps:    logging,
            ..TrainConfig::default()
        }
    }

    fn run(cfg: &TrainConfig, learner: &mut ScriptedLearner) -> (Result<TrainingState>, RecordingSink) {
        let tok = tokenizer();
        let train = dataset(&tok, 10);
        let eval = dataset(&tok, 3);
        let mut sink = RecordingSink::default();
        let result = TrainingLoop::new(cfg, &tok).run(learner, &mut sink, &train, &eval);
        (result, sink)
    }

    #[test]
    fn budget_from_epochs() {
        let b = StepBudget::resolve(3, None, 5);
        assert_eq!((b.max_train_steps, b.num_train_epochs), (15, 3));
    }

    #[test]
    fn budget_override_recomputes_epochs_by_ceiling() {
        let b = StepBudget::resolve(1, Some(7), 5);
        assert_eq!((b.max_train_steps, b.num_train_epochs), (7, 2));
        let b = StepBudget::resolve(9, Some(10), 5);
        assert_eq!((b.max_train_steps, b.num_train_epochs), (10, 2));
    }

    #[test]
    fn trigger_on_multiples_and_final_step() {
        let fired: Vec<usize> = (1..=10).filter(|&s| should_evaluate(s, 4, 10)).collect();
        assert_eq!(fired, vec![4, 8, 10]);
        let fired: Vec<usize> = (1..=8).filter(|&s| should_evaluate(s, 4, 8)).collect();
        assert_eq!(fired, vec![4, 8]);
    }

    #[test]
    fn runs_every_epoch_without_override() {
        let cfg = config(2, None, 4, 10);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let (state, sink) = run(&cfg, &mut learner);
        let state = state.unwrap();

        assert_eq!(state.global_step, 10);
        assert_eq!(state.epoch, 1);
        assert_eq!(learner.steps.len(), 10);
        assert_eq!(sink.steps_with("train_loss"), (1..=10).collect::<Vec<_>>());
        assert_eq!(sink.steps_with("eval/bleu"), vec![4, 8, 10]);
        // Final save repeats the step-10 save.
        assert_eq!(*learner.saves.borrow(), vec![4, 8, 10, 10]);
    }

    #[test]
    fn step_override_stops_mid_epoch() {
        let cfg = config(1, Some(7), 3, 10);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let (state, sink) = run(&cfg, &mut learner);

        assert_eq!(state.unwrap().global_step, 7);
        assert_eq!(learner.steps.len(), 7);
        assert_eq!(sink.steps_with("eval/bleu"), vec![3, 6, 7]);
        assert_eq!(*learner.saves.borrow(), vec![3, 6, 7, 7]);
        assert_eq!(sink.values_of("epoch"), vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn accuracy_only_on_logging_steps() {
        let cfg = config(2, None, 100, 3);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let (state, sink) = run(&cfg, &mut learner);
        state.unwrap();

        assert_eq!(sink.steps_with("train_batch_word_accuracy"), vec![3, 6, 9]);
        let requested: Vec<usize> = learner
            .steps
            .iter()
            .enumerate()
            .filter(|(_, &acc)| acc)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(requested, vec![3, 6, 9]);
    }

    #[test]
    fn each_evaluation_enters_and_leaves_inference_mode() {
        let cfg = config(2, None, 4, 10);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let (state, sink) = run(&cfg, &mut learner);
        state.unwrap();

        assert!(!learner.in_inference);
        assert_eq!(learner.mode_transitions, vec![true, false, true, false, true, false]);
        let bleu = sink.values_of("eval/bleu");
        assert_eq!(bleu.len(), 3);
        assert!(bleu.iter().all(|&b| (b - 100.0).abs() < 1e-9), "{bleu:?}");
    }

    #[test]
    fn learning_rate_is_logged_every_step() {
        let cfg = config(1, None, 100, 10);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let (state, sink) = run(&cfg, &mut learner);
        state.unwrap();
        assert_eq!(sink.values_of("learning_rate"), vec![0.1; 5]);
    }

    #[test]
    fn empty_training_set_fails_before_any_step() {
        let tok = tokenizer();
        let cfg = config(1, None, 4, 10);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let mut sink = RecordingSink::default();
        let err = TrainingLoop::new(&cfg, &tok)
            .run(&mut learner, &mut sink, &TranslationDataset::new(vec![]), &dataset(&tok, 2))
            .unwrap_err();

        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::EmptyTrainingSet));
        assert!(learner.steps.is_empty());
    }

    #[test]
    fn empty_evaluation_set_fails_at_first_trigger() {
        let tok = tokenizer();
        let cfg = config(1, None, 2, 10);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let mut sink = RecordingSink::default();
        let err = TrainingLoop::new(&cfg, &tok)
            .run(&mut learner, &mut sink, &dataset(&tok, 10), &TranslationDataset::new(vec![]))
            .unwrap_err();

        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::EmptyEvaluationSet));
        assert_eq!(learner.steps.len(), 2);
        assert!(learner.saves.borrow().is_empty());
        assert!(!learner.in_inference);
    }
}
