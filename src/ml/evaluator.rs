// ============================================================
// Layer 5 — Decoder / Evaluator
// ============================================================
// One full pass over the evaluation set:
//
//   enter inference mode (InferenceGuard)
//     for each batch:
//       generate → decode predictions and labels → postprocess
//       append to the corpus BLEU accumulator
//   leave inference mode (guard drop, on every exit path)
//   compute BLEU once over everything collected
//
// Nothing is carried between calls: every evaluation builds a
// fresh accumulator and counters.

use anyhow::Result;

use crate::domain::batch::Batch;
use crate::domain::error::PipelineError;
use crate::domain::training_state::{EvalResult, GenerationPolicy};
use crate::domain::traits::{InferenceGuard, Seq2SeqLearner, TextTokenizer};
use crate::ml::bleu::CorpusBleu;

/// Decoded text of one evaluation batch, for human inspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBatch {
    pub inputs:      Vec<String>,
    pub predictions: Vec<String>,
    pub references:  Vec<String>,
}

impl DecodedBatch {
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub result:     EvalResult,
    pub last_batch: DecodedBatch,
}

/// Trim predictions and references and wrap each reference in a
/// single-element list, the shape BLEU scoring expects.
pub fn postprocess_text(predictions: Vec<String>, references: Vec<String>) -> (Vec<String>, Vec<Vec<String>>) {
    let predictions = predictions.into_iter().map(|p| p.trim().to_string()).collect();
    let references = references
        .into_iter()
        .map(|r| vec![r.trim().to_string()])
        .collect();
    (predictions, references)
}

pub struct Evaluator<'a, T: TextTokenizer> {
    tokenizer:  &'a T,
    policy:     GenerationPolicy,
    max_length: usize,
}

impl<'a, T: TextTokenizer> Evaluator<'a, T> {
    pub fn new(tokenizer: &'a T, policy: GenerationPolicy, max_length: usize) -> Self {
        Self { tokenizer, policy, max_length }
    }

    fn decode_rows(&self, rows: &[Vec<u32>]) -> Result<Vec<String>> {
        rows.iter().map(|ids| self.tokenizer.decode(ids)).collect()
    }

    /// Generate for every batch and score the whole set.
    ///
    /// Fails with [`PipelineError::EmptyEvaluationSet`] when `batches`
    /// holds no examples.
    pub fn evaluate<L, I>(&self, learner: &mut L, batches: I) -> Result<EvalOutcome>
    where
        L: Seq2SeqLearner + ?Sized,
        I: IntoIterator<Item = Batch>,
    {
        let pad_id = self.tokenizer.pad_id();
        let mut bleu = CorpusBleu::new();
        let mut generated_tokens = 0usize;
        let mut examples = 0usize;
        let mut last_batch = DecodedBatch::default();

        {
            let guard = InferenceGuard::enter(learner);
            for batch in batches {
                if batch.is_empty() {
                    continue;
                }
                let generated = guard.generate(&batch, self.policy, self.max_length)?;

                generated_tokens += generated
                    .iter()
                    .flatten()
                    .filter(|&&id| id != pad_id)
                    .count();
                examples += batch.len();

                let predictions = self.decode_rows(&generated)?;
                let labels = self.decode_rows(&batch.labels)?;
                let inputs = self.decode_rows(&batch.input_ids)?;
                let (predictions, references) = postprocess_text(predictions, labels);

                bleu.add_batch(&predictions, &references);
                last_batch = DecodedBatch {
                    inputs,
                    references: references.into_iter().flatten().collect(),
                    predictions,
                };
            }
        }

        if examples == 0 {
            return Err(PipelineError::EmptyEvaluationSet.into());
        }

        let score = bleu.compute();
        tracing::debug!(
            "BLEU {:.2} (precisions {:?}, bp {:.3}, sys_len {}, ref_len {})",
            score.score, score.precisions, score.brevity_penalty, score.sys_len, score.ref_len,
        );

        Ok(EvalOutcome {
            result: EvalResult {
                bleu_score: score.score,
                mean_generation_length: generated_tokens as f64 / examples as f64,
            },
            last_batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::collator::Collator;
    use crate::data::dataset::TranslationDataset;
    use crate::data::preprocessor::SequencePreprocessor;
    use crate::domain::translation_pair::RawPair;
    use crate::testing::{Generation, ScriptedLearner, WhitespaceTokenizer, PAD};

    const PAIRS: [(&str, &str); 3] = [
        ("the cat sleeps", "die katze schläft"),
        ("the dog runs fast", "der hund läuft schnell"),
        ("good morning", "guten morgen"),
    ];

    fn tokenizer() -> WhitespaceTokenizer {
        let mut words: Vec<&str> = vec!["translate English to German:"];
        for (en, de) in PAIRS {
            words.push(en);
            words.push(de);
        }
        WhitespaceTokenizer::from_corpus(&words)
    }

    fn eval_set(tok: &WhitespaceTokenizer) -> TranslationDataset {
        let pairs: Vec<RawPair> = PAIRS
            .iter()
            .map(|(en, de)| RawPair::new([("en", *en), ("de", *de)]))
            .collect();
        let pre = SequencePreprocessor::new(tok, "en", "de", 32);
        TranslationDataset::new(pre.process_all(&pairs, 1).unwrap())
    }

    #[test]
    fn perfect_predictions_score_100() {
        let tok = tokenizer();
        let data = eval_set(&tok);
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);
        let collator = Collator::new(PAD);

        let outcome = Evaluator::new(&tok, GenerationPolicy::Greedy, 32)
            .evaluate(&mut learner, data.batches(2, &collator))
            .unwrap();

        assert!((outcome.result.bleu_score - 100.0).abs() < 1e-9);
        assert_eq!(outcome.last_batch.predictions, vec!["guten morgen"]);
        assert_eq!(outcome.last_batch.references, vec!["guten morgen"]);
        assert_eq!(outcome.last_batch.inputs, vec!["translate English to German: good morning"]);
    }

    #[test]
    fn generation_length_is_per_example_not_per_batch() {
        let tok = tokenizer();
        let data = eval_set(&tok);
        let mut learner = ScriptedLearner::new(Generation::Lengths(vec![2, 5, 8]));
        let collator = Collator::new(PAD);

        // Batches of 2 and 1: a per-batch mean would give 7.5.
        let outcome = Evaluator::new(&tok, GenerationPolicy::BeamSearch { beam_size: 4 }, 32)
            .evaluate(&mut learner, data.batches(2, &collator))
            .unwrap();

        assert!((outcome.result.mean_generation_length - 5.0).abs() < 1e-12);
    }

    #[test]
    fn empty_set_is_an_error_and_restores_training_mode() {
        let tok = tokenizer();
        let mut learner = ScriptedLearner::new(Generation::EchoLabels);

        let err = Evaluator::new(&tok, GenerationPolicy::Greedy, 32)
            .evaluate(&mut learner, Vec::<Batch>::new())
            .unwrap_err();

        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::EmptyEvaluationSet));
        assert!(!learner.in_inference);
    }

    #[test]
    fn batches_without_rows_are_skipped() {
        let tok = tokenizer();
        let mut learner = ScriptedLearner::new(Generation::Fail);
        let empty = Collator::new(PAD).collate(&[]);

        // A generating learner would fail; an all-empty set never calls it.
        let err = Evaluator::new(&tok, GenerationPolicy::Greedy, 32)
            .evaluate(&mut learner, vec![empty.clone(), empty])
            .unwrap_err();

        assert_eq!(err.downcast_ref::<PipelineError>(), Some(&PipelineError::EmptyEvaluationSet));
        assert_eq!(learner.mode_transitions, vec![true, false]);
    }

    #[test]
    fn generation_failure_still_restores_training_mode() {
        let tok = tokenizer();
        let data = eval_set(&tok);
        let mut learner = ScriptedLearner::new(Generation::Fail);
        let collator = Collator::new(PAD);

        let result = Evaluator::new(&tok, GenerationPolicy::Greedy, 32)
            .evaluate(&mut learner, data.batches(2, &collator));

        assert!(result.is_err());
        assert!(!learner.in_inference);
        assert_eq!(learner.mode_transitions, vec![true, false]);
    }

    #[test]
    fn postprocess_trims_and_wraps_references() {
        let (p, r) = postprocess_text(
            vec!["  hallo welt ".to_string()],
            vec!["\thallo welt\n".to_string()],
        );
        assert_eq!(p, vec!["hallo welt"]);
        assert_eq!(r, vec![vec!["hallo welt".to_string()]]);
    }
}
