// Test doubles shared by unit tests across layers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use anyhow::Result;

use crate::domain::batch::Batch;
use crate::domain::error::PipelineError;
use crate::domain::training_state::{GenerationPolicy, StepOutput};
use crate::domain::traits::{InferenceMode, MetricsSink, Seq2SeqLearner, TextTokenizer};

pub const PAD: u32 = 0;
pub const EOS: u32 = 1;
pub const UNK: u32 = 2;

/// Word-per-token tokenizer with a vocabulary fixed at construction.
pub struct WhitespaceTokenizer {
    ids: HashMap<String, u32>,
    words: Vec<String>,
}

impl WhitespaceTokenizer {
    pub fn from_corpus(texts: &[&str]) -> Self {
        let mut ids = HashMap::new();
        let mut words = vec!["<pad>".to_string(), "</s>".to_string(), "<unk>".to_string()];
        for word in texts.iter().flat_map(|t| t.split_whitespace()) {
            if !ids.contains_key(word) {
                ids.insert(word.to_string(), words.len() as u32);
                words.push(word.to_string());
            }
        }
        Self { ids, words }
    }

    fn encode_words(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .map(|w| self.ids.get(w).copied().unwrap_or(UNK))
            .collect()
    }
}

impl TextTokenizer for WhitespaceTokenizer {
    fn encode_source(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = self.encode_words(text);
        ids.push(EOS);
        Ok(ids)
    }

    fn encode_target(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = self.encode_words(text);
        ids.push(EOS);
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let words: Vec<&str> = ids
            .iter()
            .filter(|&&id| id != PAD && id != EOS)
            .map(|&id| self.words.get(id as usize).map_or("<unk>", String::as_str))
            .collect();
        Ok(words.join(" "))
    }

    fn pad_id(&self) -> u32 {
        PAD
    }

    fn eos_id(&self) -> u32 {
        EOS
    }
}

/// Keeps every logged record in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Vec<(usize, Vec<(String, f64)>)>,
}

impl RecordingSink {
    /// Steps at which `key` was logged, in order.
    pub fn steps_with(&self, key: &str) -> Vec<usize> {
        self.records
            .iter()
            .filter(|(_, m)| m.iter().any(|(k, _)| k == key))
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn values_of(&self, key: &str) -> Vec<f64> {
        self.records
            .iter()
            .flat_map(|(_, m)| m.iter().filter(|(k, _)| k == key).map(|(_, v)| *v))
            .collect()
    }
}

impl MetricsSink for RecordingSink {
    fn log(&mut self, step: usize, metrics: &[(&str, f64)]) -> Result<()> {
        self.records.push((
            step,
            metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        ));
        Ok(())
    }
}

/// What the scripted learner returns from `generate`.
pub enum Generation {
    /// Each prediction equals the gold labels.
    EchoLabels,
    /// Example i gets `lengths[i % len]` copies of token 3.
    Lengths(Vec<usize>),
    /// Every call fails.
    Fail,
}

/// Learner double that records how the loop drives it.
pub struct ScriptedLearner {
    pub generation: Generation,
    pub in_inference: bool,
    pub mode_transitions: Vec<bool>,
    pub steps: Vec<bool>,
    pub saves: RefCell<Vec<usize>>,
    pub learning_rate: f64,
    generated: Cell<usize>,
}

impl ScriptedLearner {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            in_inference: false,
            mode_transitions: Vec::new(),
            steps: Vec::new(),
            saves: RefCell::new(Vec::new()),
            learning_rate: 0.1,
            generated: Cell::new(0),
        }
    }
}

impl InferenceMode for ScriptedLearner {
    fn enter_inference_mode(&mut self) {
        self.in_inference = true;
        self.mode_transitions.push(true);
    }

    fn exit_inference_mode(&mut self) {
        self.in_inference = false;
        self.mode_transitions.push(false);
    }
}

impl Seq2SeqLearner for ScriptedLearner {
    fn train_step(&mut self, _batch: &Batch, with_accuracy: bool) -> Result<StepOutput> {
        assert!(!self.in_inference, "train_step called in inference mode");
        self.steps.push(with_accuracy);
        Ok(StepOutput {
            loss: 1.0 / self.steps.len() as f64,
            learning_rate: self.learning_rate,
            accuracy: with_accuracy.then_some(0.5),
        })
    }

    fn generate(
        &self,
        batch: &Batch,
        _policy: GenerationPolicy,
        _max_length: usize,
    ) -> Result<Vec<Vec<u32>>> {
        if !self.in_inference {
            return Err(PipelineError::InferenceModeRequired.into());
        }
        match &self.generation {
            Generation::EchoLabels => Ok(batch
                .labels
                .iter()
                .map(|row| row.iter().copied().take_while(|&id| id != PAD).collect())
                .collect()),
            Generation::Lengths(lengths) => Ok((0..batch.len())
                .map(|_| {
                    let i = self.generated.get();
                    self.generated.set(i + 1);
                    vec![3; lengths[i % lengths.len()]]
                })
                .collect()),
            Generation::Fail => anyhow::bail!("scripted generation failure"),
        }
    }

    fn save_checkpoint(&self, global_step: usize) -> Result<()> {
        self.saves.borrow_mut().push(global_step);
        Ok(())
    }
}

/// A model small enough to train a few steps on the CPU backend.
/// Vocabulary of 12 ids, positions up to 16.
pub fn tiny_model_config() -> crate::ml::model::Seq2SeqTransformerConfig {
    crate::ml::model::Seq2SeqTransformerConfig::new(12, 16, 8, 2, 1, 16, 0.0, PAD as usize)
}
