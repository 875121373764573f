// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration
//   Step 2: Load sentence pairs            (Layer 4 - data)
//   Step 3: Split off / load the eval set  (Layer 4 - data)
//   Step 4: Build or load the tokenizer    (Layer 6 - infra)
//   Step 5: Tokenize both splits           (Layer 4 - data)
//   Step 6: Save config for inference      (Layer 6 - infra)
//   Step 7: Build model, optimiser, LR schedule on the chosen
//           device and run the training loop (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    optim::AdamWConfig,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::data::{
    dataset::TranslationDataset,
    loader::JsonlPairLoader,
    preprocessor::{clean, task_prefix, SequencePreprocessor},
    splitter::{split_off_eval, take_subset, SPLIT_SEED},
};
use crate::domain::error::PipelineError;
use crate::domain::training_state::GenerationPolicy;
use crate::domain::traits::{PairSource, TextTokenizer};
use crate::domain::translation_pair::RawPair;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    tokenizer_store::{HfTextTokenizer, TokenizerStore, SPECIAL_TOKENS},
};
use crate::ml::{
    learner::BurnLearner,
    model::Seq2SeqTransformerConfig,
    scheduler::{LrScheduler, LrSchedulerType},
    trainer::{StepBudget, TrainingLoop},
};

/// `--debug` keeps only this many training pairs.
pub const DEBUG_TRAIN_PAIRS: usize = 1000;
/// `--debug` keeps only this many evaluation pairs.
pub const DEBUG_EVAL_PAIRS: usize = 100;

// ─── Closed option sets ───────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationType {
    Greedy,
    BeamSearch,
}

impl FromStr for GenerationType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(Self::Greedy),
            "beam_search" => Ok(Self::BeamSearch),
            other => Err(PipelineError::Config(format!(
                "unknown generation type '{other}' (expected greedy or beam_search)"
            ))),
        }
    }
}

/// Where tensors live during training and inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Wgpu,
    Cpu,
}

impl FromStr for DeviceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(PipelineError::Config(format!(
                "unknown device '{other}' (expected wgpu or cpu)"
            ))),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wgpu => write!(f, "wgpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All options of a training run, validated once and then only
// read. Serialisable so it can be saved next to the checkpoint
// and reloaded for inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_file:                PathBuf,
    pub eval_file:                 Option<PathBuf>,
    pub output_dir:                PathBuf,
    pub source_lang:               String,
    pub target_lang:               String,
    pub max_seq_length:            usize,
    pub preprocessing_num_workers: usize,
    pub batch_size:                usize,
    pub learning_rate:             f64,
    pub weight_decay:              f64,
    pub num_train_epochs:          usize,
    pub max_train_steps:           Option<usize>,
    pub lr_scheduler_type:         LrSchedulerType,
    pub num_warmup_steps:          usize,
    pub eval_every_steps:          usize,
    pub logging_steps:             usize,
    pub generation_type:           GenerationType,
    pub beam_size:                 usize,
    /// Seeds burn, the epoch shuffle and the example picker.
    pub seed:                      u64,
    pub eval_size:                 usize,
    pub debug:                     bool,
    pub device:                    DeviceKind,
    pub vocab_size:                usize,
    pub d_model:                   usize,
    pub num_heads:                 usize,
    pub num_layers:                usize,
    pub d_ff:                      usize,
    pub dropout:                   f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_file:                PathBuf::from("data/train.jsonl"),
            eval_file:                 None,
            output_dir:                PathBuf::from("output"),
            source_lang:               "en".to_string(),
            target_lang:               "de".to_string(),
            max_seq_length:            128,
            preprocessing_num_workers: 8,
            batch_size:                8,
            learning_rate:             3e-4,
            weight_decay:              0.0,
            num_train_epochs:          1,
            max_train_steps:           None,
            lr_scheduler_type:         LrSchedulerType::Linear,
            num_warmup_steps:          0,
            eval_every_steps:          5000,
            logging_steps:             10,
            generation_type:           GenerationType::BeamSearch,
            beam_size:                 5,
            // Fixed rather than absent: every run is reproducible unless
            // `--seed` is changed.
            seed:                      42,
            eval_size:                 2000,
            debug:                     false,
            device:                    DeviceKind::Wgpu,
            vocab_size:                32000,
            d_model:                   256,
            num_heads:                 8,
            num_layers:                4,
            d_ff:                      1024,
            dropout:                   0.1,
        }
    }
}

impl TrainConfig {
    /// Reject option combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: String| Err(PipelineError::Config(msg));

        if self.batch_size == 0 {
            return fail("batch_size must be at least 1".into());
        }
        if self.max_seq_length < 2 {
            return fail("max_seq_length must be at least 2".into());
        }
        if self.eval_every_steps == 0 {
            return fail("eval_every_steps must be at least 1".into());
        }
        if self.logging_steps == 0 {
            return fail("logging_steps must be at least 1".into());
        }
        if self.beam_size == 0 {
            return fail("beam_size must be at least 1".into());
        }
        if !(self.learning_rate > 0.0) {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        if !(self.weight_decay >= 0.0) {
            return fail(format!("weight_decay must be non-negative, got {}", self.weight_decay));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if self.num_train_epochs == 0 {
            return fail("num_train_epochs must be at least 1".into());
        }
        if self.max_train_steps == Some(0) {
            return fail("max_train_steps must be at least 1 when given".into());
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return fail(format!(
                "d_model ({}) must be divisible by num_heads ({})",
                self.d_model, self.num_heads
            ));
        }
        if self.source_lang == self.target_lang {
            return fail(format!("source and target language are both '{}'", self.source_lang));
        }
        if self.preprocessing_num_workers == 0 {
            return fail("preprocessing_num_workers must be at least 1".into());
        }
        if self.vocab_size <= SPECIAL_TOKENS.len() {
            return fail(format!(
                "vocab_size must exceed the {} special tokens",
                SPECIAL_TOKENS.len()
            ));
        }
        Ok(())
    }

    /// Resolve generation_type + beam_size once.
    pub fn generation_policy(&self) -> GenerationPolicy {
        match self.generation_type {
            GenerationType::Greedy => GenerationPolicy::Greedy,
            GenerationType::BeamSearch => GenerationPolicy::BeamSearch { beam_size: self.beam_size },
        }
    }

    /// Model architecture for a tokenizer with `vocab_size` ids.
    pub fn model_config(&self, vocab_size: usize, pad_id: u32) -> Seq2SeqTransformerConfig {
        Seq2SeqTransformerConfig::new(
            vocab_size,
            self.max_seq_length,
            self.d_model,
            self.num_heads,
            self.num_layers,
            self.d_ff,
            self.dropout,
            pad_id as usize,
        )
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2 + 3: Load pairs and the evaluation split ──────────────────
        tracing::info!("Loading training pairs from '{}'", cfg.train_file.display());
        let train_pairs = JsonlPairLoader::new(&cfg.train_file).load_all()?;

        let (train_pairs, eval_pairs) = match &cfg.eval_file {
            Some(path) => {
                tracing::info!("Loading evaluation pairs from '{}'", path.display());
                (train_pairs, JsonlPairLoader::new(path).load_all()?)
            }
            None => split_off_eval(train_pairs, cfg.eval_size, SPLIT_SEED),
        };

        let (train_pairs, eval_pairs) = if cfg.debug {
            tracing::warn!("Debug run: keeping {} train / {} eval pairs", DEBUG_TRAIN_PAIRS, DEBUG_EVAL_PAIRS);
            (take_subset(train_pairs, DEBUG_TRAIN_PAIRS), take_subset(eval_pairs, DEBUG_EVAL_PAIRS))
        } else {
            (train_pairs, eval_pairs)
        };
        tracing::info!("Split: {} train, {} evaluation", train_pairs.len(), eval_pairs.len());

        // ── Step 4: Build / load tokenizer ────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.output_dir)?;
        let corpus = tokenizer_corpus(cfg, &train_pairs);
        let tokenizer = TokenizerStore::new(&cfg.output_dir).load_or_build(&corpus, cfg.vocab_size)?;
        let tokenizer = HfTextTokenizer::new(tokenizer)?;

        // ── Step 5: Tokenize ─────────────────────────────────────────────────
        let preprocessor = SequencePreprocessor::new(
            &tokenizer, &cfg.source_lang, &cfg.target_lang, cfg.max_seq_length,
        );
        let train = TranslationDataset::new(
            preprocessor.process_all(&train_pairs, cfg.preprocessing_num_workers)?,
        );
        let eval = TranslationDataset::new(
            preprocessor.process_all(&eval_pairs, cfg.preprocessing_num_workers)?,
        );

        // ── Step 6: Save config for inference ─────────────────────────────────
        ckpt_manager.save_config(cfg)?;

        // ── Step 7: Train on the chosen device ────────────────────────────────
        match cfg.device {
            DeviceKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                run::<Wgpu>(cfg, &tokenizer, &train, &eval, ckpt_manager, device)
            }
            DeviceKind::Cpu => {
                tracing::info!("Using CPU (NdArray) backend");
                run::<NdArray>(cfg, &tokenizer, &train, &eval, ckpt_manager, NdArrayDevice::Cpu)
            }
        }
    }
}

/// Texts the word-level vocabulary is counted over: prefixed
/// sources and plain targets, as the preprocessor will see them.
fn tokenizer_corpus(cfg: &TrainConfig, pairs: &[RawPair]) -> Vec<String> {
    let mut texts = vec![task_prefix(&cfg.source_lang, &cfg.target_lang)];
    for pair in pairs {
        texts.extend(pair.text(&cfg.source_lang).map(clean));
        texts.extend(pair.text(&cfg.target_lang).map(clean));
    }
    texts
}

fn run<B: Backend>(
    cfg:          &TrainConfig,
    tokenizer:    &HfTextTokenizer,
    train:        &TranslationDataset,
    eval:         &TranslationDataset,
    ckpt_manager: CheckpointManager,
    device:       B::Device,
) -> Result<()> {
    B::seed(cfg.seed);

    let model = cfg
        .model_config(tokenizer.vocab_size(), tokenizer.pad_id())
        .init::<Autodiff<B>>(&device);
    tracing::info!(
        "Model ready: {} encoder + {} decoder layers, d_model={}, vocab={}",
        cfg.num_layers, cfg.num_layers, cfg.d_model, tokenizer.vocab_size()
    );

    let optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init();

    let budget = StepBudget::resolve(
        cfg.num_train_epochs,
        cfg.max_train_steps,
        train.steps_per_epoch(cfg.batch_size),
    );
    let scheduler = LrScheduler::new(
        cfg.lr_scheduler_type,
        cfg.learning_rate,
        cfg.num_warmup_steps,
        budget.max_train_steps,
    );

    let mut learner = BurnLearner::<B, _>::new(
        model,
        optim,
        scheduler,
        device,
        ckpt_manager,
        cfg.clone(),
        tokenizer.pad_id(),
        tokenizer.eos_id(),
    );
    let mut sink = MetricsLogger::new(&cfg.output_dir)?;
    tracing::info!("Appending metrics to '{}'", sink.path().display());

    let state = TrainingLoop::new(cfg, tokenizer).run(&mut learner, &mut sink, train, eval)?;

    tracing::info!(
        "Training finished after {} steps, model saved in '{}'",
        state.global_step,
        cfg.output_dir.display()
    );
    Ok(())
}
