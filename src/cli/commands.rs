// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// The `train` and `translate` subcommands and their flags.
// Closed option sets (scheduler, generation type, device) are
// taken as strings and parsed at the Layer 1 / Layer 2
// boundary, so one invalid value produces one config error.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::train_use_case::{DeviceKind, GenerationType, TrainConfig};
use crate::application::translate_use_case::TranslateRequest;
use crate::domain::error::PipelineError;
use crate::domain::training_state::GenerationPolicy;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a translation model on a JSON-lines parallel corpus
    Train(TrainArgs),

    /// Translate one sentence with a trained model
    Translate(TranslateArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON-lines file with {"translation": {"<src>": ..., "<tgt>": ...}} rows
    #[arg(long)]
    pub train_file: PathBuf,

    /// Evaluation corpus; when absent, `--eval-size` pairs are split off the training file
    #[arg(long)]
    pub eval_file: Option<PathBuf>,

    /// Where the model, tokenizer, config and metrics are written
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "en")]
    pub source_lang: String,

    #[arg(long, default_value = "de")]
    pub target_lang: String,

    /// Token budget for both inputs and labels
    #[arg(long, default_value_t = 128)]
    pub max_seq_length: usize,

    #[arg(long, default_value_t = 8)]
    pub preprocessing_num_workers: usize,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 3e-4)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 1)]
    pub num_train_epochs: usize,

    /// Overrides the epoch count when given
    #[arg(long)]
    pub max_train_steps: Option<usize>,

    /// linear, cosine, cosine_with_restarts, polynomial, constant or constant_with_warmup
    #[arg(long, default_value = "linear")]
    pub lr_scheduler_type: String,

    #[arg(long, default_value_t = 0)]
    pub num_warmup_steps: usize,

    /// Evaluate and checkpoint every N optimiser steps
    #[arg(long, default_value_t = 5000)]
    pub eval_every_steps: usize,

    #[arg(long, default_value_t = 10)]
    pub logging_steps: usize,

    /// greedy or beam_search
    #[arg(long, default_value = "beam_search")]
    pub generation_type: String,

    #[arg(long, default_value_t = 5)]
    pub beam_size: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Pairs held out for evaluation when no eval file is given
    #[arg(long, default_value_t = 2000)]
    pub eval_size: usize,

    /// Train on a small subset to smoke-test the pipeline
    #[arg(long)]
    pub debug: bool,

    /// wgpu or cpu
    #[arg(long, default_value = "wgpu")]
    pub device: String,

    #[arg(long, default_value_t = 32000)]
    pub vocab_size: usize,

    /// Hidden dimension; must be divisible by num_heads
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Encoder and decoder layers each
    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

/// The boundary between Layer 1 and Layer 2: the application
/// layer never sees clap types.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = PipelineError;

    fn try_from(a: TrainArgs) -> Result<Self, Self::Error> {
        let config = TrainConfig {
            train_file:                a.train_file,
            eval_file:                 a.eval_file,
            output_dir:                a.output_dir,
            source_lang:               a.source_lang,
            target_lang:               a.target_lang,
            max_seq_length:            a.max_seq_length,
            preprocessing_num_workers: a.preprocessing_num_workers,
            batch_size:                a.batch_size,
            learning_rate:             a.learning_rate,
            weight_decay:              a.weight_decay,
            num_train_epochs:          a.num_train_epochs,
            max_train_steps:           a.max_train_steps,
            lr_scheduler_type:         a.lr_scheduler_type.parse()?,
            num_warmup_steps:          a.num_warmup_steps,
            eval_every_steps:          a.eval_every_steps,
            logging_steps:             a.logging_steps,
            generation_type:           a.generation_type.parse()?,
            beam_size:                 a.beam_size,
            seed:                      a.seed,
            eval_size:                 a.eval_size,
            debug:                     a.debug,
            device:                    a.device.parse()?,
            vocab_size:                a.vocab_size,
            d_model:                   a.d_model,
            num_heads:                 a.num_heads,
            num_layers:                a.num_layers,
            d_ff:                      a.d_ff,
            dropout:                   a.dropout,
        };
        config.validate()?;
        Ok(config)
    }
}

/// All arguments for the `translate` command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Sentence in the source language
    #[arg(long)]
    pub text: String,

    /// Output directory of a finished `train` run
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// greedy or beam_search
    #[arg(long, default_value = "beam_search")]
    pub generation_type: String,

    #[arg(long, default_value_t = 5)]
    pub beam_size: usize,

    /// Upper bound on the generated sequence, start token included
    #[arg(long, default_value_t = 128)]
    pub max_length: usize,

    /// wgpu or cpu
    #[arg(long, default_value = "wgpu")]
    pub device: String,
}

impl TryFrom<TranslateArgs> for TranslateRequest {
    type Error = PipelineError;

    fn try_from(a: TranslateArgs) -> Result<Self, Self::Error> {
        let policy = match a.generation_type.parse::<GenerationType>()? {
            GenerationType::Greedy => GenerationPolicy::Greedy,
            GenerationType::BeamSearch => GenerationPolicy::BeamSearch { beam_size: a.beam_size },
        };
        Ok(TranslateRequest {
            output_dir: a.output_dir,
            text:       a.text,
            policy,
            max_length: a.max_length,
            device:     a.device.parse::<DeviceKind>()?,
        })
    }
}
