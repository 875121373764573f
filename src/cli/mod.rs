// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`     — fine-tunes a translation model on a JSONL corpus
//   2. `translate` — loads a trained output directory and translates text

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, TrainArgs, TranslateArgs};

use crate::application::train_use_case::{TrainConfig, TrainUseCase};
use crate::application::translate_use_case::{TranslateRequest, TranslateUseCase};

#[derive(Parser, Debug)]
#[command(
    name = "mt-trainer",
    version,
    about = "Train a sequence-to-sequence translation model and score it with BLEU."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case; the CLI never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)     => run_train(args),
            Commands::Translate(args) => run_translate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = TrainConfig::try_from(args)?;
    tracing::info!(
        "Training {} → {} on '{}'",
        config.source_lang,
        config.target_lang,
        config.train_file.display()
    );

    TrainUseCase::new(config.clone()).execute()?;

    println!("Training complete. Model saved in '{}'.", config.output_dir.display());
    Ok(())
}

fn run_translate(args: TranslateArgs) -> Result<()> {
    let request = TranslateRequest::try_from(args)?;
    let translation = TranslateUseCase::new(request)?.execute()?;
    println!("{translation}");
    Ok(())
}
