// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// What a checkpoint directory holds:
//   model.mpk           — all learned parameters (half precision)
//   train_config.json   — the TrainConfig the run was started with
//   checkpoint.json     — {"global_step": n} of the last save
//   tokenizer.json      — written by the TokenizerStore
//
// There is exactly one checkpoint per directory. Every save
// overwrites the previous files, so the latest save wins and
// the last fully written checkpoint survives a crashed run.
//
// The config is stored next to the weights because the model
// must be rebuilt with the same architecture before its record
// can be loaded back.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::Seq2SeqTransformer;

const MODEL_FILE: &str = "model";
const CONFIG_FILE: &str = "train_config.json";
const INFO_FILE: &str = "checkpoint.json";

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointInfo {
    global_step: usize,
}

/// Saves and loads the single checkpoint kept in `dir`.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the weights and the step they belong to, replacing
    /// whatever was there.
    pub fn save_model<B: Backend>(
        &self,
        model:       &Seq2SeqTransformer<B>,
        global_step: usize,
    ) -> Result<()> {
        // CompactRecorder appends the .mpk extension itself.
        let path = self.dir.join(MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let info_path = self.dir.join(INFO_FILE);
        fs::write(&info_path, serde_json::to_string(&CheckpointInfo { global_step })?)
            .with_context(|| format!("Failed to write '{}'", info_path.display()))?;

        tracing::debug!("Saved checkpoint at step {}", global_step);
        Ok(())
    }

    /// Restore weights into a model built with the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  Seq2SeqTransformer<B>,
        device: &B::Device,
    ) -> Result<Seq2SeqTransformer<B>> {
        let path = self.dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display())
            })?;

        tracing::info!("Loaded checkpoint from step {}", self.latest_step()?);
        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'translate'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    /// Step recorded by the last save.
    pub fn latest_step(&self) -> Result<usize> {
        let path = self.dir.join(INFO_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        Ok(serde_json::from_str::<CheckpointInfo>(&s)?.global_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tiny_model_config;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn model_bytes(dir: &Path) -> Vec<u8> {
        fs::read(dir.join("model.mpk")).unwrap()
    }

    #[test]
    fn saving_twice_is_bit_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(tmp.path()).unwrap();
        let model: Seq2SeqTransformer<TB> = tiny_model_config().init(&Default::default());

        manager.save_model(&model, 7).unwrap();
        let first = model_bytes(tmp.path());
        let first_info = fs::read(tmp.path().join(INFO_FILE)).unwrap();

        manager.save_model(&model, 7).unwrap();
        assert_eq!(first, model_bytes(tmp.path()));
        assert_eq!(first_info, fs::read(tmp.path().join(INFO_FILE)).unwrap());
    }

    #[test]
    fn directory_holds_weights_and_step_only_after_model_save() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(tmp.path()).unwrap();
        let model: Seq2SeqTransformer<TB> = tiny_model_config().init(&Default::default());
        manager.save_model(&model, 2).unwrap();

        let mut files: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["checkpoint.json", "model.mpk"]);
    }

    #[test]
    fn later_save_overwrites_step() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(tmp.path()).unwrap();
        let model: Seq2SeqTransformer<TB> = tiny_model_config().init(&Default::default());

        manager.save_model(&model, 3).unwrap();
        manager.save_model(&model, 9).unwrap();
        assert_eq!(manager.latest_step().unwrap(), 9);
    }

    #[test]
    fn loaded_model_saves_the_same_record() {
        let device = Default::default();
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();

        let saved = CheckpointManager::new(a.path()).unwrap();
        let model: Seq2SeqTransformer<TB> = tiny_model_config().init(&device);
        saved.save_model(&model, 1).unwrap();

        let fresh: Seq2SeqTransformer<TB> = tiny_model_config().init(&device);
        let loaded = saved.load_model(fresh, &device).unwrap();
        CheckpointManager::new(b.path()).unwrap().save_model(&loaded, 1).unwrap();

        assert_eq!(model_bytes(a.path()), model_bytes(b.path()));
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(tmp.path()).unwrap();
        assert!(manager.latest_step().is_err());
        assert!(manager.load_config().is_err());
    }
}
