// ============================================================
// Layer 2 — TranslateUseCase
// ============================================================
// Loads a trained output directory and translates one
// sentence:
//
//   Step 1: Load the tokenizer saved during training
//   Step 2: Rebuild the model from the checkpoint
//   Step 3: Decode with the requested policy

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::*,
};
use std::path::PathBuf;

use crate::application::train_use_case::DeviceKind;
use crate::domain::error::PipelineError;
use crate::domain::training_state::GenerationPolicy;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::tokenizer_store::{HfTextTokenizer, TokenizerStore};
use crate::ml::inferencer::Translator;

#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub output_dir: PathBuf,
    pub text:       String,
    pub policy:     GenerationPolicy,
    pub max_length: usize,
    pub device:     DeviceKind,
}

pub struct TranslateUseCase {
    request: TranslateRequest,
}

impl TranslateUseCase {
    pub fn new(request: TranslateRequest) -> Result<Self> {
        if request.policy.width() == 0 {
            return Err(PipelineError::Config("beam_size must be at least 1".into()).into());
        }
        if request.max_length < 2 {
            return Err(PipelineError::Config("max_length must be at least 2".into()).into());
        }
        Ok(Self { request })
    }

    pub fn execute(&self) -> Result<String> {
        match self.request.device {
            DeviceKind::Wgpu => self.translate::<Wgpu>(WgpuDevice::default()),
            DeviceKind::Cpu => self.translate::<NdArray>(NdArrayDevice::Cpu),
        }
    }

    fn translate<B: Backend>(&self, device: B::Device) -> Result<String> {
        let req = &self.request;

        // ── Step 1: Tokenizer ────────────────────────────────────────────────
        let tokenizer = HfTextTokenizer::new(TokenizerStore::new(&req.output_dir).load()?)?;

        // ── Step 2: Model ────────────────────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&req.output_dir)?;
        let translator = Translator::<B>::from_checkpoint(&ckpt_manager, tokenizer, device)?;

        // ── Step 3: Decode ───────────────────────────────────────────────────
        translator.translate(&req.text, req.policy, req.max_length)
    }
}
