// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the trained model from an output directory and
// translates single sentences with it.
//
// The source sentence goes through the same path as training
// data: cleaning, task prefix, encoder-input tokenization and
// truncation. Only then is it decoded with beam search.

use anyhow::Result;
use burn::prelude::*;

use crate::data::collator::Collator;
use crate::data::preprocessor::{clean, task_prefix, truncate_keeping_eos};
use crate::domain::training_state::GenerationPolicy;
use crate::domain::traits::TextTokenizer;
use crate::domain::translation_pair::TokenizedExample;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::tokenizer_store::HfTextTokenizer;
use crate::ml::batcher::TranslationBatcher;
use crate::ml::generation;
use crate::ml::model::Seq2SeqTransformer;

pub struct Translator<B: Backend> {
    model:          Seq2SeqTransformer<B>,
    tokenizer:      HfTextTokenizer,
    batcher:        TranslationBatcher<B>,
    prefix:         String,
    max_seq_length: usize,
}

impl<B: Backend> Translator<B> {
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        tokenizer:    HfTextTokenizer,
        device:       B::Device,
    ) -> Result<Self> {
        let cfg = ckpt_manager.load_config()?;
        // Dropout is inactive on a non-autodiff backend.
        let model: Seq2SeqTransformer<B> = cfg
            .model_config(tokenizer.vocab_size(), tokenizer.pad_id())
            .init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint ({} → {})", cfg.source_lang, cfg.target_lang);

        Ok(Self {
            model,
            tokenizer,
            batcher: TranslationBatcher::new(device),
            prefix: task_prefix(&cfg.source_lang, &cfg.target_lang),
            max_seq_length: cfg.max_seq_length,
        })
    }

    pub fn translate(&self, text: &str, policy: GenerationPolicy, max_length: usize) -> Result<String> {
        let eos = self.tokenizer.eos_id();
        let mut input_ids = self
            .tokenizer
            .encode_source(&format!("{}{}", self.prefix, clean(text)))?;
        truncate_keeping_eos(&mut input_ids, self.max_seq_length, eos);

        // Labels are unused by generation; one token keeps the batch well-formed.
        let batch = Collator::new(self.tokenizer.pad_id())
            .collate(&[TokenizedExample::new(input_ids, vec![eos])]);
        let tensors = self.batcher.to_tensors(&batch);

        let generated = generation::generate(&self.model, &tensors, policy, eos, max_length);
        let ids = generated.into_iter().next().unwrap_or_default();
        tracing::debug!("Generated ids: {:?}", ids);

        Ok(self.tokenizer.decode(&ids)?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::infra::tokenizer_store::TokenizerStore;
    use burn::backend::NdArray;

    type TB = NdArray;

    #[test]
    fn translates_from_a_saved_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let texts = vec!["translate English to German: hello".to_string(), "hallo".to_string()];
        let store = TokenizerStore::new(tmp.path());
        let tokenizer = HfTextTokenizer::new(store.load_or_build(&texts, 50).unwrap()).unwrap();

        let cfg = TrainConfig {
            output_dir: tmp.path().to_path_buf(),
            d_model: 8,
            num_heads: 2,
            num_layers: 1,
            d_ff: 16,
            max_seq_length: 12,
            ..TrainConfig::default()
        };
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        let model: Seq2SeqTransformer<TB> = cfg
            .model_config(tokenizer.vocab_size(), tokenizer.pad_id())
            .init(&device);
        ckpt.save_model(&model, 1).unwrap();
        ckpt.save_config(&cfg).unwrap();

        let tokenizer = HfTextTokenizer::new(store.load().unwrap()).unwrap();
        let translator = Translator::<TB>::from_checkpoint(&ckpt, tokenizer, device).unwrap();
        let out = translator
            .translate("Hello", GenerationPolicy::BeamSearch { beam_size: 2 }, 6)
            .unwrap();
        assert!(out.split_whitespace().count() <= 5);
    }
}
