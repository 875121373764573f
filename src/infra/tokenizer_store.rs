// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads `tokenizer.json` from the output directory, or builds a
// word-level vocabulary from the training texts and saves it in
// the HuggingFace JSON format.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. We write the tokenizer JSON ourselves
// and load it back, bypassing the trainer type mismatch.
//
// Reserved ids:
//   0  <pad>   padding and decoder start token
//   1  </s>    end of sequence
//   2  <unk>   out-of-vocabulary word

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::Tokenizer;

use crate::domain::error::PipelineError;
use crate::domain::traits::TextTokenizer;

pub const PAD_TOKEN: &str = "<pad>";
pub const EOS_TOKEN: &str = "</s>";
pub const UNK_TOKEN: &str = "<unk>";
pub const SPECIAL_TOKENS: [&str; 3] = [PAD_TOKEN, EOS_TOKEN, UNK_TOKEN];

const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load existing tokenizer or build a new one from texts
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e)
        })
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Count words the way the pre-tokenizer will split them ────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in split_words(&text.to_lowercase()) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties alphabetical so rebuilds are stable.
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

        // ── Step 2: Build vocab JSON ─────────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (word, _) in &words {
            if !vocab.contains_key(word) {
                let id = vocab.len();
                vocab.insert(word.clone(), serde_json::json!(id));
            }
        }
        let vocab_len = vocab.len();

        let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, content)| serde_json::json!({
                "id": id, "content": content, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        // ── Step 3: Write tokenizer JSON in HuggingFace format ───────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON to '{}'", path.display()))?;

        tracing::info!("Tokenizer built with {} tokens, saved to '{}'", vocab_len, path.display());

        Tokenizer::from_file(&path).map_err(|e| anyhow::anyhow!("Cannot reload tokenizer: {e}"))
    }
}

/// Same split as the `Whitespace` pre-tokenizer: runs of word
/// characters, or runs of other non-space characters.
fn split_words(text: &str) -> Vec<String> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut words = Vec::new();
    let mut current = String::new();
    let mut current_is_word = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() && is_word(c) != current_is_word {
            words.push(std::mem::take(&mut current));
        }
        current_is_word = is_word(c);
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

// ─── HfTextTokenizer ──────────────────────────────────────────────────────────
/// `TextTokenizer` backed by a HuggingFace `Tokenizer`.
pub struct HfTextTokenizer {
    inner:  Tokenizer,
    pad_id: u32,
    eos_id: u32,
}

impl HfTextTokenizer {
    pub fn new(inner: Tokenizer) -> Result<Self> {
        let id_of = |token: &str| {
            inner.token_to_id(token).ok_or_else(|| {
                PipelineError::Tokenizer(format!("vocabulary has no '{token}' token"))
            })
        };
        let pad_id = id_of(PAD_TOKEN)?;
        let eos_id = id_of(EOS_TOKEN)?;
        Ok(Self { inner, pad_id, eos_id })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }

    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl TextTokenizer for HfTextTokenizer {
    fn encode_source(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = self.encode(text, true)?;
        if ids.last() != Some(&self.eos_id) {
            ids.push(self.eos_id);
        }
        Ok(ids)
    }

    fn encode_target(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = self.encode(text, false)?;
        ids.push(self.eos_id);
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| PipelineError::Tokenizer(e.to_string()).into())
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }

    fn eos_id(&self) -> u32 {
        self.eos_id
    }
}
