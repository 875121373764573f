// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads a JSON-lines parallel corpus. Two line layouts are
// accepted:
//
//   {"translation": {"en": "Hello", "de": "Hallo"}}
//   {"en": "Hello", "de": "Hallo"}
//
// Blank lines are skipped. A malformed line is an error that
// names the file and line number; a corpus is never silently
// truncated.

use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::traits::PairSource;
use crate::domain::translation_pair::RawPair;

#[derive(Deserialize)]
#[serde(untagged)]
enum PairLine {
    Nested { translation: BTreeMap<String, String> },
    Flat(BTreeMap<String, String>),
}

impl From<PairLine> for RawPair {
    fn from(line: PairLine) -> Self {
        match line {
            PairLine::Nested { translation } | PairLine::Flat(translation) => {
                RawPair::new(translation)
            }
        }
    }
}

/// Loads every pair from one `.jsonl` file.
pub struct JsonlPairLoader {
    path: PathBuf,
}

impl JsonlPairLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PairSource for JsonlPairLoader {
    fn load_all(&self) -> Result<Vec<RawPair>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read corpus '{}'", self.path.display()))?;

        let mut pairs = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: PairLine = serde_json::from_str(line).with_context(|| {
                format!("Malformed pair at {}:{}", self.path.display(), line_no + 1)
            })?;
            pairs.push(parsed.into());
        }

        tracing::info!("Loaded {} pairs from '{}'", pairs.len(), self.path.display());
        Ok(pairs)
    }
}
