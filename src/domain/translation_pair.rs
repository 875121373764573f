// ============================================================
// Layer 3 — Translation Pair Domain Types
// ============================================================
// A RawPair is one line of a parallel corpus: a map from a
// language tag ("en", "de", ...) to the sentence in that
// language. The preprocessor picks the two configured tags
// out of it and turns them into a TokenizedExample.
//
// Example:
//   RawPair           {"en": "Hello", "de": "Hallo"}
//   TokenizedExample  input_ids = ids("translate English to German: Hello")
//                     label_ids = ids("Hallo")

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One untokenized parallel sentence pair, keyed by language tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPair {
    pub translation: BTreeMap<String, String>,
}

impl RawPair {
    /// Build a pair from `(language, text)` entries.
    pub fn new<L, T>(entries: impl IntoIterator<Item = (L, T)>) -> Self
    where
        L: Into<String>,
        T: Into<String>,
    {
        Self {
            translation: entries
                .into_iter()
                .map(|(lang, text)| (lang.into(), text.into()))
                .collect(),
        }
    }

    /// The sentence for `lang`, if the pair carries one.
    pub fn text(&self, lang: &str) -> Option<&str> {
        self.translation.get(lang).map(String::as_str)
    }
}

/// A pair after tokenization and truncation.
/// Neither sequence is ever empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedExample {
    pub input_ids: Vec<u32>,
    pub label_ids: Vec<u32>,
}

impl TokenizedExample {
    pub fn new(input_ids: Vec<u32>, label_ids: Vec<u32>) -> Self {
        Self { input_ids, label_ids }
    }
}
