// ============================================================
// Layer 4 — Sequence Preprocessor
// ============================================================
// Turns one RawPair into one TokenizedExample:
//
//   1. Pick the source and target sentences by language tag
//   2. Normalise stray whitespace and control characters
//   3. Prepend the task prefix to the source sentence,
//      e.g. "translate English to German: Hello"
//   4. Tokenize the source through the encoder-input path and
//      the target through the label path (separately)
//   5. Truncate each side to max_seq_length on its own,
//      keeping a trailing end-of-sequence token
//
// The prefix is derived from the configured language tags, so
// an en→ro run is told "translate English to Romanian: ".
//
// Tokenizing a whole corpus is embarrassingly parallel: each
// pair is independent, so `process_all` fans the work out over
// a rayon pool. Output order matches input order.

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::domain::error::PipelineError;
use crate::domain::traits::TextTokenizer;
use crate::domain::translation_pair::{RawPair, TokenizedExample};

/// Human-readable language name for a tag, used in the task prefix.
/// Unknown tags are used verbatim.
pub fn language_name(tag: &str) -> &str {
    match tag {
        "en" => "English",
        "de" => "German",
        "fr" => "French",
        "ro" => "Romanian",
        "ru" => "Russian",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "nl" => "Dutch",
        "cs" => "Czech",
        "fi" => "Finnish",
        "et" => "Estonian",
        "lv" => "Latvian",
        "lt" => "Lithuanian",
        "tr" => "Turkish",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "kk" => "Kazakh",
        "gu" => "Gujarati",
        "hi" => "Hindi",
        other => other,
    }
}

/// The instruction prepended to every source sentence.
pub fn task_prefix(source_lang: &str, target_lang: &str) -> String {
    format!(
        "translate {} to {}: ",
        language_name(source_lang),
        language_name(target_lang)
    )
}

/// Replace tabs, non-breaking and zero-width spaces and control
/// characters with plain spaces, collapse runs, trim the ends.
pub fn clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;

    for c in text.chars() {
        let c = match c {
            '\t' | '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        };
        if c == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }

    out.trim_end().to_string()
}

/// Cut `ids` down to `max_len`, keeping a final `eos` if the
/// untruncated sequence ended with one.
pub fn truncate_keeping_eos(ids: &mut Vec<u32>, max_len: usize, eos: u32) {
    if ids.len() <= max_len {
        return;
    }
    let ended_with_eos = ids.last() == Some(&eos);
    ids.truncate(max_len);
    if ended_with_eos {
        if let Some(last) = ids.last_mut() {
            *last = eos;
        }
    }
}

pub struct SequencePreprocessor<'a, T: TextTokenizer> {
    tokenizer:      &'a T,
    source_lang:    String,
    target_lang:    String,
    max_seq_length: usize,
    prefix:         String,
}

impl<'a, T: TextTokenizer> SequencePreprocessor<'a, T> {
    pub fn new(
        tokenizer:      &'a T,
        source_lang:    impl Into<String>,
        target_lang:    impl Into<String>,
        max_seq_length: usize,
    ) -> Self {
        let source_lang = source_lang.into();
        let target_lang = target_lang.into();
        let prefix = task_prefix(&source_lang, &target_lang);
        Self { tokenizer, source_lang, target_lang, max_seq_length, prefix }
    }

    /// The encoder input text for a source sentence.
    pub fn source_text(&self, sentence: &str) -> String {
        format!("{}{}", self.prefix, clean(sentence))
    }

    /// Tokenize one pair. `index` is only used in error messages.
    pub fn process(&self, index: usize, pair: &RawPair) -> Result<TokenizedExample> {
        let source = pair.text(&self.source_lang).ok_or_else(|| {
            PipelineError::Preprocessing { index, lang: self.source_lang.clone() }
        })?;
        let target = pair.text(&self.target_lang).ok_or_else(|| {
            PipelineError::Preprocessing { index, lang: self.target_lang.clone() }
        })?;

        let eos = self.tokenizer.eos_id();

        let mut input_ids = self.tokenizer.encode_source(&self.source_text(source))?;
        truncate_keeping_eos(&mut input_ids, self.max_seq_length, eos);

        // Labels come from the target path only, never the input path.
        let mut label_ids = self.tokenizer.encode_target(&clean(target))?;
        truncate_keeping_eos(&mut label_ids, self.max_seq_length, eos);

        if input_ids.is_empty() {
            return Err(PipelineError::EmptySequence { index, field: "input" }.into());
        }
        if label_ids.is_empty() {
            return Err(PipelineError::EmptySequence { index, field: "label" }.into());
        }

        Ok(TokenizedExample::new(input_ids, label_ids))
    }

    /// Tokenize a whole split on `num_workers` threads.
    /// Fails on the first malformed pair.
    pub fn process_all(&self, pairs: &[RawPair], num_workers: usize) -> Result<Vec<TokenizedExample>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .build()
            .context("Cannot build preprocessing thread pool")?;

        let examples = pool.install(|| {
            pairs
                .par_iter()
                .enumerate()
                .map(|(index, pair)| self.process(index, pair))
                .collect::<Result<Vec<_>>>()
        })?;

        tracing::info!(
            "Tokenized {} pairs ({} → {}) on {} workers",
            examples.len(),
            self.source_lang,
            self.target_lang,
            num_workers.max(1)
        );
        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WhitespaceTokenizer;

    fn tokenizer() -> WhitespaceTokenizer {
        WhitespaceTokenizer::from_corpus(&[
            "translate English to German: Hello",
            "Hallo a b c d e f g h i j k l",
        ])
    }

    #[test]
    fn prefix_follows_language_tags() {
        assert_eq!(task_prefix("en", "de"), "translate English to German: ");
        assert_eq!(task_prefix("en", "ro"), "translate English to Romanian: ");
        assert_eq!(task_prefix("xx", "yy"), "translate xx to yy: ");
    }

    #[test]
    fn hello_example_is_prefixed_and_bounded() {
        let tok = tokenizer();
        let pre = SequencePreprocessor::new(&tok, "en", "de", 10);
        let pair = RawPair::new([("en", "Hello"), ("de", "Hallo")]);

        let example = pre.process(0, &pair).unwrap();

        let expected_input = tok.encode_source("translate English to German: Hello").unwrap();
        let expected_label = tok.encode_target("Hallo").unwrap();
        assert_eq!(example.input_ids, expected_input);
        assert_eq!(example.label_ids, expected_label);
        assert!(!example.input_ids.is_empty() && example.input_ids.len() <= 10);
        assert!(!example.label_ids.is_empty() && example.label_ids.len() <= 10);
    }

    #[test]
    fn source_and_target_truncate_independently() {
        let tok = tokenizer();
        let pre = SequencePreprocessor::new(&tok, "en", "de", 4);
        let pair = RawPair::new([("en", "Hello"), ("de", "a b c d e f g h")]);

        let example = pre.process(0, &pair).unwrap();
        assert_eq!(example.input_ids.len(), 4);
        assert_eq!(example.label_ids.len(), 4);
        assert_eq!(example.label_ids.last(), Some(&tok.eos_id()));
    }

    #[test]
    fn short_target_is_not_padded_to_source_length() {
        let tok = tokenizer();
        let pre = SequencePreprocessor::new(&tok, "en", "de", 32);
        let pair = RawPair::new([("en", "Hello"), ("de", "Hallo")]);

        let example = pre.process(0, &pair).unwrap();
        assert_eq!(example.label_ids.len(), 2);
        assert!(example.input_ids.len() > example.label_ids.len());
    }

    #[test]
    fn missing_language_is_a_preprocessing_error() {
        let tok = tokenizer();
        let pre = SequencePreprocessor::new(&tok, "en", "de", 10);
        let pair = RawPair::new([("en", "Hello"), ("fr", "Bonjour")]);

        let err = pre.process(3, &pair).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::Preprocessing { index: 3, lang: "de".into() })
        );
    }

    #[test]
    fn process_all_keeps_input_order() {
        let tok = tokenizer();
        let pre = SequencePreprocessor::new(&tok, "en", "de", 10);
        let pairs: Vec<RawPair> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|w| RawPair::new([("en", "Hello"), ("de", *w)]))
            .collect();

        let examples = pre.process_all(&pairs, 3).unwrap();
        for (pair, example) in pairs.iter().zip(&examples) {
            let label = tok.encode_target(pair.text("de").unwrap()).unwrap();
            assert_eq!(example.label_ids, label);
        }
    }

    #[test]
    fn process_all_fails_on_any_bad_pair() {
        let tok = tokenizer();
        let pre = SequencePreprocessor::new(&tok, "en", "de", 10);
        let pairs = vec![
            RawPair::new([("en", "Hello"), ("de", "Hallo")]),
            RawPair::new([("en", "Hello")]),
        ];
        assert!(pre.process_all(&pairs, 2).is_err());
    }

    #[test]
    fn clean_collapses_odd_whitespace() {
        assert_eq!(clean("  Hallo\u{00A0}\u{00A0}Welt\t!\u{0001} "), "Hallo Welt !");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn truncation_keeps_eos() {
        let mut ids = vec![5, 6, 7, 8, 1];
        truncate_keeping_eos(&mut ids, 3, 1);
        assert_eq!(ids, vec![5, 6, 1]);

        let mut no_eos = vec![5, 6, 7, 8];
        truncate_keeping_eos(&mut no_eos, 3, 1);
        assert_eq!(no_eos, vec![5, 6, 7]);
    }
}
