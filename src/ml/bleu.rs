// ============================================================
// Layer 5 — Corpus BLEU
// ============================================================
// sacreBLEU defaults: `13a` tokenisation, 4-gram precision,
// `exp` smoothing, brevity penalty, 0-100 scale.
//
// Corpus BLEU sums n-gram statistics over every sentence before
// taking precisions, so it is not the mean of per-batch scores.
// CorpusBleu only collects text in `add_batch` and scores the
// whole corpus once in `compute`.

use std::collections::HashMap;

const MAX_ORDER: usize = 4;
/// Stand-in for log(0) so a zero precision drives the score to zero.
const LOG_ZERO: f64 = -9_999_999_999.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BleuScore {
    pub score: f64,
    pub precisions: [f64; MAX_ORDER],
    pub brevity_penalty: f64,
    pub sys_len: usize,
    pub ref_len: usize,
}

/// Streaming collector of predictions and references.
#[derive(Debug, Default)]
pub struct CorpusBleu {
    predictions: Vec<String>,
    references: Vec<Vec<String>>,
}

impl CorpusBleu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch. Each prediction has one or more references.
    pub fn add_batch(&mut self, predictions: &[String], references: &[Vec<String>]) {
        self.predictions.extend_from_slice(predictions);
        self.references.extend_from_slice(references);
    }

    /// Score everything collected so far as one corpus.
    pub fn compute(&self) -> BleuScore {
        let mut stats = Statistics::default();
        for (prediction, references) in self.predictions.iter().zip(&self.references) {
            stats.add_sentence(prediction, references);
        }
        stats.score()
    }
}

#[derive(Debug, Default)]
struct Statistics {
    correct: [usize; MAX_ORDER],
    total: [usize; MAX_ORDER],
    sys_len: usize,
    ref_len: usize,
}

impl Statistics {
    fn add_sentence(&mut self, prediction: &str, references: &[String]) {
        let hyp = tokenize_13a(prediction);
        let hyp: Vec<&str> = hyp.split_whitespace().collect();

        let refs: Vec<String> = references.iter().map(|r| tokenize_13a(r)).collect();
        let refs: Vec<Vec<&str>> = refs.iter().map(|r| r.split_whitespace().collect()).collect();

        self.sys_len += hyp.len();
        self.ref_len += closest_ref_len(hyp.len(), &refs);

        for n in 1..=MAX_ORDER {
            let hyp_counts = ngram_counts(&hyp, n);

            // Clip by the maximum count of each n-gram in any reference.
            let mut max_ref: HashMap<&[&str], usize> = HashMap::new();
            for r in &refs {
                for (gram, count) in ngram_counts(r, n) {
                    let slot = max_ref.entry(gram).or_insert(0);
                    *slot = (*slot).max(count);
                }
            }

            for (gram, count) in &hyp_counts {
                self.correct[n - 1] += (*count).min(max_ref.get(gram).copied().unwrap_or(0));
            }
            self.total[n - 1] += hyp.len().saturating_sub(n - 1);
        }
    }

    fn score(&self) -> BleuScore {
        let mut precisions = [0.0; MAX_ORDER];
        let brevity_penalty = self.brevity_penalty();

        // No matching n-gram of any order: smoothing must not lift it above 0.
        if self.correct.iter().all(|&c| c == 0) {
            return BleuScore {
                score: 0.0,
                precisions,
                brevity_penalty,
                sys_len: self.sys_len,
                ref_len: self.ref_len,
            };
        }

        let mut smooth = 1.0;
        for n in 0..MAX_ORDER {
            if self.total[n] == 0 {
                break;
            }
            precisions[n] = if self.correct[n] == 0 {
                smooth *= 2.0;
                100.0 / (smooth * self.total[n] as f64)
            } else {
                100.0 * self.correct[n] as f64 / self.total[n] as f64
            };
        }

        let log_sum: f64 = precisions
            .iter()
            .map(|&p| if p == 0.0 { LOG_ZERO } else { p.ln() })
            .sum();
        let score = brevity_penalty * (log_sum / MAX_ORDER as f64).exp();

        BleuScore {
            score,
            precisions,
            brevity_penalty,
            sys_len: self.sys_len,
            ref_len: self.ref_len,
        }
    }

    fn brevity_penalty(&self) -> f64 {
        if self.sys_len == 0 {
            0.0
        } else if self.sys_len < self.ref_len {
            (1.0 - self.ref_len as f64 / self.sys_len as f64).exp()
        } else {
            1.0
        }
    }
}

/// Reference length closest to the hypothesis length; ties go to the shorter.
fn closest_ref_len(hyp_len: usize, refs: &[Vec<&str>]) -> usize {
    refs.iter()
        .map(Vec::len)
        .min_by_key(|&len| (len.abs_diff(hyp_len), len))
        .unwrap_or(0)
}

fn ngram_counts<'a, 'b>(tokens: &'b [&'a str], n: usize) -> HashMap<&'b [&'a str], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// ASCII punctuation that `13a` always splits off.
fn is_split_punct(c: char) -> bool {
    matches!(c,
        '{'..='~' | '['..='`' | ' '..='&' | '('..='+' | ':'..='@' | '/')
}

/// The mteval-v13a tokenizer used by sacreBLEU by default.
pub fn tokenize_13a(line: &str) -> String {
    let mut line = line
        .replace("<skipped>", "")
        .replace("-\n", "")
        .replace('\n', " ");
    if line.contains('&') {
        line = line
            .replace("&quot;", "\"")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
    }

    let chars: Vec<char> = format!(" {line} ").chars().collect();
    let mut out = String::with_capacity(chars.len() * 2);

    for (i, &c) in chars.iter().enumerate() {
        let prev = i.checked_sub(1).map(|j| chars[j]);
        let next = chars.get(i + 1).copied();
        let non_digit = |c: Option<char>| c.is_some_and(|c| !c.is_ascii_digit());

        let split = if is_split_punct(c) {
            true
        } else if c == '.' || c == ',' {
            // Kept inside numbers such as 3.14 or 1,000.
            non_digit(prev) || non_digit(next)
        } else if c == '-' {
            prev.is_some_and(|p| p.is_ascii_digit())
        } else {
            false
        };

        if split {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
