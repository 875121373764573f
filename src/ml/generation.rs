// ============================================================
// Layer 5 — Generation
// ============================================================
// Autoregressive decoding from a trained Seq2SeqTransformer.
//
//   greedy       — one hypothesis per example, argmax each step,
//                  whole batch decoded together
//   beam_search  — k hypotheses per example, summed log-probs,
//                  final pick normalised by length
//
// Both stop at </s> or after `max_new_tokens`. The decoder start
// token is pad and is not part of the returned ids; a finished
// hypothesis keeps its </s>.
//
// There is no key/value cache: each step re-runs the decoder over
// the whole prefix. The encoder runs once per call.

use burn::{prelude::*, tensor::TensorData};

use crate::domain::training_state::GenerationPolicy;
use crate::ml::batcher::TranslationBatch;
use crate::ml::model::Seq2SeqTransformer;

/// Generate for every row of `batch`. `max_length` bounds the decoder
/// sequence including its start token.
pub fn generate<B: Backend>(
    model:      &Seq2SeqTransformer<B>,
    batch:      &TranslationBatch<B>,
    policy:     GenerationPolicy,
    eos_id:     u32,
    max_length: usize,
) -> Vec<Vec<u32>> {
    let max_new = max_length.saturating_sub(1).min(model.max_seq_len);
    let input_ids = batch.input_ids.clone();
    let pad_mask = batch.encoder_padding_mask.clone();

    match policy {
        GenerationPolicy::Greedy => greedy(model, input_ids, pad_mask, eos_id, max_new),
        GenerationPolicy::BeamSearch { beam_size } => {
            beam_search(model, input_ids, pad_mask, eos_id, beam_size.max(1), max_new)
        }
    }
}

/// Decoder input rows: the start token followed by each prefix.
fn decoder_inputs<B: Backend>(
    prefixes: &[&[u32]],
    start_id: u32,
    device:   &B::Device,
) -> Tensor<B, 2, Int> {
    let rows = prefixes.len();
    let cols = prefixes.first().map_or(0, |p| p.len()) + 1;
    let flat: Vec<i64> = prefixes
        .iter()
        .flat_map(|p| std::iter::once(start_id).chain(p.iter().copied()).map(|id| id as i64))
        .collect();
    Tensor::<B, 2, Int>::from_data(TensorData::new(flat, [rows, cols]), device)
}

/// Logits at the last decoder position: [rows, vocab].
fn last_logits<B: Backend>(
    model:       &Seq2SeqTransformer<B>,
    decoder_ids: Tensor<B, 2, Int>,
    memory:      Tensor<B, 3>,
    memory_mask: Tensor<B, 2, Bool>,
) -> Tensor<B, 2> {
    let logits = model.decode(decoder_ids, memory, memory_mask);
    let [rows, len, vocab] = logits.dims();
    logits.slice([0..rows, len - 1..len, 0..vocab]).reshape([rows, vocab])
}

pub fn greedy<B: Backend>(
    model:          &Seq2SeqTransformer<B>,
    input_ids:      Tensor<B, 2, Int>,
    pad_mask:       Tensor<B, 2, Bool>,
    eos_id:         u32,
    max_new_tokens: usize,
) -> Vec<Vec<u32>> {
    let [batch_size, _] = input_ids.dims();
    let device = input_ids.device();
    let pad_id = model.pad_id as u32;
    let memory = model.encode(input_ids, pad_mask.clone());

    let mut generated: Vec<Vec<u32>> = vec![Vec::new(); batch_size];
    let mut finished = vec![false; batch_size];
    let mut produced = vec![0usize; batch_size];

    for _ in 0..max_new_tokens {
        let prefixes: Vec<&[u32]> = generated.iter().map(Vec::as_slice).collect();
        let decoder_ids = decoder_inputs::<B>(&prefixes, pad_id, &device);
        let next: Vec<i64> = last_logits(model, decoder_ids, memory.clone(), pad_mask.clone())
            .argmax(1)
            .reshape([batch_size])
            .into_data()
            .iter::<i64>()
            .collect();

        for (i, &token) in next.iter().enumerate() {
            if finished[i] {
                // Finished rows keep the matrix rectangular with pad.
                generated[i].push(pad_id);
                continue;
            }
            let token = token as u32;
            generated[i].push(token);
            produced[i] += 1;
            finished[i] = token == eos_id;
        }
        if finished.iter().all(|&f| f) {
            break;
        }
    }

    for (row, &len) in generated.iter_mut().zip(&produced) {
        row.truncate(len);
    }
    generated
}

#[derive(Debug, Clone)]
struct Hypothesis {
    tokens:   Vec<u32>,
    log_prob: f64,
}

impl Hypothesis {
    fn normalized_score(&self) -> f64 {
        self.log_prob / self.tokens.len().max(1) as f64
    }
}

/// The `k` best (index, value) pairs, best first.
fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    let by_value = |a: &(usize, f32), b: &(usize, f32)| b.1.total_cmp(&a.1);
    if k < indexed.len() {
        indexed.select_nth_unstable_by(k, by_value);
        indexed.truncate(k);
    }
    indexed.sort_unstable_by(by_value);
    indexed
}

pub fn beam_search<B: Backend>(
    model:          &Seq2SeqTransformer<B>,
    input_ids:      Tensor<B, 2, Int>,
    pad_mask:       Tensor<B, 2, Bool>,
    eos_id:         u32,
    beam_size:      usize,
    max_new_tokens: usize,
) -> Vec<Vec<u32>> {
    let [batch_size, src_len] = input_ids.dims();

    (0..batch_size)
        .map(|i| {
            let row = input_ids.clone().slice([i..i + 1, 0..src_len]);
            let mask = pad_mask.clone().slice([i..i + 1, 0..src_len]);
            beam_search_one(model, row, mask, eos_id, beam_size, max_new_tokens)
        })
        .collect()
}

fn beam_search_one<B: Backend>(
    model:          &Seq2SeqTransformer<B>,
    input_ids:      Tensor<B, 2, Int>,
    pad_mask:       Tensor<B, 2, Bool>,
    eos_id:         u32,
    beam_size:      usize,
    max_new_tokens: usize,
) -> Vec<u32> {
    let device = input_ids.device();
    let pad_id = model.pad_id as u32;
    let memory = model.encode(input_ids, pad_mask.clone());

    let mut active = vec![Hypothesis { tokens: Vec::new(), log_prob: 0.0 }];
    let mut finished: Vec<Hypothesis> = Vec::new();

    for _ in 0..max_new_tokens {
        if active.is_empty() || finished.len() >= beam_size {
            break;
        }
        let rows = active.len();
        let prefixes: Vec<&[u32]> = active.iter().map(|h| h.tokens.as_slice()).collect();
        let decoder_ids = decoder_inputs::<B>(&prefixes, pad_id, &device);
        let memory_rows = Tensor::cat(vec![memory.clone(); rows], 0);
        let mask_rows = Tensor::cat(vec![pad_mask.clone(); rows], 0);

        let log_probs = burn::tensor::activation::log_softmax(
            last_logits(model, decoder_ids, memory_rows, mask_rows), 1,
        );
        let [_, vocab] = log_probs.dims();
        let log_probs: Vec<f32> = log_probs.into_data().iter::<f32>().collect();

        let mut candidates: Vec<(usize, u32, f64)> = Vec::with_capacity(rows * beam_size);
        for (b, hyp) in active.iter().enumerate() {
            let row = &log_probs[b * vocab..(b + 1) * vocab];
            for (token, lp) in top_k(row, beam_size) {
                candidates.push((b, token as u32, hyp.log_prob + lp as f64));
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut next = Vec::with_capacity(beam_size);
        for (b, token, log_prob) in candidates {
            let mut tokens = active[b].tokens.clone();
            tokens.push(token);
            let hyp = Hypothesis { tokens, log_prob };
            if token == eos_id {
                finished.push(hyp);
            } else {
                next.push(hyp);
            }
            if next.len() == beam_size {
                break;
            }
        }
        active = next;
    }

    if finished.len() < beam_size {
        finished.extend(active);
    }
    finished
        .into_iter()
        .max_by(|a, b| a.normalized_score().total_cmp(&b.normalized_score()))
        .map(|h| h.tokens)
        .unwrap_or_default()
}
