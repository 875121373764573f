use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::TensorData,
};

use crate::ml::batcher::TranslationBatch;

// #[derive(Config)] already implements Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Seq2SeqTransformerConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    pub pad_id:      usize,
}

impl Seq2SeqTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqTransformer<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let encoder: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let decoder: Vec<DecoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_decoder_block(device))
            .collect();
        let encoder_norm = LayerNormConfig::new(self.d_model).init(device);
        let decoder_norm = LayerNormConfig::new(self.d_model).init(device);
        let lm_head      = LinearConfig::new(self.d_model, self.vocab_size).init(device);
        let dropout      = DropoutConfig::new(self.dropout).init();
        Seq2SeqTransformer {
            token_embedding, position_embedding, encoder, decoder,
            encoder_norm, decoder_norm, lm_head, dropout,
            max_seq_len: self.max_seq_len,
            pad_id:      self.pad_id,
        }
    }

    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device)
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            self_attn:   self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            self_attn:   self.attention(device),
            cross_attn:  self.attention(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            norm3:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

fn feed_forward<B: Backend>(l1: &Linear<B>, l2: &Linear<B>, x: Tensor<B, 3>) -> Tensor<B, 3> {
    l2.forward(burn::tensor::activation::gelu(l1.forward(x)))
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self.self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));
        let ffn = feed_forward(&self.ffn_linear1, &self.ffn_linear2, x.clone());
        self.norm2.forward(x + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub cross_attn:  MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub norm3:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    pub fn forward(
        &self,
        x:           Tensor<B, 3>,
        causal_mask: Tensor<B, 3, Bool>,
        memory:      Tensor<B, 3>,
        memory_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        // The decoder start token is pad, so decoder-side padding is left
        // unmasked; the causal mask keeps real positions from seeing it.
        let attn = self.self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_attn(causal_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));

        let cross = self.cross_attn
            .forward(MhaInput::new(x.clone(), memory.clone(), memory).mask_pad(memory_mask))
            .context;
        let x = self.norm2.forward(x + self.dropout.forward(cross));

        let ffn = feed_forward(&self.ffn_linear1, &self.ffn_linear2, x.clone());
        self.norm3.forward(x + self.dropout.forward(ffn))
    }
}

/// Encoder-decoder transformer with a shared token embedding.
#[derive(Module, Debug)]
pub struct Seq2SeqTransformer<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder:            Vec<EncoderBlock<B>>,
    pub decoder:            Vec<DecoderBlock<B>>,
    pub encoder_norm:       LayerNorm<B>,
    pub decoder_norm:       LayerNorm<B>,
    pub lm_head:            Linear<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
    pub pad_id:             usize,
}

impl<B: Backend> Seq2SeqTransformer<B> {
    fn embed(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let device = ids.device();

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions: Vec<i64> = (0..batch_size)
            .flat_map(|_| 0..seq_len as i64)
            .collect();
        let positions = Tensor::<B, 2, Int>::from_data(
            TensorData::new(positions, [batch_size, seq_len]), &device,
        );

        let tok_emb = self.token_embedding.forward(ids);
        let pos_emb = self.position_embedding.forward(positions);
        self.dropout.forward(tok_emb + pos_emb)
    }

    /// input_ids, pad_mask: [batch, src_len] → memory: [batch, src_len, d_model]
    pub fn encode(&self, input_ids: Tensor<B, 2, Int>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let mut x = self.embed(input_ids);
        for layer in &self.encoder {
            x = layer.forward(x, pad_mask.clone());
        }
        self.encoder_norm.forward(x)
    }

    /// decoder_input_ids: [batch, tgt_len] → logits: [batch, tgt_len, vocab]
    pub fn decode(
        &self,
        decoder_input_ids: Tensor<B, 2, Int>,
        memory:            Tensor<B, 3>,
        memory_mask:       Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, tgt_len] = decoder_input_ids.dims();
        let device = decoder_input_ids.device();
        let causal = generate_autoregressive_mask::<B>(batch_size, tgt_len, &device);

        let mut x = self.embed(decoder_input_ids);
        for layer in &self.decoder {
            x = layer.forward(x, causal.clone(), memory.clone(), memory_mask.clone());
        }
        self.lm_head.forward(self.decoder_norm.forward(x))
    }

    /// Teacher-forced logits for a whole batch.
    pub fn forward(&self, batch: &TranslationBatch<B>) -> Tensor<B, 3> {
        let memory = self.encode(batch.input_ids.clone(), batch.encoder_padding_mask.clone());
        self.decode(batch.decoder_input_ids.clone(), memory, batch.encoder_padding_mask.clone())
    }

    /// Token-level cross-entropy over non-pad label positions.
    pub fn forward_loss(&self, batch: &TranslationBatch<B>) -> (Tensor<B, 1>, Tensor<B, 3>) {
        let logits = self.forward(batch);
        let [batch_size, tgt_len, vocab] = logits.dims();

        let ce = CrossEntropyLossConfig::new()
            .with_pad_tokens(Some(vec![self.pad_id]))
            .init(&logits.device());
        let loss = ce.forward(
            logits.clone().reshape([batch_size * tgt_len, vocab]),
            batch.labels.clone().reshape([batch_size * tgt_len]),
        );
        (loss, logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::collator::Collator;
    use crate::domain::translation_pair::TokenizedExample;
    use crate::ml::batcher::TranslationBatcher;
    use burn::backend::NdArray;

    use crate::testing::tiny_model_config;

    type TB = NdArray;

    #[test]
    fn forward_shapes_follow_batch() {
        let device = Default::default();
        let model: Seq2SeqTransformer<TB> = tiny_model_config().init(&device);
        let batch = Collator::new(0).collate(&[
            TokenizedExample::new(vec![4, 5, 6, 1], vec![7, 1]),
            TokenizedExample::new(vec![8, 1], vec![9, 10, 11, 1]),
        ]);
        let batch = TranslationBatcher::<TB>::new(device).to_tensors(&batch);

        let (loss, logits) = model.forward_loss(&batch);
        assert_eq!(logits.dims(), [2, 4, 12]);

        let loss: f64 = loss.into_scalar().elem::<f64>();
        assert!(loss.is_finite() && loss > 0.0);
    }
}
