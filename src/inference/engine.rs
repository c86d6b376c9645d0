//! Encoder: forward pass through the MiniLM transformer.

use std::sync::Arc;

use rayon::prelude::*;

use crate::errors::{MiniLmError, Result};
use crate::kernels::{add_assign, dot, gelu_inplace, layer_norm, linear, softmax};
use crate::model::{MiniLmLayer, MiniLmModel};
use crate::tokenizer::TokenSequence;

/// Per-token encoder output, `[seq_len, hidden_size]` row-major.
#[derive(Debug, Clone)]
pub struct HiddenStates {
    pub data: Vec<f32>,
    pub seq_len: usize,
    pub hidden_size: usize,
}

impl HiddenStates {
    pub fn row(&self, t: usize) -> &[f32] {
        &self.data[t * self.hidden_size..(t + 1) * self.hidden_size]
    }
}

/// Runs the forward pass over shared, read-only weights.
#[derive(Clone)]
pub struct Encoder {
    model: Arc<MiniLmModel>,
}

impl Encoder {
    pub fn new(model: Arc<MiniLmModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &MiniLmModel {
        &self.model
    }

    /// Encode a token sequence; padding positions are excluded as attention keys.
    pub fn forward(&self, tokens: &TokenSequence) -> Result<HiddenStates> {
        let ids = tokens.ids();
        if ids.is_empty() {
            return Err(MiniLmError::Validation("token sequence is empty".into()));
        }
        if ids.len() > self.model.max_positions() {
            return Err(MiniLmError::Validation(format!(
                "{} tokens exceed the {} position embeddings",
                ids.len(),
                self.model.max_positions()
            )));
        }
        let mask = tokens.attention_mask();

        let mut hidden = self.embed_tokens(ids)?;
        for layer in &self.model.layers {
            hidden = self.forward_layer(&hidden, &mask, layer);
        }

        if let Some(pos) = hidden.iter().position(|v| !v.is_finite()) {
            return Err(MiniLmError::Inference(format!(
                "non-finite hidden state at token {} feature {}",
                pos / self.model.hidden_size(),
                pos % self.model.hidden_size()
            )));
        }
        Ok(HiddenStates {
            data: hidden,
            seq_len: ids.len(),
            hidden_size: self.model.hidden_size(),
        })
    }

    /// word + position + token_type[0], then the embedding LayerNorm.
    pub fn embed_tokens(&self, ids: &[u32]) -> Result<Vec<f32>> {
        let hidden = self.model.hidden_size();
        let vocab_size = self.model.vocab_size();
        let token_type = &self.model.token_type_embeddings[..hidden];

        let mut out = vec![0.0f32; ids.len() * hidden];
        for (t, (&id, row)) in ids.iter().zip(out.chunks_mut(hidden)).enumerate() {
            let id = id as usize;
            if id >= vocab_size {
                return Err(MiniLmError::Validation(format!(
                    "token id {} outside vocabulary of {}",
                    id, vocab_size
                )));
            }
            let word = &self.model.word_embeddings[id * hidden..(id + 1) * hidden];
            let position = &self.model.position_embeddings[t * hidden..(t + 1) * hidden];
            for i in 0..hidden {
                row[i] = word[i] + position[i] + token_type[i];
            }
        }
        layer_norm(
            &mut out,
            &self.model.embedding_norm,
            self.model.config.layer_norm_eps,
        );
        Ok(out)
    }

    /// One encoder layer, post-norm: attention, residual, LayerNorm, FFN, residual, LayerNorm.
    pub fn forward_layer(&self, hidden: &[f32], mask: &[bool], layer: &MiniLmLayer) -> Vec<f32> {
        let eps = self.model.config.layer_norm_eps;

        let mut attended = self.attention(hidden, mask, layer);
        add_assign(&mut attended, hidden);
        layer_norm(&mut attended, &layer.attention_norm, eps);

        let mut out = self.feed_forward(&attended, layer);
        add_assign(&mut out, &attended);
        layer_norm(&mut out, &layer.output_norm, eps);
        out
    }

    /// Multi-head scaled dot-product self-attention, including the output projection.
    pub fn attention(&self, hidden: &[f32], mask: &[bool], layer: &MiniLmLayer) -> Vec<f32> {
        let width = self.model.hidden_size();
        let seq_len = hidden.len() / width;
        let num_heads = self.model.config.num_attention_heads;
        let head_dim = self.model.config.head_dim();
        let scale = (head_dim as f32).sqrt().recip();

        let q = linear(hidden, seq_len, &layer.query);
        let k = linear(hidden, seq_len, &layer.key);
        let v = linear(hidden, seq_len, &layer.value);

        let mut context = vec![0.0f32; seq_len * width];
        context
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(t, ctx_row)| {
                let mut scores = vec![0.0f32; seq_len];
                for h in 0..num_heads {
                    let off = h * head_dim;
                    let q_head = &q[t * width + off..t * width + off + head_dim];
                    for s in 0..seq_len {
                        scores[s] = if mask[s] {
                            let k_head = &k[s * width + off..s * width + off + head_dim];
                            dot(q_head, k_head) * scale
                        } else {
                            f32::NEG_INFINITY
                        };
                    }
                    softmax(&mut scores);
                    let out = &mut ctx_row[off..off + head_dim];
                    for s in 0..seq_len {
                        let weight = scores[s];
                        if weight == 0.0 {
                            continue;
                        }
                        let v_head = &v[s * width + off..s * width + off + head_dim];
                        for d in 0..head_dim {
                            out[d] += weight * v_head[d];
                        }
                    }
                }
            });

        linear(&context, seq_len, &layer.attention_output)
    }

    /// Position-wise feedforward: linear, GELU, linear.
    pub fn feed_forward(&self, hidden: &[f32], layer: &MiniLmLayer) -> Vec<f32> {
        let seq_len = hidden.len() / self.model.hidden_size();
        let mut inner = linear(hidden, seq_len, &layer.intermediate);
        gelu_inplace(&mut inner);
        linear(&inner, seq_len, &layer.output)
    }
}
