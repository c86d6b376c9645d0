//! MiniLM architecture and session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Width of every embedding produced by the engine.
pub const EMBEDDING_DIM: usize = 384;

/// Default token budget per input, including `[CLS]` and `[SEP]`.
pub const MAX_TOKENS: usize = 256;

/// Number of encoder layers in the supported architecture.
pub const NUM_LAYERS: usize = 6;

/// How per-token hidden states are reduced to one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pooling {
    /// Average over positions whose attention mask is set.
    Mean,
    /// Hidden state of the `[CLS]` position.
    Cls,
}

/// Pooling used by every session; the golden fixtures were produced with masked mean pooling.
pub const POOLING: Pooling = Pooling::Mean;

/// Configuration for the MiniLM (BERT-style) encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniLmConfig {
    /// Rows in the word embedding table.
    pub vocab_size: usize,
    /// Hidden size (embedding and output dimension).
    pub hidden_size: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Number of encoder layers.
    pub num_hidden_layers: usize,
    /// Feedforward inner size.
    pub intermediate_size: usize,
    /// Rows in the position embedding table.
    pub max_position_embeddings: usize,
    /// Rows in the token type (segment) embedding table.
    pub type_vocab_size: usize,
    /// Epsilon added to the variance in every LayerNorm.
    pub layer_norm_eps: f32,
}

impl Default for MiniLmConfig {
    fn default() -> Self {
        Self {
            vocab_size: 30_522,
            hidden_size: EMBEDDING_DIM,
            num_attention_heads: 12,
            num_hidden_layers: NUM_LAYERS,
            intermediate_size: 1536,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }
}

impl MiniLmConfig {
    /// Per-head width.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

/// Runtime knobs for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum tokenized length, including `[CLS]`/`[SEP]`.
    pub max_tokens: usize,
    /// Worker threads for concurrent batches. `None` uses available hardware parallelism.
    pub pool_threads: Option<usize>,
    /// How long `close()` waits for in-flight batches before cancelling queued work.
    pub shutdown_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_tokens: MAX_TOKENS,
            pool_threads: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_pool_threads(mut self, threads: usize) -> Self {
        self.pool_threads = Some(threads);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Thread count the worker pool will be built with.
    pub fn resolved_pool_threads(&self) -> usize {
        self.pool_threads
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shape_matches_minilm_l6() {
        let config = MiniLmConfig::default();
        assert_eq!(config.head_dim(), 32);
        assert_eq!(config.hidden_size, EMBEDDING_DIM);
        assert_eq!(config.num_hidden_layers, 6);
    }

    #[test]
    fn explicit_zero_threads_falls_back_to_hardware() {
        let config = SessionConfig::default().with_pool_threads(0);
        assert!(config.resolved_pool_threads() >= 1);
        assert_eq!(
            SessionConfig::default()
                .with_pool_threads(3)
                .resolved_pool_threads(),
            3
        );
    }
}
