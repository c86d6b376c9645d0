//! # minilm-oxidized
//!
//! Sentence embeddings from a 6-layer MiniLM (BERT-style) encoder in pure Rust.
//!
//! ## Architecture
//!
//! - **Weights**: per-tensor binary files or a TBF1 container, checked against the fixed architecture
//! - **Tokenizer**: BERT basic normalization plus greedy WordPiece, `[CLS] … [SEP]`, 256-token limit
//! - **Encoder**: 6 post-norm layers, 12-head masked self-attention, GELU feedforward, f32 throughout
//! - **Pooling**: masked mean over real tokens, then L2 normalization to a 384-float vector
//! - **Session**: open / embed / embed_batch / close, with a lazily started worker pool

pub mod errors;
pub mod inference;
pub mod kernels;
pub mod model;
pub mod tokenizer;

pub use errors::{MiniLmError, Result};
pub use inference::{nearest, BatchMode, Embedding, Encoder, HiddenStates, Session};
pub use model::{
    create_demo_model, MiniLmConfig, MiniLmModel, Pooling, SessionConfig, Tensor, WeightSet,
    EMBEDDING_DIM, MAX_TOKENS, POOLING,
};
pub use tokenizer::{TokenSequence, Tokenizer, Vocabulary};
