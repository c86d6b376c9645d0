//! Session: owns the loaded model, vocabulary and batch worker pool.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use tracing::{debug, info};

use crate::errors::{MiniLmError, Result};
use crate::inference::engine::Encoder;
use crate::inference::pool::WorkerPool;
use crate::inference::pooling::{pool, Embedding};
use crate::model::{MiniLmConfig, MiniLmModel, SessionConfig, WeightSet, POOLING};
use crate::tokenizer::{TokenSequence, Tokenizer, Vocabulary};

/// How [`Session::embed_batch`] schedules its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// One text at a time on the calling thread.
    #[default]
    Sequential,
    /// Spread across the session's worker pool.
    Concurrent,
}

/// Everything an embed call reads. Immutable once built.
struct Loaded {
    encoder: Encoder,
    tokenizer: Tokenizer,
}

impl Loaded {
    fn tokenize(&self, text: &str) -> Result<TokenSequence> {
        if text.contains('\0') {
            return Err(MiniLmError::Validation(
                "text contains a NUL character".into(),
            ));
        }
        self.tokenizer.tokenize(text)
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        let tokens = self.tokenize(text)?;
        debug!(tokens = tokens.len(), "embedding text");
        let hidden = self.encoder.forward(&tokens)?;
        pool(&hidden, &tokens.attention_mask(), POOLING)
    }
}

/// A loaded embedding engine.
///
/// `Session` is `Send + Sync`; share it across threads with `Arc<Session>`.
/// The loaded model sits behind an `ArcSwapOption`, so calls read it without locking.
/// Calls after [`Session::close`] fail with [`MiniLmError::SessionClosed`].
pub struct Session {
    config: SessionConfig,
    inner: ArcSwapOption<Loaded>,
    workers: WorkerPool,
}

impl Session {
    /// Load weights (a directory of tensor files or a TBF1 container) and a vocabulary file.
    pub fn open(weights_path: impl AsRef<Path>, vocab_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(weights_path, vocab_path, SessionConfig::default())
    }

    pub fn open_with_config(
        weights_path: impl AsRef<Path>,
        vocab_path: impl AsRef<Path>,
        config: SessionConfig,
    ) -> Result<Self> {
        let weights_path = weights_path.as_ref();
        let vocab_path = vocab_path.as_ref();
        let start = Instant::now();

        let vocab = Vocabulary::load(vocab_path)?;
        let weights = WeightSet::load(weights_path)?;
        let tensor_count = weights.len();
        let model = MiniLmModel::from_weights(weights)?;

        let session = Self::from_model(model, vocab, config)?;
        info!(
            weights = %weights_path.display(),
            tensors = tensor_count,
            vocab_size = session.vocab_size().unwrap_or(0),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "session opened"
        );
        Ok(session)
    }

    /// Build a session from an already assembled model and vocabulary.
    pub fn from_model(
        model: MiniLmModel,
        vocab: Vocabulary,
        config: SessionConfig,
    ) -> Result<Self> {
        if config.max_tokens < 2 {
            return Err(MiniLmError::Validation(format!(
                "max_tokens must be at least 2, got {}",
                config.max_tokens
            )));
        }
        if config.max_tokens > model.max_positions() {
            return Err(MiniLmError::Validation(format!(
                "max_tokens {} exceeds the model's {} positions",
                config.max_tokens,
                model.max_positions()
            )));
        }
        if vocab.len() > model.vocab_size() {
            return Err(MiniLmError::Format(format!(
                "vocabulary has {} tokens but the embedding table has {} rows",
                vocab.len(),
                model.vocab_size()
            )));
        }

        let loaded = Loaded {
            encoder: Encoder::new(Arc::new(model)),
            tokenizer: Tokenizer::new(vocab, config.max_tokens),
        };
        let workers = WorkerPool::new(config.resolved_pool_threads());
        Ok(Self {
            config,
            inner: ArcSwapOption::from_pointee(loaded),
            workers,
        })
    }

    fn snapshot(&self) -> Result<Arc<Loaded>> {
        self.inner.load_full().ok_or(MiniLmError::SessionClosed)
    }

    /// Embed one text: tokenize, encode, pool, normalize.
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        self.snapshot()?.embed(text)
    }

    /// Embed every text, returning results in input order.
    ///
    /// The first failing text fails the whole batch; no partial results are returned.
    pub fn embed_batch<S>(&self, texts: &[S], mode: BatchMode) -> Result<Vec<Embedding>>
    where
        S: AsRef<str> + Sync,
    {
        let loaded = self.snapshot()?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match mode {
            BatchMode::Sequential => texts.iter().map(|t| loaded.embed(t.as_ref())).collect(),
            BatchMode::Concurrent => self.workers.map(texts, |t| loaded.embed(t.as_ref())),
        }
    }

    /// Tokenize without running the encoder, e.g. to check the token limit up front.
    pub fn tokenize(&self, text: &str) -> Result<TokenSequence> {
        self.snapshot()?.tokenize(text)
    }

    /// Release the model and vocabulary and shut the worker pool down.
    ///
    /// Waits up to `shutdown_grace` for running batches before cancelling them.
    /// Calling it again does nothing.
    pub fn close(&self) {
        let Some(loaded) = self.inner.swap(None) else {
            return;
        };
        let drained = self.workers.shutdown(self.config.shutdown_grace);
        drop(loaded);
        info!(drained, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.load().is_none()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Architecture of the loaded model, or `None` once closed.
    pub fn model_config(&self) -> Option<MiniLmConfig> {
        self.inner
            .load_full()
            .map(|l| l.encoder.model().config.clone())
    }

    /// Vocabulary size, or `None` once closed.
    pub fn vocab_size(&self) -> Option<usize> {
        self.inner.load_full().map(|l| l.tokenizer.vocab().len())
    }

    /// Whether a concurrent batch has started the worker pool.
    pub fn pool_started(&self) -> bool {
        self.workers.is_started()
    }

    /// Number of worker pools built over the session's lifetime (0 or 1).
    pub fn pools_created(&self) -> usize {
        self.workers.created_count()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("workers", &self.workers)
            .finish()
    }
}
