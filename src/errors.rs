//! Central error types for minilm-oxidized.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiniLmError {
    #[error("Cannot read {path:?}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Missing required weight {0}")]
    MissingWeight(String),

    #[error("Dimension mismatch for {name}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(
        "Input produced {count} tokens, exceeding the limit of {limit}; retry with shorter text"
    )]
    TokenLimitExceeded { count: usize, limit: usize },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Work cancelled by session shutdown")]
    Cancelled,
}

impl MiniLmError {
    pub(crate) fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }

    /// True for malformed weight or vocabulary data, including missing or misshapen weights.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::Format(_) | Self::MissingWeight(_) | Self::DimensionMismatch { .. }
        )
    }

    /// True when the caller can recover by shortening the input.
    pub fn is_token_limit(&self) -> bool {
        matches!(self, Self::TokenLimitExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, MiniLmError>;
