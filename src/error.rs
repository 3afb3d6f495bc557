//! Error types surfaced by the evaluation pipeline.
//!
//! Model plumbing works in `anyhow::Result` internally; every failure is
//! mapped onto one of these variants before it reaches a caller.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    /// The image input is neither a usable path nor a decoded image.
    #[error("invalid image input: {0}")]
    InvalidInput(String),

    /// The path does not reference a readable image file.
    #[error("image not found at {path:?}: {reason}")]
    NotFound { path: PathBuf, reason: String },

    /// A model rejected its input or produced an unusable score.
    #[error("{model} inference failed: {source:#}")]
    Inference {
        model: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Model weights, tokenizer, or runtime could not be initialized.
    #[error("failed to initialize {model}: {source:#}")]
    Init {
        model: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl EvalError {
    pub(crate) fn inference(model: &'static str, source: anyhow::Error) -> Self {
        Self::Inference { model, source }
    }

    pub(crate) fn init(model: &'static str, source: anyhow::Error) -> Self {
        Self::Init { model, source }
    }

    pub(crate) fn not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Reject NaN and infinite scores so a result never carries them.
pub(crate) fn check_finite(model: &'static str, score: f32) -> Result<f32> {
    if score.is_finite() {
        Ok(score)
    } else {
        Err(EvalError::inference(
            model,
            anyhow::anyhow!("model produced a non-finite score ({})", score),
        ))
    }
}
