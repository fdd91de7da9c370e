//! Failures reported by enhancement engines.

use thiserror::Error;

/// How an engine failed to enhance a content item.
///
/// A `Retryable` failure (a remote service timing out, a model still
/// loading) is attempted again after a back-off delay, up to the runner's
/// retry limit. A `Fatal` failure (unsupported content, broken input) ends
/// the engine's execution at once.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine temporarily unable to enhance: {0}")]
    Retryable(String),

    #[error("engine unable to enhance: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Retryable(_))
    }
}
