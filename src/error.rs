use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

/// Failure reported by a page fetcher.
///
/// `Clone` so a single failed fetch can be handed to every caller waiting
/// on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed page: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Transport failures and 5xx responses may succeed on a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) | FetchError::Other(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Feed(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn feed(message: impl Into<String>) -> Self {
        Self::Feed(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
