//! Dispatcher error types

use thiserror::Error;

/// Batch processor errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Processor configuration cannot be turned into a request
    #[error("invalid processor configuration: {0}")]
    Config(String),

    /// Transport-level failure delivering a batch
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Destination answered with a non-2xx status
    #[error("destination answered status {0}")]
    Status(u16),

    /// Store failure (from contract)
    #[error("store error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the batch should be retried later
    pub fn is_posting_failure(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status(_))
    }
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
