//! Layered error definitions
//!
//! Categorized by source: config / store / sink / parameters

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Store Errors =====
    /// List/queue store operation failed
    #[error("store {op} failed on '{key}': {message}")]
    Store {
        op: &'static str,
        key: String,
        message: String,
    },

    /// Rename source list does not exist
    #[error("store key not found: {key}")]
    KeyNotFound { key: String },

    // ===== Hook Errors =====
    /// Data sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Parameter provider failed to produce request parameters
    #[error("parameter provider error: {message}")]
    Parameters { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create store operation error
    pub fn store(op: &'static str, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            op,
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create parameter provider error
    pub fn parameters(message: impl Into<String>) -> Self {
        Self::Parameters {
            message: message.into(),
        }
    }
}
