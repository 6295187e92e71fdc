//! Error types for CLI operations.

use contracts::StoreKind;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Command cannot work with the configured store
    #[error("`{command}` needs the redis store, but the {kind:?} store is configured (use `run`)")]
    SharedStoreRequired {
        command: &'static str,
        kind: StoreKind,
    },

    /// Processor selection failed
    #[error("Cannot select processor: {message}")]
    ProcessorSelection { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Fails unless `kind` can be shared between processes
    pub fn require_shared_store(command: &'static str, kind: StoreKind) -> Result<(), Self> {
        if kind.is_shared() {
            Ok(())
        } else {
            Err(Self::SharedStoreRequired { command, kind })
        }
    }

    pub fn processor_selection(message: impl Into<String>) -> Self {
        Self::ProcessorSelection {
            message: message.into(),
        }
    }
}
