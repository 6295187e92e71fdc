//! Manager error types

use thiserror::Error;

/// Consumer Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Parameter provider or store failure
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// Manager already shut down
    #[error("consumer manager is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, ManagerError>;
