//! 存储错误类型

use contracts::ContractError;
use sled::transaction::TransactionError;
use thiserror::Error;

/// 存储后端错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 对标量键做列表操作，或反之
    #[error("wrong type for key '{key}', expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// Key does not exist
    #[error("key not found: {0}")]
    NotFound(String),

    /// Sled store configured without a path
    #[error("sled store requires a path")]
    MissingPath,

    /// Redis store configured without a URL
    #[error("redis store requires a url")]
    MissingUrl,

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    /// Redis connection or command error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// List (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Database(e),
        }
    }
}

impl StoreError {
    /// Convert into the contract error for operation `op` on `key`
    pub fn into_contract(self, op: &'static str, key: &str) -> ContractError {
        match self {
            StoreError::NotFound(key) => ContractError::KeyNotFound { key },
            other => ContractError::store(op, key, other.to_string()),
        }
    }
}
