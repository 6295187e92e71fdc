//! # Store
//!
//! `ListStore` backends for the relay.
//!
//! - [`MemoryStore`]: in-process lists guarded by one async mutex; `blpop`
//!   waits on a `Notify` fed by every push
//! - [`SledStore`]: lists persisted in an embedded sled database so a
//!   pending ready list survives a restart; single process only
//! - [`RedisStore`]: lists on a redis server, the only backend separate
//!   `consume` and `process` processes can share
//!
//! ## Usage Example
//!
//! ```ignore
//! use contracts::{ListStore, StoreConfig};
//!
//! let store = store::open(&blueprint.store).await?;
//! store.rpush("relay.data", Bytes::from_static(b"item")).await?;
//! ```

mod error;
mod memory;
mod redis_store;
mod sled_store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use sled_store::SledStore;

use bytes::Bytes;
use contracts::{ContractError, ListStore, StoreConfig, StoreKind};

/// Store selected at runtime from configuration
#[derive(Clone)]
pub enum AnyStore {
    Memory(MemoryStore),
    Sled(SledStore),
    Redis(RedisStore),
}

/// Open the store described by `config`
///
/// # Errors
/// Open/connect failure, or a sled store without a path, or a redis store
/// without a url
pub async fn open(config: &StoreConfig) -> Result<AnyStore, StoreError> {
    match config.kind {
        StoreKind::Memory => Ok(AnyStore::Memory(MemoryStore::new())),
        StoreKind::Sled => {
            let path = config.path.as_ref().ok_or(StoreError::MissingPath)?;
            Ok(AnyStore::Sled(SledStore::open(path)?))
        }
        StoreKind::Redis => {
            let url = config.url.as_deref().ok_or(StoreError::MissingUrl)?;
            Ok(AnyStore::Redis(RedisStore::connect(url).await?))
        }
    }
}

impl AnyStore {
    pub fn kind(&self) -> StoreKind {
        match self {
            AnyStore::Memory(_) => StoreKind::Memory,
            AnyStore::Sled(_) => StoreKind::Sled,
            AnyStore::Redis(_) => StoreKind::Redis,
        }
    }
}

impl ListStore for AnyStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        match self {
            AnyStore::Memory(s) => s.get(key).await,
            AnyStore::Sled(s) => s.get(key).await,
            AnyStore::Redis(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), ContractError> {
        match self {
            AnyStore::Memory(s) => s.set(key, value).await,
            AnyStore::Sled(s) => s.set(key, value).await,
            AnyStore::Redis(s) => s.set(key, value).await,
        }
    }

    async fn rpush(&self, key: &str, value: Bytes) -> Result<usize, ContractError> {
        match self {
            AnyStore::Memory(s) => s.rpush(key, value).await,
            AnyStore::Sled(s) => s.rpush(key, value).await,
            AnyStore::Redis(s) => s.rpush(key, value).await,
        }
    }

    async fn lpop(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        match self {
            AnyStore::Memory(s) => s.lpop(key).await,
            AnyStore::Sled(s) => s.lpop(key).await,
            AnyStore::Redis(s) => s.lpop(key).await,
        }
    }

    async fn blpop(&self, key: &str) -> Result<Bytes, ContractError> {
        match self {
            AnyStore::Memory(s) => s.blpop(key).await,
            AnyStore::Sled(s) => s.blpop(key).await,
            AnyStore::Redis(s) => s.blpop(key).await,
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, ContractError> {
        match self {
            AnyStore::Memory(s) => s.llen(key).await,
            AnyStore::Sled(s) => s.llen(key).await,
            AnyStore::Redis(s) => s.llen(key).await,
        }
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<Bytes>, ContractError> {
        match self {
            AnyStore::Memory(s) => s.lrange_all(key).await,
            AnyStore::Sled(s) => s.lrange_all(key).await,
            AnyStore::Redis(s) => s.lrange_all(key).await,
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ContractError> {
        match self {
            AnyStore::Memory(s) => s.rename(from, to).await,
            AnyStore::Sled(s) => s.rename(from, to).await,
            AnyStore::Redis(s) => s.rename(from, to).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, ContractError> {
        match self {
            AnyStore::Memory(s) => s.delete(key).await,
            AnyStore::Sled(s) => s.delete(key).await,
            AnyStore::Redis(s) => s.delete(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sled_requires_path() {
        let config = StoreConfig {
            kind: StoreKind::Sled,
            path: None,
            url: None,
            namespace: "relay.".into(),
        };
        assert!(matches!(open(&config).await, Err(StoreError::MissingPath)));
    }

    #[tokio::test]
    async fn memory_from_config() {
        let store = open(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.kind(), StoreKind::Memory);
        store.rpush("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(store.llen("k").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn redis_requires_url() {
        let config = StoreConfig {
            kind: StoreKind::Redis,
            url: None,
            ..StoreConfig::default()
        };
        assert!(matches!(open(&config).await, Err(StoreError::MissingUrl)));
    }
}
