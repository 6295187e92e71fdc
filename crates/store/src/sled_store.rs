//! SledStore - lists persisted in an embedded sled database
//!
//! Each list is one bincode-encoded `Vec<Vec<u8>>` value in the `lists`
//! tree; scalars live in the `scalars` tree. Every list mutation runs in a
//! sled transaction and is flushed before returning.
//!
//! sled locks its directory, so only one process can open the store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{ContractError, ListStore};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::IVec;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::StoreError;

/// Re-check interval for `blpop` in case a wake-up was missed
const BLPOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sled-backed store. Clones share the same database handle.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    lists: sled::Tree,
    scalars: sled::Tree,
    pushed: Arc<Notify>,
}

fn decode_list(raw: Option<IVec>) -> Result<Vec<Vec<u8>>, StoreError> {
    match raw {
        Some(bytes) => Ok(bincode::deserialize(&bytes)?),
        None => Ok(Vec::new()),
    }
}

fn encode_list(list: &[Vec<u8>]) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(list)?)
}

fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

impl SledStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        let lists = db.open_tree("lists")?;
        let scalars = db.open_tree("scalars")?;
        debug!(path = %path.as_ref().display(), "sled store opened");
        Ok(Self {
            db,
            lists,
            scalars,
            pushed: Arc::new(Notify::new()),
        })
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn read_list(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        decode_list(self.lists.get(key)?)
    }

    fn push_tx(&self, key: &str, value: &[u8]) -> Result<usize, StoreError> {
        let len = self
            .lists
            .transaction(|tx| -> ConflictableTransactionResult<usize, StoreError> {
                let mut list = decode_list(tx.get(key)?).map_err(abort)?;
                list.push(value.to_vec());
                tx.insert(key, encode_list(&list).map_err(abort)?)?;
                Ok(list.len())
            })?;
        Ok(len)
    }

    fn pop_tx(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value = self
            .lists
            .transaction(|tx| -> ConflictableTransactionResult<Option<Vec<u8>>, StoreError> {
                let mut list = decode_list(tx.get(key)?).map_err(abort)?;
                if list.is_empty() {
                    return Ok(None);
                }
                let head = list.remove(0);
                if list.is_empty() {
                    tx.remove(key)?;
                } else {
                    tx.insert(key, encode_list(&list).map_err(abort)?)?;
                }
                Ok(Some(head))
            })?;
        Ok(value.map(Bytes::from))
    }

    fn rename_tx(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.lists
            .transaction(|tx| -> ConflictableTransactionResult<(), StoreError> {
                let Some(list) = tx.remove(from)? else {
                    return Err(abort(StoreError::NotFound(from.to_string())));
                };
                tx.insert(to, list)?;
                Ok(())
            })?;
        Ok(())
    }
}

impl ListStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        let value = self
            .scalars
            .get(key)
            .map_err(|e| StoreError::from(e).into_contract("get", key))?;
        Ok(value.map(|v| Bytes::copy_from_slice(&v)))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), ContractError> {
        self.scalars
            .insert(key, value.as_ref())
            .map_err(|e| StoreError::from(e).into_contract("set", key))?;
        self.flush().await.map_err(|e| e.into_contract("set", key))
    }

    async fn rpush(&self, key: &str, value: Bytes) -> Result<usize, ContractError> {
        let len = self
            .push_tx(key, &value)
            .map_err(|e| e.into_contract("rpush", key))?;
        self.flush().await.map_err(|e| e.into_contract("rpush", key))?;
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        let value = self.pop_tx(key).map_err(|e| e.into_contract("lpop", key))?;
        if value.is_some() {
            self.flush().await.map_err(|e| e.into_contract("lpop", key))?;
        }
        Ok(value)
    }

    async fn blpop(&self, key: &str) -> Result<Bytes, ContractError> {
        loop {
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.lpop(key).await? {
                return Ok(value);
            }
            // Elapsed poll is expected; loop and re-check.
            let _ = tokio::time::timeout(BLPOP_POLL_INTERVAL, notified).await;
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, ContractError> {
        let list = self.read_list(key).map_err(|e| e.into_contract("llen", key))?;
        Ok(list.len())
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<Bytes>, ContractError> {
        let list = self
            .read_list(key)
            .map_err(|e| e.into_contract("lrange", key))?;
        Ok(list.into_iter().map(Bytes::from).collect())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ContractError> {
        self.rename_tx(from, to)
            .map_err(|e| e.into_contract("rename", from))?;
        self.flush().await.map_err(|e| e.into_contract("rename", from))?;
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ContractError> {
        let list = self
            .lists
            .remove(key)
            .map_err(|e| StoreError::from(e).into_contract("delete", key))?;
        let scalar = self
            .scalars
            .remove(key)
            .map_err(|e| StoreError::from(e).into_contract("delete", key))?;
        self.flush().await.map_err(|e| e.into_contract("delete", key))?;
        Ok(list.is_some() || scalar.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[tokio::test]
    async fn list_operations() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.rpush("l", item("a")).await.unwrap();
        assert_eq!(store.rpush("l", item("b")).await.unwrap(), 2);
        assert_eq!(store.lrange_all("l").await.unwrap(), vec![item("a"), item("b")]);
        assert_eq!(store.lpop("l").await.unwrap(), Some(item("a")));
        assert_eq!(store.llen("l").await.unwrap(), 1);
        assert!(store.delete("l").await.unwrap());
        assert!(!store.delete("l").await.unwrap());
    }

    #[tokio::test]
    async fn rename_is_atomic_move() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        store.rpush("data", item("1")).await.unwrap();
        store.rpush("data", item("2")).await.unwrap();
        store.rename("data", "data.ready").await.unwrap();

        assert_eq!(store.llen("data").await.unwrap(), 0);
        assert_eq!(store.llen("data.ready").await.unwrap(), 2);

        let err = store.rename("data", "data.ready").await.unwrap_err();
        assert!(matches!(err, ContractError::KeyNotFound { .. }));
        assert_eq!(store.llen("data.ready").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ready_list_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.rpush("relay.data.ready", item("pending")).await.unwrap();
            store.set("relay.track", item("rust")).await.unwrap();
        }

        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(
            store.lrange_all("relay.data.ready").await.unwrap(),
            vec![item("pending")]
        );
        assert_eq!(store.get("relay.track").await.unwrap(), Some(item("rust")));
    }

    #[tokio::test]
    async fn blpop_wakes_on_push() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.blpop("n").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.rpush("n", item("1")).await.unwrap();

        let value = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(value, item("1"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_pushes_are_flushed() {
        let dir = tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            let pushes: Vec<_> = (0..32)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store.rpush("relay.data", Bytes::from(format!("{i}"))).await
                    })
                })
                .collect();
            for push in pushes {
                push.await.unwrap().unwrap();
            }
        }

        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.llen("relay.data").await.unwrap(), 32);
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempdir().unwrap();
        let _first = SledStore::open(dir.path()).unwrap();
        assert!(matches!(
            SledStore::open(dir.path()),
            Err(StoreError::Database(_))
        ));
    }
}
