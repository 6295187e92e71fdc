//! MemoryStore - 进程内列表存储
//!
//! 所有数据放在一把异步锁后面；`blpop` 等待每次 push 触发的 `Notify`。
//! 进程退出即丢失，只适合 `run` 与测试。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{ContractError, ListStore};
use tokio::sync::{Mutex, Notify};

use crate::error::StoreError;

#[derive(Debug)]
enum Entry {
    Scalar(Bytes),
    List(VecDeque<Bytes>),
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    pushed: Notify,
}

/// 进程内存储，克隆共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn list_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<Option<&'a mut VecDeque<Bytes>>, StoreError> {
    match entries.get_mut(key) {
        None => Ok(None),
        Some(Entry::List(list)) => Ok(Some(list)),
        Some(Entry::Scalar(_)) => Err(StoreError::WrongType {
            key: key.to_string(),
            expected: "list",
        }),
    }
}

impl ListStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        let entries = self.inner.entries.lock().await;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry::Scalar(value)) => Ok(Some(value.clone())),
            Some(Entry::List(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
                expected: "scalar",
            }
            .into_contract("get", key)),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), ContractError> {
        let mut entries = self.inner.entries.lock().await;
        entries.insert(key.to_string(), Entry::Scalar(value));
        Ok(())
    }

    async fn rpush(&self, key: &str, value: Bytes) -> Result<usize, ContractError> {
        let len = {
            let mut entries = self.inner.entries.lock().await;
            match list_mut(&mut entries, key).map_err(|e| e.into_contract("rpush", key))? {
                Some(list) => {
                    list.push_back(value);
                    list.len()
                }
                None => {
                    entries.insert(key.to_string(), Entry::List(VecDeque::from([value])));
                    1
                }
            }
        };
        self.inner.pushed.notify_waiters();
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        let mut entries = self.inner.entries.lock().await;
        let Some(list) = list_mut(&mut entries, key).map_err(|e| e.into_contract("lpop", key))?
        else {
            return Ok(None);
        };
        let value = list.pop_front();
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(value)
    }

    async fn blpop(&self, key: &str) -> Result<Bytes, ContractError> {
        loop {
            // Register before checking so a push between the check and the wait is not lost.
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.lpop(key).await? {
                return Ok(value);
            }
            notified.await;
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, ContractError> {
        let mut entries = self.inner.entries.lock().await;
        let list = list_mut(&mut entries, key).map_err(|e| e.into_contract("llen", key))?;
        Ok(list.map_or(0, |l| l.len()))
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<Bytes>, ContractError> {
        let mut entries = self.inner.entries.lock().await;
        let list = list_mut(&mut entries, key).map_err(|e| e.into_contract("lrange", key))?;
        Ok(list.map(|l| l.iter().cloned().collect()).unwrap_or_default())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ContractError> {
        {
            let mut entries = self.inner.entries.lock().await;
            let entry = entries
                .remove(from)
                .ok_or_else(|| StoreError::NotFound(from.to_string()).into_contract("rename", from))?;
            entries.insert(to.to_string(), entry);
        }
        self.inner.pushed.notify_waiters();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ContractError> {
        let mut entries = self.inner.entries.lock().await;
        Ok(entries.remove(key).is_some())
    }
}
