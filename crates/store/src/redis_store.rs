//! RedisStore - lists on a redis server, shared across processes
//!
//! Every primitive maps onto the redis command of the same name, so
//! `RENAME` is atomic on the server and `BLPOP` wakes on pushes from any
//! process.

use std::sync::Arc;

use bytes::Bytes;
use contracts::{ContractError, ListStore};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{Client, ErrorKind, RedisError};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;

/// Server-side wait per `BLPOP` round trip, in seconds
const BLPOP_TIMEOUT_SECS: u64 = 1;

/// Redis-backed store. Clones share one connection manager.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
    /// Connection reserved for `BLPOP`; a blocked command would stall the shared one
    blocking: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisStore {
    /// Connect to the server at `url`
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        debug!("redis store connected");
        Ok(Self {
            client,
            conn,
            blocking: Arc::new(Mutex::new(None)),
        })
    }

    async fn blocking_conn(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.blocking.lock().await.take() {
            return Ok(conn);
        }
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

fn to_contract(err: RedisError, op: &'static str, key: &str) -> ContractError {
    let err = if err.kind() == ErrorKind::ResponseError && err.to_string().contains("no such key") {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::Redis(err)
    };
    err.into_contract(op, key)
}

impl ListStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "get", key))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), ContractError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "set", key))?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: Bytes) -> Result<usize, ContractError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("RPUSH")
            .arg(key)
            .arg(value.as_ref())
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "rpush", key))?;
        Ok(len)
    }

    async fn lpop(&self, key: &str) -> Result<Option<Bytes>, ContractError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("LPOP")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "lpop", key))?;
        Ok(value.map(Bytes::from))
    }

    async fn blpop(&self, key: &str) -> Result<Bytes, ContractError> {
        // Taken out of the slot while waiting: a cancelled BLPOP drops its
        // connection instead of leaving a pending reply on a reused one.
        let mut conn = self
            .blocking_conn()
            .await
            .map_err(|e| e.into_contract("blpop", key))?;
        loop {
            let popped: Option<(Vec<u8>, Vec<u8>)> = redis::cmd("BLPOP")
                .arg(key)
                .arg(BLPOP_TIMEOUT_SECS)
                .query_async(&mut conn)
                .await
                .map_err(|e| to_contract(e, "blpop", key))?;
            if let Some((_, value)) = popped {
                *self.blocking.lock().await = Some(conn);
                return Ok(Bytes::from(value));
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<usize, ContractError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "llen", key))?;
        Ok(len)
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<Bytes>, ContractError> {
        let mut conn = self.conn.clone();
        let items: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "lrange", key))?;
        Ok(items.into_iter().map(Bytes::from).collect())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), ContractError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("RENAME")
            .arg(from)
            .arg(to)
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "rename", from))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ContractError> {
        let mut conn = self.conn.clone();
        let removed: usize = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| to_contract(e, "delete", key))?;
        Ok(removed > 0)
    }
}
