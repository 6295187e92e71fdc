//! Store-backed parameter provider and data sink

use std::collections::BTreeMap;

use bytes::Bytes;
use contracts::{ContractError, DataSink, ListStore, ParameterProvider, StoreKeys};
use tracing::{debug, info};

/// Reads filter parameters from scalar keys; missing or empty values are omitted
#[derive(Debug, Clone)]
pub struct StoreParameters<S> {
    store: S,
    keys: StoreKeys,
    names: Vec<String>,
}

impl<S> StoreParameters<S> {
    pub fn new(store: S, keys: StoreKeys, names: impl IntoIterator<Item = String>) -> Self {
        Self {
            store,
            keys,
            names: names.into_iter().collect(),
        }
    }
}

impl<S: ListStore + Sync> ParameterProvider for StoreParameters<S> {
    async fn params(&self) -> Result<Vec<(String, String)>, ContractError> {
        let mut params = Vec::with_capacity(self.names.len());
        for name in &self.names {
            let Some(value) = self.store.get(&self.keys.param(name)).await? else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let value = String::from_utf8(value.to_vec()).map_err(|_| {
                ContractError::parameters(format!("parameter '{name}' is not valid UTF-8"))
            })?;
            params.push((name.clone(), value));
        }
        debug!(params = params.len(), "parameters loaded from store");
        Ok(params)
    }
}

/// Appends every item to the shared data list, then pushes one wake-up
#[derive(Debug, Clone)]
pub struct StoreDataSink<S> {
    store: S,
    data_key: String,
    notify_key: String,
}

impl<S> StoreDataSink<S> {
    pub fn new(store: S, keys: &StoreKeys) -> Self {
        Self {
            store,
            data_key: keys.data(),
            notify_key: keys.notify(),
        }
    }
}

impl<S: ListStore + Sync> DataSink for StoreDataSink<S> {
    fn name(&self) -> &str {
        "store"
    }

    async fn handle(&self, payload: Bytes) -> Result<(), ContractError> {
        self.store.rpush(&self.data_key, payload).await?;
        self.store
            .rpush(&self.notify_key, Bytes::from_static(b"1"))
            .await?;
        Ok(())
    }
}

/// Write `initial` values for parameters that have no stored value yet.
///
/// Returns how many keys were written.
pub async fn seed_parameters<S: ListStore + Sync>(
    store: &S,
    keys: &StoreKeys,
    initial: &BTreeMap<String, String>,
) -> Result<usize, ContractError> {
    let mut seeded = 0;
    for (name, value) in initial {
        let key = keys.param(name);
        if store.get(&key).await?.is_none() {
            store.set(&key, Bytes::from(value.clone())).await?;
            seeded += 1;
        }
    }
    if seeded > 0 {
        info!(seeded, "seeded filter parameters");
    }
    Ok(seeded)
}
