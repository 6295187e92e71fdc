//! ListStore trait - persistent list/queue primitives
//!
//! The store is the only state shared between the ingest side (manager)
//! and the publish side (batch processors). Cross-boundary coordination
//! goes exclusively through `rpush`, `blpop`, `rename` and `delete`.

use bytes::Bytes;

use crate::ContractError;

/// Default key namespace
pub const DEFAULT_NAMESPACE: &str = "relay.";

/// Redis-like list store.
///
/// Implementations must make `rename` atomic with respect to concurrent
/// `rpush` on the source key: every item ends up either in the destination
/// or in a fresh source list, never both and never neither.
#[trait_variant::make(ListStore: Send)]
pub trait LocalListStore {
    /// Read a scalar value
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ContractError>;

    /// Write a scalar value
    async fn set(&self, key: &str, value: Bytes) -> Result<(), ContractError>;

    /// Append to the tail of a list, returning the new length
    async fn rpush(&self, key: &str, value: Bytes) -> Result<usize, ContractError>;

    /// Pop from the head of a list without waiting
    async fn lpop(&self, key: &str) -> Result<Option<Bytes>, ContractError>;

    /// Wait until the list has an item, then pop it from the head
    async fn blpop(&self, key: &str) -> Result<Bytes, ContractError>;

    /// List length (0 for a missing key)
    async fn llen(&self, key: &str) -> Result<usize, ContractError>;

    /// Read the whole list without removing anything
    async fn lrange_all(&self, key: &str) -> Result<Vec<Bytes>, ContractError>;

    /// Atomically move `from` to `to`, replacing any existing `to`
    ///
    /// # Errors
    /// `ContractError::KeyNotFound` when `from` does not exist
    async fn rename(&self, from: &str, to: &str) -> Result<(), ContractError>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, ContractError>;
}

/// Key layout inside the store.
///
/// ```text
/// <ns><param>            scalar per upstream filter parameter
/// <ns>data               incoming item list
/// <ns>data.<ready_id>    ready list of one batch processor
/// <ns>notify             wake-up list, one push per item
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    namespace: String,
}

impl StoreKeys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Scalar key holding one upstream filter parameter
    pub fn param(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }

    /// Shared incoming data list
    pub fn data(&self) -> String {
        format!("{}data", self.namespace)
    }

    /// Notification list
    pub fn notify(&self) -> String {
        format!("{}notify", self.namespace)
    }

    /// Ready list for the processor identified by `ready_list_id`
    pub fn ready(&self, ready_list_id: &str) -> String {
        format!("{}.{}", self.data(), ready_list_id)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let keys = StoreKeys::default();
        assert_eq!(keys.param("track"), "relay.track");
        assert_eq!(keys.data(), "relay.data");
        assert_eq!(keys.notify(), "relay.notify");
        assert_eq!(keys.ready("ready"), "relay.data.ready");
    }

    #[test]
    fn custom_namespace() {
        let keys = StoreKeys::new("feed:");
        assert_eq!(keys.ready("a"), "feed:data.a");
    }
}
