//! DataSink trait - where streamed items go
//!
//! The manager forwards every `Event::Data` payload to a sink unchanged.
//! Durability is the sink's responsibility; the manager never retries.

use bytes::Bytes;

use crate::ContractError;

/// Data output trait
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Accept one item from the upstream feed
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn handle(&self, payload: Bytes) -> Result<(), ContractError>;
}
