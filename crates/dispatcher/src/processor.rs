//! BatchQueueProcessor - moves full batches off the data list and posts them
//!
//! ```text
//! ready empty? --yes--> BLPOP notify --> llen(data) < num_items? --yes--> loop
//!      |                                        | no
//!      |                                RENAME data -> ready
//!      v                                        v
//!   LRANGE ready --> transform --> POST --2xx--> DELETE ready, reset delay
//!                                    \--else--> keep ready, double delay, sleep
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    ContractError, DoublingBackoff, ItemTransform, ListStore, ProcessorConfig, StoreKeys,
};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::metrics::ProcessorMetrics;
use crate::poster::BatchPoster;
use crate::transforms;

/// What one iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Woken, but the data list held fewer than `num_items`
    BelowThreshold(usize),
    /// Ready list delivered (or fully filtered) and deleted
    Posted(usize),
    /// Delivery failed; ready list kept, retry after the delay
    Retry(Duration),
}

pub struct BatchQueueProcessor<S, P> {
    store: S,
    poster: P,
    transform: Option<Arc<dyn ItemTransform>>,
    ready_list_id: String,
    num_items: usize,
    data_key: String,
    notify_key: String,
    ready_key: String,
    backoff: DoublingBackoff,
    metrics: Arc<ProcessorMetrics>,
}

impl<S, P> BatchQueueProcessor<S, P>
where
    S: ListStore + Sync,
    P: BatchPoster + Sync,
{
    pub fn new(store: S, poster: P, keys: &StoreKeys, config: &ProcessorConfig) -> Self {
        Self {
            store,
            poster,
            transform: transforms::from_kind(config.transform),
            ready_list_id: config.ready_list_id.clone(),
            num_items: config.num_items.max(1),
            data_key: keys.data(),
            notify_key: keys.notify(),
            ready_key: keys.ready(&config.ready_list_id),
            backoff: DoublingBackoff::new(&config.backoff),
            metrics: Arc::new(ProcessorMetrics::new(config.ready_list_id.clone())),
        }
    }

    /// Replace the configured transform
    pub fn with_transform(mut self, transform: Arc<dyn ItemTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn ready_key(&self) -> &str {
        &self.ready_key
    }

    pub fn metrics(&self) -> &Arc<ProcessorMetrics> {
        &self.metrics
    }

    /// Delay the next failed POST would sleep
    pub fn current_delay(&self) -> Duration {
        self.backoff.current()
    }

    /// One pass of the loop. Does not sleep on failure; see [`Self::run`].
    pub async fn step(&mut self) -> Result<StepOutcome> {
        if self.store.llen(&self.ready_key).await? == 0 {
            self.store.blpop(&self.notify_key).await?;
            let pending = self.store.llen(&self.data_key).await?;
            if pending < self.num_items {
                debug!(ready_list = %self.ready_list_id, pending, "below threshold");
                return Ok(StepOutcome::BelowThreshold(pending));
            }
            match self.store.rename(&self.data_key, &self.ready_key).await {
                Ok(()) => self.metrics.record_claimed(),
                // another processor claimed the data list first
                Err(ContractError::KeyNotFound { .. }) => {
                    return Ok(StepOutcome::BelowThreshold(0));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let items = self.store.lrange_all(&self.ready_key).await?;
        let batch = self.apply_transform(items);

        let delivered = if batch.is_empty() {
            Ok(())
        } else {
            self.poster.post(&batch).await
        };

        match delivered {
            Ok(()) => {
                self.backoff.reset();
                self.store.delete(&self.ready_key).await?;
                self.metrics.record_posted(batch.len());
                info!(ready_list = %self.ready_list_id, items = batch.len(), "batch posted");
                Ok(StepOutcome::Posted(batch.len()))
            }
            Err(e) if e.is_posting_failure() => {
                self.metrics.record_failure();
                let delay = self.backoff.increment();
                warn!(
                    ready_list = %self.ready_list_id,
                    items = batch.len(),
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "batch post failed, keeping ready list"
                );
                Ok(StepOutcome::Retry(delay))
            }
            Err(e) => Err(e),
        }
    }

    fn apply_transform(&self, items: Vec<Bytes>) -> Vec<Bytes> {
        let Some(transform) = &self.transform else {
            return items;
        };
        let total = items.len();
        let batch: Vec<Bytes> = items
            .iter()
            .filter_map(|item| transform.transform(item))
            .collect();
        let dropped = total - batch.len();
        if dropped > 0 {
            debug!(transform = transform.name(), dropped, "items filtered out");
        }
        self.metrics.record_dropped(dropped);
        batch
    }

    /// Loop until `shutdown` flips to true (or its sender is dropped)
    #[instrument(name = "processor_run", skip(self, shutdown), fields(ready_list = %self.ready_list_id))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            ready_list = %self.ready_list_id,
            num_items = self.num_items,
            "batch processor started"
        );
        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                outcome = self.step() => outcome,
            };

            let delay = match outcome {
                Ok(StepOutcome::Retry(delay)) => delay,
                Ok(_) => continue,
                Err(e) => {
                    let delay = self.backoff.increment();
                    error!(
                        ready_list = %self.ready_list_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "store failure in batch processor"
                    );
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(ready_list = %self.ready_list_id, "batch processor stopped");
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
