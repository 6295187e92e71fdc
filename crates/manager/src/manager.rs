//! ConsumerManager - registry of live consumers, hot restart and self-healing

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    ConsumerId, DataSink, Event, LinearBackoff, ManagerConfig, ParameterProvider, UpstreamConfig,
};
use ingestion::{Consumer, ConsumerHandle, DataFramer, EventNotifier, IngestionMetrics};
use metrics::counter;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ManagerError, Result};

/// State shared by every event handler; always accessed under one lock
struct ManagerState {
    registry: HashMap<ConsumerId, ConsumerHandle>,
    active: Option<ConsumerId>,
    exit_backoff: LinearBackoff,
}

struct Inner<P, S, F> {
    upstream: UpstreamConfig,
    params: P,
    sink: S,
    framer: F,
    notifier: EventNotifier,
    metrics: Arc<IngestionMetrics>,
    state: Mutex<ManagerState>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns the consumers of one upstream feed.
///
/// A fixed pool of workers drains the shared [`EventNotifier`]:
/// - `Connect(id)` makes `id` active and kills every other consumer
/// - `Data(payload)` goes to the sink unchanged
/// - `Exit(id)` unregisters `id` and schedules a replacement after the
///   exit delay when `id` was active or nothing is left running; a
///   replacement that fails to start grows the delay and tries again
pub struct ConsumerManager<P, S, F> {
    inner: Arc<Inner<P, S, F>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<P, S, F> Clone for ConsumerManager<P, S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            workers: Arc::clone(&self.workers),
        }
    }
}

impl<P, S, F> ConsumerManager<P, S, F>
where
    P: ParameterProvider + Sync + 'static,
    S: DataSink + Sync + 'static,
    F: DataFramer + Clone + Send + Sync + 'static,
{
    /// Create the manager and spawn its worker pool. Must run inside a tokio runtime.
    pub fn new(
        upstream: UpstreamConfig,
        config: &ManagerConfig,
        params: P,
        sink: S,
        framer: F,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            upstream,
            params,
            sink,
            framer,
            notifier: EventNotifier::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            state: Mutex::new(ManagerState {
                registry: HashMap::new(),
                active: None,
                exit_backoff: LinearBackoff::new(&config.exit_backoff),
            }),
            shutdown_tx,
        });

        let workers = (0..config.num_workers.max(1))
            .map(|worker| tokio::spawn(worker_loop(Arc::clone(&inner), worker)))
            .collect();

        info!(workers = config.num_workers, "consumer manager started");
        Self {
            inner,
            workers: Arc::new(Mutex::new(workers)),
        }
    }

    pub fn notifier(&self) -> &EventNotifier {
        &self.inner.notifier
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.inner.metrics
    }

    /// Start one consumer with fresh parameters; returns its id
    pub async fn start_a_consumer(&self) -> Result<ConsumerId> {
        self.inner.start_a_consumer().await
    }

    /// Kill every consumer and forget the active one. Schedules nothing.
    pub async fn stop_all_consumers(&self) {
        self.inner.stop_all_consumers().await
    }

    /// Stop everything, then start a single consumer
    pub async fn restart(&self) -> Result<ConsumerId> {
        self.inner.stop_all_consumers().await;
        self.inner.start_a_consumer().await
    }

    pub async fn active_consumer_id(&self) -> Option<ConsumerId> {
        self.inner.state.lock().await.active.clone()
    }

    /// Ids currently in the registry
    pub async fn consumer_ids(&self) -> Vec<ConsumerId> {
        self.inner.state.lock().await.registry.keys().cloned().collect()
    }

    /// Delay the next self-healing restart would wait
    pub async fn exit_delay(&self) -> Duration {
        self.inner.state.lock().await.exit_backoff.current()
    }

    /// Stop all consumers, drain the event queue and join the workers
    #[instrument(name = "manager_shutdown", skip(self))]
    pub async fn shutdown(self) {
        self.inner.shutdown_tx.send_replace(true);
        self.inner.stop_all_consumers().await;
        self.inner.notifier.close();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = ?e, "manager worker panicked");
            }
        }
        debug!("consumer manager shutdown complete");
    }
}

impl<P, S, F> Inner<P, S, F>
where
    P: ParameterProvider + Sync + 'static,
    S: DataSink + Sync + 'static,
    F: DataFramer + Clone + Send + Sync + 'static,
{
    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    async fn start_a_consumer(&self) -> Result<ConsumerId> {
        if self.is_shut_down() {
            return Err(ManagerError::ShutDown);
        }
        let params = self.params.params().await?;
        let consumer = Consumer::new(
            &self.upstream,
            &params,
            self.framer.clone(),
            self.notifier.clone(),
            Arc::clone(&self.metrics),
        );
        let id = consumer.id().clone();

        // Registered before the task can publish its Connect.
        let mut state = self.state.lock().await;
        state.registry.insert(id.clone(), consumer.spawn());
        info!(
            consumer_id = %id,
            params = params.len(),
            consumers = state.registry.len(),
            "consumer started"
        );
        Ok(id)
    }

    async fn stop_all_consumers(&self) {
        let mut state = self.state.lock().await;
        state.active = None;
        let handles: Vec<_> = state.registry.drain().map(|(_, handle)| handle).collect();
        let stopped = handles.len();
        for handle in handles {
            handle.kill().await;
        }
        info!(stopped, "all consumers stopped");
    }

    async fn dispatch(self: &Arc<Self>, event: Event) {
        match event {
            Event::Connect(id) => self.handle_connect(id).await,
            Event::Data(payload) => self.handle_data(payload).await,
            Event::Exit(id) => self.handle_exit(id).await,
        }
    }

    async fn handle_connect(&self, id: ConsumerId) {
        let mut state = self.state.lock().await;
        if !state.registry.contains_key(&id) {
            debug!(consumer_id = %id, "connect from unregistered consumer ignored");
            return;
        }
        state.exit_backoff.reset();
        state.active = Some(id.clone());

        let losers: Vec<ConsumerId> = state
            .registry
            .keys()
            .filter(|other| **other != id)
            .cloned()
            .collect();
        for loser in &losers {
            if let Some(handle) = state.registry.remove(loser) {
                let exit = handle.kill().await;
                debug!(consumer_id = %loser, exit = ?exit, "replaced consumer killed");
            }
        }
        info!(consumer_id = %id, replaced = losers.len(), "consumer active");
    }

    async fn handle_data(&self, payload: Bytes) {
        if let Err(e) = self.sink.handle(payload).await {
            error!(sink = self.sink.name(), error = %e, "data sink failed");
        }
    }

    async fn handle_exit(self: &Arc<Self>, id: ConsumerId) {
        let (handle, restart) = {
            let mut state = self.state.lock().await;
            let Some(handle) = state.registry.remove(&id) else {
                debug!(consumer_id = %id, "exit from unregistered consumer ignored");
                return;
            };
            let delay = state.exit_backoff.increment();
            let was_active = state.active.as_ref() == Some(&id);
            if was_active {
                state.active = None;
            }
            let restart = was_active || state.registry.is_empty();
            (handle, restart.then_some(delay))
        };
        handle.kill().await;

        match restart {
            Some(delay) => self.schedule_start(delay),
            None => info!(consumer_id = %id, "standby consumer exited"),
        }
    }

    fn schedule_start(self: &Arc<Self>, delay: Duration) {
        counter!("relay_manager_restarts_scheduled_total").increment(1);
        warn!(
            delay_ms = delay.as_millis() as u64,
            "consumer exited, scheduling replacement"
        );

        let inner = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut delay = delay;
            loop {
                tokio::select! {
                    _ = shutdown.wait_for(|stop| *stop) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                match inner.start_a_consumer().await {
                    Ok(_) | Err(ManagerError::ShutDown) => return,
                    Err(e) => {
                        delay = inner.state.lock().await.exit_backoff.increment();
                        counter!("relay_manager_restarts_scheduled_total").increment(1);
                        error!(
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "scheduled consumer start failed, retrying"
                        );
                    }
                }
            }
        });
    }
}

#[instrument(name = "manager_worker_loop", skip(inner))]
async fn worker_loop<P, S, F>(inner: Arc<Inner<P, S, F>>, worker: usize)
where
    P: ParameterProvider + Sync + 'static,
    S: DataSink + Sync + 'static,
    F: DataFramer + Clone + Send + Sync + 'static,
{
    debug!(worker, "manager worker started");
    while let Some(event) = inner.notifier.next().await {
        inner.dispatch(event).await;
    }
    debug!(worker, "manager worker stopped");
}
