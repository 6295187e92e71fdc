//! Relay orchestrator - wires the list store, the consumer manager and the
//! batch processors of one process.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::Bytes;
use contracts::{ListStore, RelayBlueprint, StoreKeys};
use dispatcher::{BatchQueueProcessor, HttpPoster, ProcessorMetrics};
use ingestion::LengthDelimitedFramer;
use manager::{seed_parameters, ConsumerManager, StoreDataSink, StoreParameters};
use observability::{record_list_depth, ListDepthTracker};
use store::AnyStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::RelayStats;

type RelayManager =
    ConsumerManager<StoreParameters<AnyStore>, StoreDataSink<AnyStore>, LengthDelimitedFramer>;

/// How the consumer manager runs in this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    /// No manager
    Off,
    /// Manager up, first consumer waits for a reload
    ServeOnly,
    /// Manager up, consumer started when `start_on_launch` is set
    Start,
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The relay blueprint, overrides applied
    pub blueprint: RelayBlueprint,

    /// File the blueprint came from; re-read on SIGHUP
    pub config_path: PathBuf,

    /// Consumer manager mode
    pub consume: ConsumeMode,

    /// Ready lists whose processors run in this process
    pub ready_lists: Vec<String>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Interval between list depth samples
    pub sample_interval: Duration,
}

struct ProcessorTask {
    ready_list_id: String,
    metrics: Arc<ProcessorMetrics>,
    task: JoinHandle<()>,
}

/// Main relay orchestrator
pub struct Relay {
    config: RelayConfig,
}

impl Relay {
    /// Create a new relay with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, then stop every component
    pub async fn run<F>(self, shutdown: F) -> Result<RelayStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let store = store::open(&blueprint.store)
            .await
            .context("Failed to open list store")?;
        let keys = blueprint.store_keys();
        info!(kind = ?store.kind(), namespace = %keys.namespace(), "List store opened");

        let (stop_tx, stop_rx) = watch::channel(false);
        let processors = self.start_processors(&store, &keys, &stop_rx)?;
        let manager = self.start_manager(&store, &keys).await?;

        let mut watched = vec![keys.data()];
        watched.extend(self.config.ready_lists.iter().map(|id| keys.ready(id)));

        let mut stats = RelayStats {
            consuming: manager.is_some(),
            ..Default::default()
        };
        let mut ticker =
            tokio::time::interval(self.config.sample_interval.max(Duration::from_millis(100)));
        let mut hangup = HangupSignal::install();
        tokio::pin!(shutdown);

        info!(
            consuming = stats.consuming,
            processors = processors.len(),
            "Relay running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping relay...");
                    break;
                }
                _ = ticker.tick() => {
                    sample_depths(&store, &watched, &mut stats.depths).await;
                }
                _ = hangup.recv(), if manager.is_some() => {
                    if let Some(ref manager) = manager {
                        self.reload(manager, &store, &keys).await;
                    }
                }
            }
        }

        // Shutdown
        info!("Shutting down relay...");
        stop_tx.send_replace(true);

        if let Some(manager) = manager {
            let metrics = Arc::clone(manager.metrics());
            manager.shutdown().await;
            stats.ingestion = Some(metrics.snapshot());
        }

        for processor in processors {
            if tokio::time::timeout(Duration::from_secs(5), processor.task)
                .await
                .is_err()
            {
                warn!(ready_list = %processor.ready_list_id, "Processor did not stop in time");
            }
            stats
                .processors
                .push((processor.ready_list_id, processor.metrics.snapshot()));
        }

        sample_depths(&store, &watched, &mut stats.depths).await;
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            items_per_sec = format!("{:.2}", stats.items_per_sec()),
            "Relay shutdown complete"
        );

        Ok(stats)
    }

    fn start_processors(
        &self,
        store: &AnyStore,
        keys: &StoreKeys,
        stop_rx: &watch::Receiver<bool>,
    ) -> Result<Vec<ProcessorTask>> {
        let blueprint = &self.config.blueprint;

        self.config
            .ready_lists
            .iter()
            .map(|ready| {
                let config = blueprint.processor(ready).with_context(|| {
                    format!("No processor configured for ready list '{ready}'")
                })?;
                let poster = HttpPoster::new(config)
                    .with_context(|| format!("Failed to build HTTP client for '{ready}'"))?;
                let processor = BatchQueueProcessor::new(store.clone(), poster, keys, config);

                info!(
                    ready_list = %ready,
                    url = %config.url,
                    num_items = config.num_items,
                    transform = ?config.transform,
                    "Batch processor started"
                );

                Ok(ProcessorTask {
                    ready_list_id: ready.clone(),
                    metrics: Arc::clone(processor.metrics()),
                    task: tokio::spawn(processor.run(stop_rx.clone())),
                })
            })
            .collect()
    }

    async fn start_manager(&self, store: &AnyStore, keys: &StoreKeys) -> Result<Option<RelayManager>> {
        if self.config.consume == ConsumeMode::Off {
            return Ok(None);
        }
        let blueprint = &self.config.blueprint;

        seed_parameters(store, keys, &blueprint.manager.parameters)
            .await
            .context("Failed to seed filter parameters")?;

        let params = StoreParameters::new(
            store.clone(),
            keys.clone(),
            blueprint.manager.parameters.keys().cloned(),
        );
        let sink = StoreDataSink::new(store.clone(), keys);
        let framer = LengthDelimitedFramer::new(blueprint.upstream.max_item_bytes);
        let manager = ConsumerManager::new(
            blueprint.upstream.clone(),
            &blueprint.manager,
            params,
            sink,
            framer,
        );

        if self.config.consume == ConsumeMode::Start && blueprint.manager.start_on_launch {
            let id = manager
                .start_a_consumer()
                .await
                .context("Failed to start consumer")?;
            info!(consumer_id = %id, "Consumer started");
        } else {
            info!("Manager serving without a consumer; send SIGHUP to start one");
        }

        Ok(Some(manager))
    }

    /// Re-read filter parameters from the config file and hot restart
    async fn reload(&self, manager: &RelayManager, store: &AnyStore, keys: &StoreKeys) {
        info!(config = %self.config.config_path.display(), "Reloading filter parameters");

        match write_parameters(&self.config.config_path, store, keys).await {
            Ok(written) => info!(written, "Filter parameters updated"),
            Err(e) => {
                error!(error = %e, "Reload failed, keeping current consumer");
                return;
            }
        }

        match manager.start_a_consumer().await {
            Ok(id) => info!(consumer_id = %id, "Replacement consumer started"),
            Err(e) => error!(error = %e, "Failed to start replacement consumer"),
        }
    }
}

/// Overwrite the stored filter parameters with the ones in `path`.
///
/// Only names present at startup are read by consumers.
async fn write_parameters(path: &Path, store: &AnyStore, keys: &StoreKeys) -> Result<usize> {
    let blueprint = config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    for (name, value) in &blueprint.manager.parameters {
        store
            .set(&keys.param(name), Bytes::from(value.clone()))
            .await
            .with_context(|| format!("Failed to write parameter '{name}'"))?;
    }
    Ok(blueprint.manager.parameters.len())
}

async fn sample_depths(store: &AnyStore, lists: &[String], depths: &mut ListDepthTracker) {
    for list in lists {
        match store.llen(list).await {
            Ok(depth) => {
                record_list_depth(list, depth);
                depths.update(list, depth);
            }
            Err(e) => warn!(list = %list, error = %e, "Failed to sample list depth"),
        }
    }
}

/// SIGHUP listener; never fires where unsupported
struct HangupSignal {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl HangupSignal {
    #[cfg(unix)]
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        let signal = signal(SignalKind::hangup())
            .map_err(|e| warn!(error = %e, "SIGHUP reload unavailable"))
            .ok();
        Self { signal }
    }

    #[cfg(not(unix))]
    fn install() -> Self {
        Self {}
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(ref mut signal) = self.signal {
            if signal.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
