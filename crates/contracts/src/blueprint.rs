//! RelayBlueprint - Config Loader output
//!
//! Describes the whole relay: upstream feed, consumer manager, batch
//! processors and the list store they share.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::{basic_auth_header, StoreKeys, DEFAULT_NAMESPACE};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete relay blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Upstream streaming feed
    pub upstream: UpstreamConfig,

    /// Consumer manager settings
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Batch processors draining the data list
    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,

    /// List store shared by both sides
    #[serde(default)]
    pub store: StoreConfig,
}

impl RelayBlueprint {
    /// Key layout for the configured namespace
    pub fn store_keys(&self) -> StoreKeys {
        StoreKeys::new(self.store.namespace.clone())
    }

    /// Find a processor by its ready list id
    pub fn processor(&self, ready_list_id: &str) -> Option<&ProcessorConfig> {
        self.processors
            .iter()
            .find(|p| p.ready_list_id == ready_list_id)
    }
}

/// Backoff bounds in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl BackoffConfig {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }
}

/// Upstream feed connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Feed host name
    pub host: String,

    /// Feed port
    #[serde(default = "default_upstream_port")]
    pub port: u16,

    /// Request path, e.g. "/1/statuses/filter.json"
    pub path: String,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Socket read timeout; detects stalled connections
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: f64,

    /// Backoff after TCP/IP level failures
    #[serde(default = "default_tcp_backoff")]
    pub tcp_backoff: BackoffConfig,

    /// Backoff after upstream status > 500
    #[serde(default = "default_http_backoff")]
    pub http_backoff: BackoffConfig,

    /// Upper bound for one length-delimited item
    #[serde(default = "default_max_item_bytes")]
    pub max_item_bytes: usize,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    /// `Authorization` header value when credentials are configured
    pub fn authorization(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(basic_auth_header(user, pass)),
            _ => None,
        }
    }
}

fn default_upstream_port() -> u16 {
    80
}

fn default_upstream_timeout() -> f64 {
    61.0
}

fn default_tcp_backoff() -> BackoffConfig {
    BackoffConfig::new(0.25, 16.0)
}

fn default_http_backoff() -> BackoffConfig {
    BackoffConfig::new(10.0, 240.0)
}

fn default_max_item_bytes() -> usize {
    16 * 1024 * 1024
}

/// Consumer manager settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Workers draining the event notifier
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Delay before restarting after an unexpected consumer exit
    #[serde(default = "default_exit_backoff")]
    pub exit_backoff: BackoffConfig,

    /// Upstream filter parameters and their initial values.
    ///
    /// Names select the store keys read on every consumer start; values
    /// seed those keys when they are still unset.
    #[serde(default = "default_parameters")]
    pub parameters: BTreeMap<String, String>,

    /// Start a consumer as soon as the manager runs
    #[serde(default = "default_start_on_launch")]
    pub start_on_launch: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            exit_backoff: default_exit_backoff(),
            parameters: default_parameters(),
            start_on_launch: default_start_on_launch(),
        }
    }
}

fn default_num_workers() -> usize {
    10
}

fn default_exit_backoff() -> BackoffConfig {
    BackoffConfig::new(0.25, 16.0)
}

fn default_parameters() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("follow".to_string(), String::new()),
        ("track".to_string(), String::new()),
    ])
}

fn default_start_on_launch() -> bool {
    true
}

/// Batch processor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Namespaces this processor's ready list
    #[serde(default = "default_ready_list_id")]
    pub ready_list_id: String,

    /// Minimum data list length before a batch is taken
    #[serde(default = "default_num_items")]
    pub num_items: usize,

    /// Destination URL
    pub url: String,

    /// Basic auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Delay bounds between failed posts
    #[serde(default = "default_processor_backoff")]
    pub backoff: BackoffConfig,

    /// Item transform applied before posting
    #[serde(default)]
    pub transform: TransformKind,

    /// Form field carrying the items
    #[serde(default = "default_field_name")]
    pub field_name: String,

    /// Request timeout
    #[serde(default = "default_post_timeout")]
    pub timeout_secs: f64,
}

impl ProcessorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    /// `Authorization` header value when credentials are configured
    pub fn authorization(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(basic_auth_header(user, pass)),
            _ => None,
        }
    }
}

fn default_ready_list_id() -> String {
    "ready".to_string()
}

fn default_num_items() -> usize {
    10
}

fn default_processor_backoff() -> BackoffConfig {
    BackoffConfig::new(2.0, 3600.0)
}

fn default_field_name() -> String {
    "items".to_string()
}

fn default_post_timeout() -> f64 {
    30.0
}

/// Item transform selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Post items unchanged
    #[default]
    None,
    /// Reduce statuses to their relevant keys, pass notices through
    Status,
}

/// List store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend
    #[serde(default)]
    pub kind: StoreKind,

    /// Database directory (sled only)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Server URL (redis only), e.g. "redis://127.0.0.1:6379/0"
    #[serde(default)]
    pub url: Option<String>,

    /// Key prefix
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: None,
            url: None,
            namespace: default_namespace(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// In-process, lost on exit
    #[default]
    Memory,
    /// Embedded sled database; one process at a time
    Sled,
    /// Redis server, shared by every process of the relay
    Redis,
}

impl StoreKind {
    /// Whether separate processes can open the store together
    pub fn is_shared(self) -> bool {
        matches!(self, StoreKind::Redis)
    }
}
