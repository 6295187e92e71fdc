//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge};

/// Counters shared by every consumer of one manager
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Successful connects (status 200)
    pub connects: AtomicU64,

    /// Reconnects after TCP/IP level failures
    pub tcp_retries: AtomicU64,

    /// Reconnects after status > 500
    pub http_retries: AtomicU64,

    /// Consumers stopped by a non-retryable status
    pub rejections: AtomicU64,

    /// Consumers that reported `Exit`
    pub exits: AtomicU64,

    /// Items received
    pub items_received: AtomicU64,

    /// Payload bytes received
    pub bytes_received: AtomicU64,

    /// Delay chosen by the most recent retry, in milliseconds
    pub last_retry_delay_ms: AtomicU64,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        counter!("relay_consumer_connects_total").increment(1);
    }

    pub fn record_tcp_retry(&self, delay: Duration) {
        self.tcp_retries.fetch_add(1, Ordering::Relaxed);
        self.record_retry_delay("tcp", delay);
        counter!("relay_consumer_retries_total", "kind" => "tcp").increment(1);
    }

    pub fn record_http_retry(&self, status: u16, delay: Duration) {
        self.http_retries.fetch_add(1, Ordering::Relaxed);
        self.record_retry_delay("http", delay);
        counter!(
            "relay_consumer_retries_total",
            "kind" => "http",
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn record_rejection(&self, status: u16) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        counter!("relay_consumer_rejections_total", "status" => status.to_string()).increment(1);
    }

    pub fn record_exit(&self) {
        self.exits.fetch_add(1, Ordering::Relaxed);
        counter!("relay_consumer_exits_total").increment(1);
    }

    fn record_retry_delay(&self, kind: &'static str, delay: Duration) {
        self.last_retry_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
        gauge!("relay_consumer_retry_delay_seconds", "kind" => kind).set(delay.as_secs_f64());
    }

    /// Record one received item of `len` bytes
    pub fn record_item(&self, len: usize) {
        self.items_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
        counter!("relay_items_received_total").increment(1);
        counter!("relay_bytes_received_total").increment(len as u64);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            tcp_retries: self.tcp_retries.load(Ordering::Relaxed),
            http_retries: self.http_retries.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            exits: self.exits.load(Ordering::Relaxed),
            items_received: self.items_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            last_retry_delay_ms: self.last_retry_delay_ms.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connects: u64,
    pub tcp_retries: u64,
    pub http_retries: u64,
    pub rejections: u64,
    pub exits: u64,
    pub items_received: u64,
    pub bytes_received: u64,
    pub last_retry_delay_ms: u64,
}
