//! 批处理器指标
//!
//! 原子计数器供运行摘要读取，同时以 `ready_list` 为标签写入 Prometheus。

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

/// 单个批处理器的计数
#[derive(Debug)]
pub struct ProcessorMetrics {
    /// 指标标签
    ready_list: String,
    /// 数据队列被改名为就绪队列的次数
    batches_claimed: AtomicU64,
    /// 收到 2xx 后提交的批次
    batches_posted: AtomicU64,
    /// 失败的 POST
    batch_failures: AtomicU64,
    /// 已投递条目
    items_posted: AtomicU64,
    /// 被变换过滤掉的条目
    items_dropped: AtomicU64,
}

impl ProcessorMetrics {
    /// Create new metrics instance
    pub fn new(ready_list: impl Into<String>) -> Self {
        Self {
            ready_list: ready_list.into(),
            batches_claimed: AtomicU64::new(0),
            batches_posted: AtomicU64::new(0),
            batch_failures: AtomicU64::new(0),
            items_posted: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_claimed(&self) {
        self.batches_claimed.fetch_add(1, Ordering::Relaxed);
        counter!("relay_batches_claimed_total", "ready_list" => self.ready_list.clone())
            .increment(1);
    }

    pub fn record_posted(&self, items: usize) {
        self.batches_posted.fetch_add(1, Ordering::Relaxed);
        self.items_posted.fetch_add(items as u64, Ordering::Relaxed);
        counter!("relay_batches_posted_total", "ready_list" => self.ready_list.clone())
            .increment(1);
        counter!("relay_items_posted_total", "ready_list" => self.ready_list.clone())
            .increment(items as u64);
    }

    pub fn record_failure(&self) {
        self.batch_failures.fetch_add(1, Ordering::Relaxed);
        counter!("relay_batch_failures_total", "ready_list" => self.ready_list.clone())
            .increment(1);
    }

    pub fn record_dropped(&self, items: usize) {
        if items == 0 {
            return;
        }
        self.items_dropped.fetch_add(items as u64, Ordering::Relaxed);
        counter!("relay_items_dropped_total", "ready_list" => self.ready_list.clone())
            .increment(items as u64);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_claimed: self.batches_claimed.load(Ordering::Relaxed),
            batches_posted: self.batches_posted.load(Ordering::Relaxed),
            batch_failures: self.batch_failures.load(Ordering::Relaxed),
            items_posted: self.items_posted.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of processor metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches_claimed: u64,
    pub batches_posted: u64,
    pub batch_failures: u64,
    pub items_posted: u64,
    pub items_dropped: u64,
}
