//! 中继指标
//!
//! 全工作区共用的指标名称、列表深度采样，以及运行摘要用的在线统计。

use std::collections::BTreeMap;

use metrics::{describe_counter, describe_gauge, gauge};

/// 登记所有中继指标的说明
pub fn describe_metrics() {
    describe_counter!(
        "relay_consumer_connects_total",
        "Upstream connections that reached streaming"
    );
    describe_counter!(
        "relay_consumer_retries_total",
        "Upstream reconnects, labelled by kind (tcp|http)"
    );
    describe_counter!(
        "relay_consumer_rejections_total",
        "Consumers stopped by a non-retryable status"
    );
    describe_counter!(
        "relay_consumer_exits_total",
        "Consumers that terminated unexpectedly"
    );
    describe_counter!("relay_items_received_total", "Items read from upstream");
    describe_counter!("relay_bytes_received_total", "Item bytes read from upstream");
    describe_counter!(
        "relay_manager_restarts_scheduled_total",
        "Self-healing consumer restarts"
    );
    describe_counter!(
        "relay_batches_claimed_total",
        "Data lists renamed into a ready list"
    );
    describe_counter!("relay_batches_posted_total", "Batches delivered downstream");
    describe_counter!("relay_batch_failures_total", "Failed batch deliveries");
    describe_counter!("relay_items_posted_total", "Items delivered downstream");
    describe_counter!(
        "relay_items_dropped_total",
        "Items filtered out by a transform"
    );
    describe_gauge!("relay_list_depth", "Sampled length of a store list");
    describe_gauge!(
        "relay_consumer_retry_delay_seconds",
        "Delay before the latest upstream reconnect, labelled by kind"
    );
}

/// Record the sampled length of a store list
pub fn record_list_depth(list: &str, depth: usize) {
    gauge!("relay_list_depth", "list" => list.to_string()).set(depth as f64);
}

/// Per-list depth samples collected over a run
#[derive(Debug, Default)]
pub struct ListDepthTracker {
    lists: BTreeMap<String, RunningStats>,
}

impl ListDepthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample and mirror it into the gauge
    pub fn update(&mut self, list: &str, depth: usize) {
        record_list_depth(list, depth);
        self.lists
            .entry(list.to_string())
            .or_default()
            .push(depth as f64);
    }

    pub fn summary(&self, list: &str) -> StatsSummary {
        self.lists
            .get(list)
            .map(StatsSummary::from)
            .unwrap_or_default()
    }

    /// Lists with at least one sample
    pub fn lists(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_depth_tracker() {
        let mut tracker = ListDepthTracker::new();
        tracker.update("relay.data", 4);
        tracker.update("relay.data", 8);
        tracker.update("relay.data.ready", 10);

        let data = tracker.summary("relay.data");
        assert_eq!(data.count, 2);
        assert!((data.mean - 6.0).abs() < 1e-10);
        assert_eq!(
            tracker.lists().collect::<Vec<_>>(),
            vec!["relay.data", "relay.data.ready"]
        );
        assert_eq!(tracker.summary("missing").count, 0);
    }

    #[test]
    fn test_summary_display() {
        assert_eq!(StatsSummary::default().to_string(), "N/A");

        let mut stats = RunningStats::default();
        stats.push(2.0);
        stats.push(4.0);
        assert_eq!(
            StatsSummary::from(&stats).to_string(),
            "min=2, max=4, mean=3.0, std=1.4 (n=2)"
        );
    }
}
