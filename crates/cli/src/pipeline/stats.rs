//! 运行统计

use std::time::Duration;

use observability::ListDepthTracker;

/// 一次运行的统计
#[derive(Debug, Default)]
pub struct RelayStats {
    /// 总耗时
    pub duration: Duration,

    /// 本进程是否运行了 Consumer Manager
    pub consuming: bool,

    /// Consumer counters, when consuming
    pub ingestion: Option<ingestion::MetricsSnapshot>,

    /// Counters per processor, keyed by ready list id
    pub processors: Vec<(String, dispatcher::MetricsSnapshot)>,

    /// Sampled list depths
    pub depths: ListDepthTracker,
}

impl RelayStats {
    /// 每秒从上游收到的条目数
    pub fn items_per_sec(&self) -> f64 {
        let items = self.ingestion.as_ref().map_or(0, |s| s.items_received);
        if self.duration.as_secs_f64() > 0.0 {
            items as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Items posted downstream across all processors
    pub fn items_posted(&self) -> u64 {
        self.processors.iter().map(|(_, s)| s.items_posted).sum()
    }

    /// 打印摘要
    pub fn print_summary(&self) {
        println!("\n=== Relay Statistics ===\n");
        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Items/s received: {:.2}", self.items_per_sec());
        println!("   └─ Items posted: {}", self.items_posted());

        if let Some(ref ingestion) = self.ingestion {
            println!("\nUpstream");
            println!("   ├─ Connects: {}", ingestion.connects);
            println!(
                "   ├─ Retries: {} tcp, {} http",
                ingestion.tcp_retries, ingestion.http_retries
            );
            println!("   ├─ Rejections: {}", ingestion.rejections);
            println!("   ├─ Exits: {}", ingestion.exits);
            println!(
                "   └─ Received: {} items, {} bytes",
                ingestion.items_received, ingestion.bytes_received
            );
        }

        for (ready_list, processor) in &self.processors {
            println!("\nProcessor '{}'", ready_list);
            println!("   ├─ Batches claimed: {}", processor.batches_claimed);
            println!("   ├─ Batches posted: {}", processor.batches_posted);
            println!("   ├─ Failed posts: {}", processor.batch_failures);
            println!("   ├─ Items posted: {}", processor.items_posted);
            println!("   └─ Items dropped: {}", processor.items_dropped);
        }

        let lists: Vec<&str> = self.depths.lists().collect();
        if !lists.is_empty() {
            println!("\nList Depths");
            for (i, list) in lists.iter().enumerate() {
                let prefix = if i == lists.len() - 1 { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, list, self.depths.summary(list));
            }
        }

        println!();
    }
}
