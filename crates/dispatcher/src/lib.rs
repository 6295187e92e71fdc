//! # Dispatcher
//!
//! 中继的下游：从共享数据队列取出批次，经 HTTP 投递，至少一次语义。
//!
//! ## 职责
//! - 等待通知，用原子 rename 认领满批
//! - 可选的逐条变换（如 status 精简）
//! - POST 批次，收到 2xx 之前保留就绪队列
//! - 失败后按翻倍退避重试
//!
//! ## 使用示例
//!
//! ```ignore
//! use dispatcher::{BatchQueueProcessor, HttpPoster};
//!
//! let poster = HttpPoster::new(&processor_config)?;
//! let processor = BatchQueueProcessor::new(store, poster, &keys, &processor_config);
//! tokio::spawn(processor.run(shutdown_rx));
//! ```

pub mod error;
pub mod metrics;
pub mod poster;
pub mod processor;
pub mod transforms;

pub use contracts::ItemTransform;
pub use error::{DispatcherError, Result};
pub use metrics::{MetricsSnapshot, ProcessorMetrics};
pub use poster::{form_body, BatchPoster, HttpPoster, LocalBatchPoster};
pub use processor::{BatchQueueProcessor, StepOutcome};
pub use transforms::StatusReducer;
