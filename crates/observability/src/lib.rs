//! # Observability
//!
//! 中继的日志与指标出口。
//!
//! - 日志：`tracing` 订阅器，格式与级别由命令行决定
//! - 指标：Prometheus 导出器，按需在 `run`/`consume`/`process` 中开启
//! - 列表深度采样见 [`metrics`]
//!
//! ```ignore
//! let config = observability::ObservabilityConfig::from_flags(quiet, verbose, LogFormat::Pretty);
//! observability::init_with_config(&config)?;
//! observability::init_metrics(9000)?;
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    describe_metrics, record_list_depth, ListDepthTracker, RunningStats, StatsSummary,
};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// 输出格式
    pub log_format: LogFormat,
    /// 默认级别 (`RUST_LOG` 未设置时使用)
    pub log_level: &'static str,
    /// 为 false 时忽略 `RUST_LOG`，`-q` 需要这样
    pub respect_env: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_level: "info",
            respect_env: true,
        }
    }
}

impl ObservabilityConfig {
    /// 由 `-q` / `-v` 计数推出级别：静默为 warn，-v 为 debug，-vv 及以上为 trace
    pub fn from_flags(quiet: bool, verbose: u8, log_format: LogFormat) -> Self {
        if quiet {
            return Self {
                log_format,
                log_level: "warn",
                respect_env: false,
            };
        }
        let log_level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        Self {
            log_format,
            log_level,
            respect_env: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.respect_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.log_level))
        } else {
            EnvFilter::new(self.log_level)
        }
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 结构化 JSON，带源码位置
    Json,
    /// 多行可读格式
    #[default]
    Pretty,
    /// 单行
    Compact,
}

/// 安装全局 tracing 订阅器，只能调用一次
pub fn init_with_config(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(
        log_format = ?config.log_format,
        log_level = config.log_level,
        "Logging initialized"
    );
    Ok(())
}

/// 在 0.0.0.0:`port` 上开启 Prometheus 导出，并登记中继指标说明
pub fn init_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    describe_metrics();
    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
