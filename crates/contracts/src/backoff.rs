//! 重试延迟策略
//!
//! - [`LinearBackoff`]：TCP/IP 失败与 consumer 退出，`min(d + min, max)`，重置为 0
//! - [`HttpBackoff`]：上游 5xx，`min(min + floor(min * d / 5), max)`，重置为 0
//! - [`DoublingBackoff`]：批次投递，从 `min` 开始翻倍，重置为 `min`

use std::time::Duration;

use crate::BackoffConfig;

/// 线性退避：每次失败延迟加 `min`
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    min: f64,
    max: f64,
    current: f64,
}

impl LinearBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            min: config.min_secs,
            max: config.max_secs,
            current: 0.0,
        }
    }

    /// Register a failure and return the delay to sleep
    pub fn increment(&mut self) -> Duration {
        self.current = (self.current + self.min).min(self.max);
        self.current()
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs_f64(self.current)
    }

    /// Delay has reached the ceiling
    pub fn is_saturated(&self) -> bool {
        self.current >= self.max
    }
}

/// HTTP backoff for retryable upstream statuses.
///
/// From zero with min=10, max=240 the delays are 10, 30, 70, 150, 240, 240.
#[derive(Debug, Clone)]
pub struct HttpBackoff {
    min: f64,
    max: f64,
    current: f64,
}

impl HttpBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            min: config.min_secs,
            max: config.max_secs,
            current: 0.0,
        }
    }

    /// Register a failure and return the delay to sleep
    pub fn increment(&mut self) -> Duration {
        let grown = self.min + (self.min * self.current / 5.0).floor();
        self.current = grown.min(self.max);
        self.current()
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs_f64(self.current)
    }

    pub fn is_saturated(&self) -> bool {
        self.current >= self.max
    }
}

/// 批处理器使用的翻倍退避
#[derive(Debug, Clone)]
pub struct DoublingBackoff {
    min: f64,
    max: f64,
    current: f64,
}

impl DoublingBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            min: config.min_secs,
            max: config.max_secs,
            current: config.min_secs,
        }
    }

    /// Register a failure and return the delay to sleep
    pub fn increment(&mut self) -> Duration {
        self.current = (self.current * 2.0).min(self.max);
        self.current()
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs_f64(self.current)
    }

    pub fn is_saturated(&self) -> bool {
        self.current >= self.max
    }
}
