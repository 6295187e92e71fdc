//! 流错误类型

use std::time::Duration;

use thiserror::Error;

/// 消费上游数据流时的错误
#[derive(Debug, Error)]
pub enum StreamError {
    /// 读完之前对端关闭了连接
    #[error("connection closed by server")]
    ConnectionClosed,

    /// chunk 长度行不是十六进制
    #[error("lost chunk sync: {line:?}")]
    LostChunkSync {
        /// 出错的行
        line: String,
    },

    /// 行长度超出上限
    #[error("line longer than {limit} bytes")]
    LineTooLong {
        /// Maximum accepted line length
        limit: usize,
    },

    /// 读写或连接超时
    #[error("socket timed out after {0:?}")]
    Timeout(Duration),

    /// 状态行无法解析
    #[error("malformed status line: {0:?}")]
    MalformedStatus(String),

    /// 声明的条目长度超过配置上限
    #[error("item of {len} bytes exceeds limit of {max} bytes")]
    ItemTooLarge {
        /// 声明长度
        len: usize,
        /// 配置上限
        max: usize,
    },

    /// 事件通知器已无接收方
    #[error("event notifier closed")]
    NotifierClosed,

    /// socket 层 IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// 网络与分帧错误按 TCP/IP 退避重试；
    /// 其他错误结束 consumer 并上报 `Exit` 事件。
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StreamError::ConnectionClosed
                | StreamError::LostChunkSync { .. }
                | StreamError::LineTooLong { .. }
                | StreamError::Timeout(_)
                | StreamError::MalformedStatus(_)
                | StreamError::Io(_)
        )
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, StreamError>;
