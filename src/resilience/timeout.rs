//! 超时控制实现
//!
//! 所有出站调用都有上限：令牌换取、非流式调用、流式建立以及流式每次读取。

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// 超时配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 非流式调用及流式建立的超时（毫秒）
    pub request_timeout_ms: u64,
    /// 令牌端点超时（毫秒）
    pub token_timeout_ms: u64,
    /// 流式响应两个数据块之间的最大间隔（毫秒）
    pub stream_idle_timeout_ms: u64,
    /// TCP 连接超时（毫秒）
    pub connect_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            token_timeout_ms: 10_000,
            stream_idle_timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_millis(self.token_timeout_ms)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// 超时错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeoutError {
    #[error("请求超时: 配置 {timeout_ms}ms, 已耗时 {elapsed_ms}ms")]
    RequestTimeout { timeout_ms: u64, elapsed_ms: u64 },

    #[error("流式响应空闲超时: 配置 {timeout_ms}ms")]
    StreamIdleTimeout { timeout_ms: u64 },
}

/// 带超时执行异步操作
pub async fn with_timeout<F, T>(limit: Duration, operation: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TimeoutError::RequestTimeout {
            timeout_ms: limit.as_millis() as u64,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
}

/// 带空闲超时读取流的下一项
pub async fn next_with_idle_timeout<S>(
    limit: Duration,
    stream: &mut S,
) -> Result<Option<S::Item>, TimeoutError>
where
    S: futures::Stream + Unpin,
{
    use futures::StreamExt;

    tokio::time::timeout(limit, stream.next())
        .await
        .map_err(|_| TimeoutError::StreamIdleTimeout {
            timeout_ms: limit.as_millis() as u64,
        })
}
