//! HTTP 客户端工厂
//!
//! 令牌端点和后端调用共用同一个连接池。

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("客户端构建错误: {0}")]
    Build(#[from] reqwest::Error),
}

/// 客户端工厂
///
/// 客户端只设置连接超时；请求总超时由调用方按请求设置，
/// 否则长时间的流式响应会被整体超时截断。
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    verify_tls: bool,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            verify_tls: true,
        }
    }
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn build(&self) -> Result<Client, ClientBuildError> {
        if !self.verify_tls {
            tracing::warn!("[HTTP] 已关闭后端 TLS 证书校验");
        }
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()?;
        Ok(client)
    }
}
