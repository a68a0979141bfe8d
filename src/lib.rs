//! bridgecast: OpenAI 兼容网关
//!
//! 接收 OpenAI 格式的 chat / embeddings 请求，转换为后端的私有协议，
//! 以认证码换取的令牌调用后端，再把响应转换回 OpenAI 格式。

pub mod backends;
pub mod config;
pub mod logger;
pub mod models;
pub mod processor;
pub mod providers;
pub mod resilience;
pub mod server;
pub mod server_utils;
pub mod stream;
pub mod telemetry;
pub mod translator;

#[cfg(test)]
mod testing;

pub use config::GatewayConfig;
pub use processor::{GatewayError, RequestProcessor};
