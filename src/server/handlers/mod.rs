//! HTTP 请求处理器
//!
//! 客户端携带的 `Authorization` 头只被接受，不做校验也不转发给后端。

pub mod chat;
pub mod embeddings;
pub mod models;
