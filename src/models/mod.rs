//! 数据模型
//!
//! - `openai`: 客户端侧的 OpenAI 协议结构
//! - `backend`: 后端协议结构
//! - `catalog`: `/v1/models` 静态目录

pub mod backend;
pub mod catalog;
pub mod openai;
