//! 后端调用层
//!
//! 只负责与后端的 HTTP 通信和错误分类，协议转换在 translator 层完成。
//!
//! ```text
//! backends/
//! ├── traits.rs   # ChatBackend trait 与 BackendError
//! ├── client.rs   # reqwest 客户端工厂
//! └── http.rs     # HTTP 后端实现
//! ```

pub mod client;
pub mod http;
pub mod traits;

pub use client::{ClientBuildError, HttpClientFactory};
pub use http::HttpBackend;
pub use traits::{BackendChunkStream, BackendError, BackendErrorKind, BackendResult, ChatBackend};
