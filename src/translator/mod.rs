//! 协议转换层
//!
//! OpenAI 前端协议与后端协议之间的请求和响应格式转换。
//!
//! ```text
//! translator/
//! ├── traits.rs     # 转换器 trait 与错误类型
//! ├── request.rs    # OpenAI → 后端请求（chat / embeddings）
//! └── response.rs   # 后端响应 → OpenAI 响应、流事件
//! ```
//!
//! 请求转换是纯函数；响应转换只依赖本地的 token 估算器。

pub mod request;
pub mod response;
pub mod traits;

pub use request::{ChatRequestTranslator, EmbeddingRequestTranslator};
pub use response::ResponseTranslator;
pub use traits::{RequestTranslator, TranslateError, TranslateErrorKind};
