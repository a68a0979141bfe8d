//! 流式数据解析器
//!
//! 解析后端的行分帧流式响应。

pub mod backend_lines;

pub use backend_lines::{BackendFrame, BackendLineParser, ParserState};
