//! 流式处理层
//!
//! ```text
//! 后端行分帧流 ──> [BackendLineParser] ──> BackendEnvelope
//!     ──> [ResponseTranslator] ──> StreamEvent ──> [OpenAiSseGenerator] ──> OpenAI SSE
//! ```
//!
//! - `events`: 统一的流事件类型 (`StreamEvent`)
//! - `parsers`: 后端行分帧解析器
//! - `generators`: OpenAI SSE 生成器
//! - `relay`: 驱动一次流式调用的状态机
//! - `simulated`: 后端无流式端点时的模拟流式

pub mod events;
pub mod generators;
pub mod parsers;
pub mod relay;
pub mod simulated;

pub use events::{StopReason, StreamEvent};
pub use generators::{OpenAiSseGenerator, DONE_EVENT};
pub use parsers::{BackendFrame, BackendLineParser, ParserState};
pub use relay::{RelayState, SseStream, StreamRelay};
