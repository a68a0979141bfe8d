//! 前端流格式生成器

pub mod openai_sse;

pub use openai_sse::{OpenAiSseGenerator, DONE_EVENT};
