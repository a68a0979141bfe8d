//! 后端行分帧流解析器
//!
//! 后端流式响应按行分帧，每行一个 JSON 包装对象，可带 `data:` 前缀。
//! 字节块可能在任意位置被切断，解析器负责缓冲不完整的行。

use crate::models::backend::BackendEnvelope;

/// 单行最大字节数，超过后视为格式错误并停止解析
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

const PREVIEW_BYTES: usize = 256;

/// 解析出的帧
#[derive(Debug, Clone, PartialEq)]
pub enum BackendFrame {
    /// 一个后端数据块，`raw` 为去掉 `data:` 前缀后的原始行
    Chunk { envelope: BackendEnvelope, raw: String },
    /// 结束标记 `[DONE]`
    Done,
    /// 无法解析的行
    Malformed { line: String, error: String },
}

/// 解析器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Ready,
    /// 已读到结束标记，之后的数据被忽略
    Finished,
}

#[derive(Debug)]
pub struct BackendLineParser {
    buffer: Vec<u8>,
    state: ParserState,
    max_line_bytes: usize,
}

impl Default for BackendLineParser {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: ParserState::Ready,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl BackendLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// 处理一个字节块，返回其中完整的帧
    pub fn process(&mut self, bytes: &[u8]) -> Vec<BackendFrame> {
        if self.state == ParserState::Finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = self.parse_line(&line) {
                let done = frame == BackendFrame::Done;
                frames.push(frame);
                if done {
                    self.state = ParserState::Finished;
                    self.buffer.clear();
                    return frames;
                }
            }
        }

        if self.buffer.len() > self.max_line_bytes {
            let end = PREVIEW_BYTES.min(self.buffer.len());
            let preview = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            frames.push(BackendFrame::Malformed {
                line: preview,
                error: format!("单行超过 {} 字节", self.max_line_bytes),
            });
            self.state = ParserState::Finished;
            self.buffer = Vec::new();
        }
        frames
    }

    /// 处理 EOF 时缓冲区中剩余的最后一行
    pub fn finish(&mut self) -> Vec<BackendFrame> {
        if self.state == ParserState::Finished || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.state = ParserState::Finished;
        self.parse_line(&line).into_iter().collect()
    }

    fn parse_line(&self, raw: &[u8]) -> Option<BackendFrame> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();

        // 空行、SSE 注释与 event 行
        if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
            return None;
        }

        let payload = line
            .strip_prefix("data:")
            .map(str::trim_start)
            .unwrap_or(line);

        if payload.is_empty() {
            return None;
        }
        if payload == "[DONE]" {
            return Some(BackendFrame::Done);
        }

        match serde_json::from_str::<BackendEnvelope>(payload) {
            Ok(envelope) => Some(BackendFrame::Chunk {
                envelope,
                raw: payload.to_string(),
            }),
            Err(e) => Some(BackendFrame::Malformed {
                line: payload.to_string(),
                error: e.to_string(),
            }),
        }
    }
}
