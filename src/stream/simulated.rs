//! 模拟流式
//!
//! 后端没有流式端点时，先做一次非流式调用，再把完整响应切成若干文本片段，
//! 作为普通的后端流交给 `StreamRelay`。切分按字符进行，不会截断 UTF-8 多字节字符。

use crate::backends::{BackendChunkStream, BackendError, BackendResult};
use crate::models::backend::{BackendContent, BackendData, BackendEnvelope};

/// 把文本切成最多 `pieces` 段，拼接后与原文一致
pub fn split_content(text: &str, pieces: usize) -> Vec<String> {
    let total = text.chars().count();
    if total == 0 {
        return Vec::new();
    }
    let pieces = pieces.clamp(1, total);
    let per_piece = total.div_ceil(pieces);

    let mut out = Vec::with_capacity(pieces);
    let mut current = String::new();
    for (i, ch) in text.chars().enumerate() {
        current.push(ch);
        if (i + 1) % per_piece == 0 {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// 完整响应 → 后端流：文本片段、工具调用、结束块
pub fn into_chunk_stream(
    envelope: BackendEnvelope,
    pieces: usize,
) -> BackendResult<BackendChunkStream> {
    let content = envelope.content().cloned().ok_or_else(|| {
        BackendError::malformed("后端响应缺少 data.content")
            .with_body(serde_json::to_string(&envelope).unwrap_or_default())
    })?;

    let mut chunks: Vec<BackendResult<BackendEnvelope>> = split_content(
        content.content.as_deref().unwrap_or_default(),
        pieces,
    )
    .into_iter()
    .map(|piece| Ok(BackendEnvelope::text_fragment(piece)))
    .collect();

    if let Some(calls) = content.tool_calls.filter(|c| !c.is_empty()) {
        chunks.push(Ok(BackendEnvelope {
            data: Some(BackendData {
                content: Some(BackendContent {
                    content: None,
                    tool_calls: Some(calls),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }));
    }

    let mut last = BackendEnvelope::finish(envelope.finish_reason().unwrap_or("stop"));
    if let Some(data) = last.data.as_mut() {
        data.usage = envelope.usage();
    }
    chunks.push(Ok(last));

    Ok(Box::pin(futures::stream::iter(chunks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_split_preserves_text() {
        let text = "Hello, 世界! 🦀 streaming";
        for n in 1..10 {
            let pieces = split_content(text, n);
            assert!(pieces.len() <= n);
            assert_eq!(pieces.concat(), text);
        }
    }

    #[test]
    fn test_split_short_text() {
        assert_eq!(split_content("ab", 5), vec!["a", "b"]);
        assert!(split_content("", 3).is_empty());
        assert_eq!(split_content("abc", 0), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_into_chunk_stream() {
        let envelope: BackendEnvelope = serde_json::from_value(serde_json::json!({
            "data": {
                "content": {"content": "abcdef", "tool_calls": [{"name": "f", "arguments": "{}"}]},
                "finish_reason": "tool_calls"
            }
        }))
        .unwrap();

        let chunks: Vec<_> = into_chunk_stream(envelope, 3)
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], BackendEnvelope::text_fragment("ab"));
        assert!(chunks[3].content().unwrap().tool_calls.is_some());
        assert_eq!(chunks[4].finish_reason(), Some("tool_calls"));
    }

    #[test]
    fn test_missing_content_rejected() {
        let result = into_chunk_stream(BackendEnvelope::default(), 3);
        assert!(result.is_err());
    }
}
