//! `POST /v1/chat/completions`

use crate::models::openai::ChatCompletionRequest;
use crate::server::AppState;
use crate::server_utils::{invalid_body, sse_response};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};

pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection).into_response(),
    };

    tracing::info!(
        "[CHAT] model={} messages={} stream={}",
        request.model,
        request.messages.len(),
        request.stream
    );

    if request.stream {
        match state.processor.chat_completion_stream(request).await {
            Ok(stream) => sse_response(stream),
            Err(e) => e.into_response(),
        }
    } else {
        match state.processor.chat_completion(request).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => e.into_response(),
        }
    }
}
