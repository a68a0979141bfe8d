//! `POST /v1/embeddings`

use crate::models::openai::EmbeddingRequest;
use crate::server::AppState;
use crate::server_utils::invalid_body;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};

pub async fn embeddings(
    State(state): State<AppState>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_body(rejection).into_response(),
    };

    match state.processor.embeddings(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}
