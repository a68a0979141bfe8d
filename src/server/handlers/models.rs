//! `GET /v1/models`, `GET /v1/models/:id`

use crate::processor::GatewayError;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};

pub async fn list_models(State(state): State<AppState>) -> Response {
    Json(state.processor.catalog().list()).into_response()
}

pub async fn get_model(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.processor.catalog().get(&id) {
        Some(model) => Json(model.clone()).into_response(),
        None => GatewayError::ModelNotFound(id).into_response(),
    }
}
