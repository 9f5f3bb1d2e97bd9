use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;

/// Occupancy of a live session; 404 once the last peer has left.
pub async fn session_info_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.hub.session_info(&name).await {
        Some(info) => (StatusCode::OK, Json(info)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("session not found")),
        )
            .into_response(),
    }
}
