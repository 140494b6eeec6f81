//! Timeout visibility and the manual sweep trigger.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::state::AppState;

use super::respond;

#[utoipa::path(
    get,
    path = "/api/v1/timeouts",
    tag = "Timeouts",
    responses(
        (status = 200, description = "Remaining time budget of the running task", body = Object)
    )
)]
pub async fn timeout_status(State(state): State<Arc<AppState>>) -> Response {
    respond(StatusCode::OK, state.scheduler.timeout_overview())
}

#[utoipa::path(
    post,
    path = "/api/v1/timeouts/check",
    tag = "Timeouts",
    responses(
        (status = 200, description = "Sweep executed; returns what it did", body = Object)
    )
)]
pub async fn timeout_check(State(state): State<Arc<AppState>>) -> Response {
    let outcome = state.scheduler.force_sweep().await;
    respond(StatusCode::OK, outcome)
}
