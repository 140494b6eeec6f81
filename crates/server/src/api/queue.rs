//! Queue status endpoint. Unauthenticated read-only view.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;

use crate::state::AppState;

use super::respond;

#[utoipa::path(
    get,
    path = "/api/v1/queue",
    tag = "Queue",
    responses(
        (status = 200, description = "Running task and queued tasks in dispatch order", body = Object)
    )
)]
pub async fn queue_status(State(state): State<Arc<AppState>>) -> Response {
    respond(StatusCode::OK, state.scheduler.queue_overview())
}
