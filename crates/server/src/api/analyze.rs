//! Analysis submission and task status endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use zoll_scheduler::{AdmissionOutcome, SubmitRequest, Task, TaskId, TaskStatus};

use crate::state::AppState;

use super::{caller_id, error_response, respond};

fn default_priority() -> i32 {
    0
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Package URL, e.g. `pkg:npm/left-pad@1.3.0`.
    pub package_url: String,
    /// Higher runs sooner; negative is allowed. Defaults to 0.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Client retry token, unique per caller.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeAccepted {
    task_id: TaskId,
    status: TaskStatus,
    package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_position: Option<usize>,
}

#[derive(Debug, Serialize)]
struct AnalyzeCached {
    cached: bool,
    report_reference: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/analyze",
    tag = "Analysis",
    request_body = AnalyzeRequest,
    responses(
        (status = 202, description = "Task queued", body = Object),
        (status = 200, description = "Existing task or cached report", body = Object),
        (status = 400, description = "Malformed package URL", body = Object)
    )
)]
pub async fn analyze_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> Response {
    let submitter = caller_id(&headers);
    let outcome = state.scheduler.submit(SubmitRequest {
        package_url: request.package_url,
        submitter,
        priority: request.priority,
        idempotency_key: request.idempotency_key,
    });

    match outcome {
        Ok(AdmissionOutcome::Queued(task)) => {
            respond(StatusCode::ACCEPTED, accepted(&state, &task))
        }
        Ok(AdmissionOutcome::Existing(task)) => respond(StatusCode::OK, accepted(&state, &task)),
        Ok(AdmissionOutcome::CachedReport { reference }) => respond(
            StatusCode::OK,
            AnalyzeCached {
                cached: true,
                report_reference: reference,
            },
        ),
        Err(e) => error_response(&e),
    }
}

fn accepted(state: &AppState, task: &Task) -> AnalyzeAccepted {
    let queue_position = state
        .scheduler
        .snapshot(task.id)
        .ok()
        .and_then(|s| s.queue_position);
    AnalyzeAccepted {
        task_id: task.id,
        status: task.status,
        package: task.coordinate.to_string(),
        queue_position,
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/analyze/{id}",
    tag = "Analysis",
    params(("id" = u64, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task snapshot with derived timing fields", body = Object),
        (status = 404, description = "Unknown task id", body = Object)
    )
)]
pub async fn analyze_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TaskId>,
) -> Response {
    match state.scheduler.snapshot(id) {
        Ok(snapshot) => respond(StatusCode::OK, snapshot),
        Err(e) => error_response(&e),
    }
}
