//! API endpoint modules and the shared response envelope.
//!
//! Every JSON response is wrapped in the same envelope:
//! `{success, data?, error?, message?, request_id}`. The `error` field
//! carries the failure taxonomy category, never an internal message.

pub mod analyze;
pub mod doc;
pub mod health;
pub mod queue;
pub mod reports;
pub mod timeouts;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use zoll_core::ZollError;

pub use analyze::{analyze_status, analyze_submit};
pub use health::health;
pub use queue::queue_status;
pub use reports::get_report;
pub use timeouts::{timeout_check, timeout_status};

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub request_id: Uuid,
}

/// Success envelope with the given status code.
pub(crate) fn respond(status: StatusCode, data: impl Serialize) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => (
            status,
            Json(Envelope {
                success: true,
                data: Some(value),
                error: None,
                message: None,
                request_id: Uuid::new_v4(),
            }),
        )
            .into_response(),
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("response serialization failed: {}", e),
        ),
    }
}

/// Failure envelope carrying a taxonomy category and a human message.
pub(crate) fn failure(status: StatusCode, category: &str, message: String) -> Response {
    (
        status,
        Json(Envelope {
            success: false,
            data: None,
            error: Some(category.to_string()),
            message: Some(message),
            request_id: Uuid::new_v4(),
        }),
    )
        .into_response()
}

/// Map a core error onto (status, taxonomy category).
pub(crate) fn error_response(err: &ZollError) -> Response {
    let (status, category) = match err {
        ZollError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        ZollError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "task_not_found"),
        ZollError::ReportNotFound(_) => (StatusCode::NOT_FOUND, "report_not_found"),
        ZollError::Publish(_) => (StatusCode::INTERNAL_SERVER_ERROR, "publish_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    failure(status, category, err.to_string())
}

// ── Caller identity ──────────────────────────────────────────────────

/// Caller identity injected upstream; absent means anonymous.
pub(crate) fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get("x-caller-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn status_and_category(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let envelope: Value = serde_json::from_slice(&body).unwrap();
        (status, envelope["error"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_error_response_covers_the_taxonomy() {
        let cases = [
            (
                ZollError::Validation("not a purl".to_string()),
                StatusCode::BAD_REQUEST,
                "validation_error",
            ),
            (
                ZollError::TaskNotFound(7),
                StatusCode::NOT_FOUND,
                "task_not_found",
            ),
            (
                ZollError::ReportNotFound("npm/left-pad@1.3.0".to_string()),
                StatusCode::NOT_FOUND,
                "report_not_found",
            ),
            (
                ZollError::Publish("report tree unwritable".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "publish_error",
            ),
            (
                ZollError::Serialize("bad value".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];
        for (err, expected_status, expected_category) in cases {
            let (status, category) = status_and_category(error_response(&err)).await;
            assert_eq!(status, expected_status, "for {}", err);
            assert_eq!(category, expected_category, "for {}", err);
        }
    }
}
