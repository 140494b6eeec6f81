//! HTTP router construction.
//!
//! Assembles routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/v1/analyze", post(api::analyze_submit))
        .route("/api/v1/analyze/{id}", get(api::analyze_status))
        .route("/api/v1/queue", get(api::queue_status))
        .route("/api/v1/timeouts", get(api::timeout_status))
        .route("/api/v1/timeouts/check", post(api::timeout_check))
        // Names may contain slashes, so the tail is a wildcard split
        // into name/version by the handler.
        .route("/api/v1/reports/{ecosystem}/{*coordinate}", get(api::get_report))
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Tests ────────────────────────────────────────────────────────────
