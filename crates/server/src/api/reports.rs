//! Stored report retrieval.
//!
//! Package names may contain slashes (npm scopes, Go module paths), so
//! the route captures everything after the ecosystem and splits the
//! version off the last segment.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use zoll_core::{Ecosystem, PackageCoordinate, ZollError};

use crate::state::AppState;

use super::{error_response, respond};

#[utoipa::path(
    get,
    path = "/api/v1/reports/{ecosystem}/{name}/{version}",
    tag = "Reports",
    params(
        ("ecosystem" = String, Path, description = "Package ecosystem, e.g. npm"),
        ("name" = String, Path, description = "Package name; may contain slashes"),
        ("version" = String, Path, description = "Exact release version")
    ),
    responses(
        (status = 200, description = "Stored analysis report", body = Object),
        (status = 404, description = "No report for this coordinate", body = Object)
    )
)]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path((ecosystem, rest)): Path<(String, String)>,
) -> Response {
    let coordinate = match parse_coordinate(&ecosystem, &rest) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    match state.scheduler.reports().load(&coordinate) {
        Ok(report) => respond(StatusCode::OK, report),
        Err(e) => error_response(&e),
    }
}

fn parse_coordinate(ecosystem: &str, rest: &str) -> Result<PackageCoordinate, ZollError> {
    let ecosystem = Ecosystem::parse(ecosystem)
        .ok_or_else(|| ZollError::Validation(format!("unsupported ecosystem '{}'", ecosystem)))?;
    let (name, version) = rest
        .rsplit_once('/')
        .ok_or_else(|| ZollError::Validation(format!("'{}' is missing the version segment", rest)))?;
    PackageCoordinate::new(ecosystem, name, version)
}
