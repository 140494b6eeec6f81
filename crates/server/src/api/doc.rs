//! OpenAPI documentation aggregator.
//!
//! Collects the `#[utoipa::path]`-annotated handlers into one OpenAPI
//! spec, served via Scalar UI at `/docs`.

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "zoll API",
        version = "0.1.0",
        description = "Malicious-package analysis scheduler: submit a package release, get a structured analysis report.",
    ),
    tags(
        (name = "Health", description = "Server readiness"),
        (name = "Analysis", description = "Submit analysis tasks and read their status"),
        (name = "Queue", description = "Queue and running-task visibility"),
        (name = "Timeouts", description = "Timeout budgets and the manual sweep trigger"),
        (name = "Reports", description = "Stored analysis reports"),
    ),
    paths(
        crate::api::health::health,
        crate::api::analyze::analyze_submit,
        crate::api::analyze::analyze_status,
        crate::api::queue::queue_status,
        crate::api::timeouts::timeout_status,
        crate::api::timeouts::timeout_check,
        crate::api::reports::get_report,
    )
)]
pub struct ApiDoc;
