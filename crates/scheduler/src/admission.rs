//! Admission controller: the front door for analysis submissions.
//!
//! Validation happens before any task exists; the dedupe/cache/create
//! decision happens atomically inside the store. A freshly created
//! task is queued here and the dispatcher is woken, so submission is
//! the only producer side of the queue.

use std::sync::Arc;

use zoll_core::{PackageCoordinate, ZollError};

use crate::queue::PriorityQueue;
use crate::report_store::ReportStore;
use crate::slot::SlotState;
use crate::store::{AdmissionDecision, NewTask, TaskStore};
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub package_url: String,
    pub submitter: String,
    pub priority: i32,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AdmissionOutcome {
    /// New task, already queued.
    Queued(Task),
    /// A prior submission covers this one.
    Existing(Task),
    /// A finished report already exists; no task.
    CachedReport { reference: String },
}

pub struct AdmissionController {
    store: Arc<TaskStore>,
    queue: Arc<PriorityQueue>,
    slot: Arc<SlotState>,
    reports: Arc<ReportStore>,
    default_timeout_minutes: u32,
}

impl AdmissionController {
    pub fn new(
        store: Arc<TaskStore>,
        queue: Arc<PriorityQueue>,
        slot: Arc<SlotState>,
        reports: Arc<ReportStore>,
        default_timeout_minutes: u32,
    ) -> Self {
        Self {
            store,
            queue,
            slot,
            reports,
            default_timeout_minutes,
        }
    }

    pub fn submit(&self, request: SubmitRequest) -> Result<AdmissionOutcome, ZollError> {
        let coordinate = PackageCoordinate::parse_purl(&request.package_url)?;

        // Reports survive a restart of the in-memory store, so the
        // disk lookup happens here. Its answer feeds into the store's
        // single admission decision rather than deciding on its own;
        // an idempotency-key match must win over a cached report.
        let stored_report = if self.reports.exists(&coordinate) {
            Some(ReportStore::reference(&coordinate))
        } else {
            None
        };

        let decision = self.store.admit(
            NewTask {
                coordinate,
                package_url: request.package_url,
                submitter: request.submitter,
                idempotency_key: request.idempotency_key,
                priority: request.priority,
                timeout_minutes: self.default_timeout_minutes,
            },
            stored_report,
        );

        match decision {
            AdmissionDecision::Created(task) => {
                self.queue.insert(
                    task.id,
                    task.priority,
                    task.queued_at.unwrap_or(task.created_at),
                );
                self.slot.wake();
                tracing::info!(
                    task_id = task.id,
                    package = %task.coordinate,
                    priority = task.priority,
                    "task admitted"
                );
                Ok(AdmissionOutcome::Queued(task))
            }
            AdmissionDecision::Existing(task) => {
                tracing::info!(
                    task_id = task.id,
                    package = %task.coordinate,
                    status = task.status.as_str(),
                    "submission collapsed into existing task"
                );
                Ok(AdmissionOutcome::Existing(task))
            }
            AdmissionDecision::CachedReport { reference } => {
                tracing::info!(report = %reference, "submission served from finished report");
                Ok(AdmissionOutcome::CachedReport { reference })
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::report_store::Report;
    use crate::task::TaskStatus;

    struct Fixture {
        controller: AdmissionController,
        store: Arc<TaskStore>,
        queue: Arc<PriorityQueue>,
        reports: Arc<ReportStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new());
        let queue = Arc::new(PriorityQueue::new());
        let slot = Arc::new(SlotState::new());
        let reports = Arc::new(ReportStore::new(dir.path()));
        let controller = AdmissionController::new(
            store.clone(),
            queue.clone(),
            slot,
            reports.clone(),
            30,
        );
        Fixture {
            controller,
            store,
            queue,
            reports,
            _dir: dir,
        }
    }

    fn request(purl: &str) -> SubmitRequest {
        SubmitRequest {
            package_url: purl.to_string(),
            submitter: "tester".to_string(),
            priority: 0,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_malformed_purl_creates_no_task() {
        let fx = fixture();
        let err = fx.controller.submit(request("not-a-purl")).unwrap_err();
        assert!(matches!(err, ZollError::Validation(_)));
        assert!(fx.store.is_empty());
        assert!(fx.queue.is_empty());
    }

    #[test]
    fn test_new_submission_is_queued() {
        let fx = fixture();
        match fx.controller.submit(request("pkg:npm/left-pad@1.3.0")) {
            Ok(AdmissionOutcome::Queued(task)) => {
                assert_eq!(task.status, TaskStatus::Queued);
                assert_eq!(task.timeout_minutes, 30);
                assert_eq!(fx.queue.position_of(task.id), Some(1));
            }
            other => panic!("expected Queued, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_submission_does_not_requeue() {
        let fx = fixture();
        fx.controller
            .submit(request("pkg:npm/left-pad@1.3.0"))
            .unwrap();
        match fx.controller.submit(request("pkg:npm/left-pad@1.3.0")) {
            Ok(AdmissionOutcome::Existing(_)) => {}
            other => panic!("expected Existing, got {:?}", other),
        }
        assert_eq!(fx.queue.len(), 1);
        assert_eq!(fx.store.len(), 1);
    }

    #[test]
    fn test_report_on_disk_short_circuits() {
        let fx = fixture();
        let coordinate = PackageCoordinate::parse_purl("pkg:npm/left-pad@1.3.0").unwrap();
        fx.reports
            .save_if_absent(&Report {
                coordinate: coordinate.clone(),
                package_url: "pkg:npm/left-pad@1.3.0".to_string(),
                created_at: Utc::now(),
                findings: json!({"verdict": "benign"}),
            })
            .unwrap();

        match fx.controller.submit(request("pkg:npm/left-pad@1.3.0")) {
            Ok(AdmissionOutcome::CachedReport { reference }) => {
                assert_eq!(reference, "reports/npm/left-pad/1.3.0/report.json");
            }
            other => panic!("expected CachedReport, got {:?}", other),
        }
        assert!(fx.store.is_empty(), "cache hit must not create a task");
    }

    #[test]
    fn test_idempotency_key_wins_over_report_on_disk() {
        let fx = fixture();
        let mut req = request("pkg:npm/left-pad@1.3.0");
        req.idempotency_key = Some("retry-1".to_string());
        let task = match fx.controller.submit(req.clone()) {
            Ok(AdmissionOutcome::Queued(task)) => task,
            other => panic!("expected Queued, got {:?}", other),
        };

        // Drive the task to completed with its report on disk.
        let coordinate = PackageCoordinate::parse_purl("pkg:npm/left-pad@1.3.0").unwrap();
        fx.reports
            .save_if_absent(&Report {
                coordinate: coordinate.clone(),
                package_url: req.package_url.clone(),
                created_at: Utc::now(),
                findings: json!({"verdict": "benign"}),
            })
            .unwrap();
        fx.store
            .transition(task.id, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap();
        fx.store
            .transition(task.id, TaskStatus::Running, TaskStatus::Completed, |t| {
                t.report_reference = Some(ReportStore::reference(&coordinate));
            })
            .unwrap();

        // Resubmitting the same key must return the same task, not
        // the cached report.
        match fx.controller.submit(req) {
            Ok(AdmissionOutcome::Existing(found)) => assert_eq!(found.id, task.id),
            other => panic!("expected Existing, got {:?}", other),
        }
    }

    #[test]
    fn test_priority_orders_the_queue() {
        let fx = fixture();
        fx.controller
            .submit(request("pkg:npm/first@1.0.0"))
            .unwrap();
        let mut urgent = request("pkg:npm/second@1.0.0");
        urgent.priority = 10;
        let urgent_id = match fx.controller.submit(urgent) {
            Ok(AdmissionOutcome::Queued(task)) => task.id,
            other => panic!("expected Queued, got {:?}", other),
        };
        assert_eq!(fx.queue.position_of(urgent_id), Some(1));
    }
}
