//! Result publisher: the only writer of `running → completed`.
//!
//! Order matters: the report is durably stored first, the status flips
//! second. A storage failure leaves the task `running` with no status
//! change, so a task is never `completed` without a report on disk.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use zoll_core::ZollError;

use crate::report_store::{Report, ReportStore};
use crate::store::{TaskStore, TransitionError};
use crate::task::{Task, TaskStatus};

pub struct ResultPublisher {
    store: Arc<TaskStore>,
    reports: Arc<ReportStore>,
}

impl ResultPublisher {
    pub fn new(store: Arc<TaskStore>, reports: Arc<ReportStore>) -> Self {
        Self { store, reports }
    }

    /// Persist the findings and complete the task. Returns the report
    /// reference.
    pub fn publish(&self, task: &Task, findings: Value) -> Result<String, ZollError> {
        let now = Utc::now();
        let report = Report {
            coordinate: task.coordinate.clone(),
            package_url: task.package_url.clone(),
            created_at: now,
            findings,
        };
        let reference = self
            .reports
            .save_if_absent(&report)
            .map_err(|e| ZollError::Publish(e.to_string()))?;

        let transition =
            self.store
                .transition(task.id, TaskStatus::Running, TaskStatus::Completed, |t| {
                    t.completed_at = Some(now);
                    t.report_reference = Some(reference.clone());
                });
        match transition {
            Ok(task) => {
                tracing::info!(
                    task_id = task.id,
                    package = %task.coordinate,
                    reference = %reference,
                    "task completed"
                );
            }
            Err(TransitionError::AlreadyTerminal { id, status }) => {
                // Lost the race against the timeout sweep. The report is
                // stored regardless; the task keeps its first outcome.
                tracing::warn!(
                    task_id = id,
                    status = status.as_str(),
                    "publish arrived after the task was resolved"
                );
            }
            Err(e) => {
                tracing::warn!(task_id = task.id, error = %e, "publish could not complete task");
            }
        }
        Ok(reference)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
