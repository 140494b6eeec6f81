//! Task records and their status lifecycle.
//!
//! A task is one analysis job for one package release. Status moves
//! one-way through `pending → queued → running → completed | failed`;
//! terminal states absorb every later transition attempt.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use zoll_core::PackageCoordinate;

pub type TaskId = u64;

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Exists only until queue insertion succeeds.
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Failure taxonomy persisted on failed tasks.
///
/// `validation_error` never reaches a task (rejected pre-admission) and
/// duplicates are resolved transparently, so neither appears here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RunnerError,
    TimeoutError,
    PublishError,
}

// ── Task ─────────────────────────────────────────────────────────────

/// One analysis job. Mutated only through [`TaskStore`] transitions.
///
/// [`TaskStore`]: crate::store::TaskStore
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub coordinate: PackageCoordinate,
    pub package_url: String,
    pub submitter: String,
    pub idempotency_key: Option<String>,
    pub status: TaskStatus,
    pub priority: i32,
    pub timeout_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub execution_handle: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub report_reference: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub error_details: Option<serde_json::Value>,
}

impl Task {
    /// Whether the run has exceeded its timeout budget.
    ///
    /// Only meaningful for `running` tasks; everything else is `false`.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        match self.started_at {
            Some(started) => now - started > Duration::minutes(self.timeout_minutes as i64),
            None => false,
        }
    }

    /// Minutes left before the timeout fires (floored at zero).
    /// `None` unless the task is running.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.status != TaskStatus::Running {
            return None;
        }
        let started = self.started_at?;
        let deadline = started + Duration::minutes(self.timeout_minutes as i64);
        Some((deadline - now).num_minutes().max(0))
    }

    /// Full status-query view with the derived fields attached.
    pub fn snapshot(&self, queue_position: Option<usize>, now: DateTime<Utc>) -> TaskSnapshot {
        TaskSnapshot {
            task: self.clone(),
            queue_position,
            remaining_time_minutes: self.remaining_minutes(now),
            is_timed_out: self.is_timed_out(now),
        }
    }
}

/// Serialized task plus derived fields, returned by status queries.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    #[serde(flatten)]
    pub task: Task,
    /// 1-based position among queued tasks; `None` unless queued.
    pub queue_position: Option<usize>,
    pub remaining_time_minutes: Option<i64>,
    pub is_timed_out: bool,
}

// ── Tests ────────────────────────────────────────────────────────────
