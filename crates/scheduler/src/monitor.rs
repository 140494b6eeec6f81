//! Heartbeat and timeout monitor.
//!
//! A periodic loop supervises the running execution: records
//! heartbeats while it is healthy, finalizes it when the runner reports
//! an outcome, and reclaims the slot when the timeout budget is
//! exceeded. The same `sweep` is exposed as a manual trigger, so
//! recovery never depends on the loop alone.
//!
//! Every runner call is bounded by `tokio::time::timeout`; a stuck
//! execution environment can delay a sweep but never wedge it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::publisher::ResultPublisher;
use crate::runner::{PollStatus, Runner};
use crate::slot::SlotState;
use crate::store::TaskStore;
use crate::task::{ErrorCategory, TaskId, TaskStatus};

// ── Sweep outcome ────────────────────────────────────────────────────

/// What one sweep did, serialized for the manual trigger endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub checked_at: DateTime<Utc>,
    pub running_task: Option<TaskId>,
    pub action: SweepAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
    /// No execution was running.
    Idle,
    HeartbeatRecorded,
    Completed,
    /// The run succeeded but the report could not be stored; the task
    /// stays running and the timeout will reclaim it.
    PublishDeferred,
    Failed,
    TimedOut,
    /// The runner could not be reached; left for the timeout.
    Unreachable,
}

// ── Monitor ──────────────────────────────────────────────────────────

pub struct TimeoutMonitor {
    store: Arc<TaskStore>,
    slot: Arc<SlotState>,
    runner: Arc<dyn Runner>,
    publisher: Arc<ResultPublisher>,
    call_timeout: Duration,
}

impl TimeoutMonitor {
    pub fn new(
        store: Arc<TaskStore>,
        slot: Arc<SlotState>,
        runner: Arc<dyn Runner>,
        publisher: Arc<ResultPublisher>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            slot,
            runner,
            publisher,
            call_timeout,
        }
    }

    /// Periodic loop. Runs until the slot is closed.
    pub async fn run(self: Arc<Self>, period: Duration) {
        tracing::info!(period_secs = period.as_secs(), "timeout monitor started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.slot.is_closed() {
                break;
            }
            self.sweep().await;
        }
        tracing::info!("timeout monitor stopped");
    }

    /// Inspect the running execution once and act on what it finds.
    pub async fn sweep(&self) -> SweepOutcome {
        let now = Utc::now();
        let Some((task_id, handle)) = self.slot.current() else {
            return SweepOutcome {
                checked_at: now,
                running_task: None,
                action: SweepAction::Idle,
            };
        };

        let action = match self.store.get(task_id) {
            Some(task) if task.status == TaskStatus::Running => {
                if task.is_timed_out(now) {
                    self.reclaim_timed_out(task_id, &handle, task.started_at, now)
                        .await
                } else {
                    self.check_execution(task_id, &handle).await
                }
            }
            _ => {
                // Slot held for a task that is gone or terminal. Should
                // not happen, but a leaked slot would stall the queue.
                tracing::warn!(task_id, "releasing slot held by a non-running task");
                self.slot.release(task_id);
                SweepAction::Idle
            }
        };

        SweepOutcome {
            checked_at: now,
            running_task: Some(task_id),
            action,
        }
    }

    /// Stop the execution (best effort), fail the task, free the slot.
    async fn reclaim_timed_out(
        &self,
        task_id: TaskId,
        handle: &str,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SweepAction {
        let stop_succeeded = matches!(
            tokio::time::timeout(self.call_timeout, self.runner.stop(handle)).await,
            Ok(Ok(()))
        );
        if !stop_succeeded {
            tracing::warn!(task_id, handle, "could not stop timed-out execution");
        }

        let transition =
            self.store
                .transition(task_id, TaskStatus::Running, TaskStatus::Failed, |t| {
                    t.completed_at = Some(now);
                    t.error_category = Some(ErrorCategory::TimeoutError);
                    t.error_details = Some(json!({
                        "started_at": started_at,
                        "timed_out_at": now,
                        "stop_succeeded": stop_succeeded,
                    }));
                });
        match transition {
            Ok(task) => {
                tracing::warn!(
                    task_id,
                    package = %task.coordinate,
                    timeout_minutes = task.timeout_minutes,
                    "task timed out"
                );
            }
            Err(e) => {
                tracing::debug!(task_id, error = %e, "timeout reclaim lost the transition race");
            }
        }
        self.slot.release(task_id);
        SweepAction::TimedOut
    }

    /// Poll a healthy-so-far execution and finalize it if it ended.
    async fn check_execution(&self, task_id: TaskId, handle: &str) -> SweepAction {
        let polled = match tokio::time::timeout(self.call_timeout, self.runner.poll(handle)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!(task_id, handle, error = %e, "runner poll failed");
                return SweepAction::Unreachable;
            }
            Err(_) => {
                tracing::warn!(task_id, handle, "runner poll timed out");
                return SweepAction::Unreachable;
            }
        };

        match polled {
            PollStatus::Running => {
                self.store.touch_heartbeat(task_id);
                SweepAction::HeartbeatRecorded
            }
            PollStatus::Succeeded(findings) => {
                let Some(task) = self.store.get(task_id) else {
                    self.slot.release(task_id);
                    return SweepAction::Idle;
                };
                match self.publisher.publish(&task, findings) {
                    Ok(_) => {
                        self.release_execution(task_id, handle).await;
                        self.slot.release(task_id);
                        SweepAction::Completed
                    }
                    Err(e) => {
                        // No status change; the next sweep retries the
                        // publish until the timeout reclaims the task.
                        tracing::warn!(task_id, error = %e, "report publish failed");
                        SweepAction::PublishDeferred
                    }
                }
            }
            PollStatus::Failed(reason) => {
                let transition =
                    self.store
                        .transition(task_id, TaskStatus::Running, TaskStatus::Failed, |t| {
                            t.completed_at = Some(Utc::now());
                            t.error_category = Some(ErrorCategory::RunnerError);
                            t.error_details = Some(json!({ "reason": reason }));
                        });
                if let Err(e) = transition {
                    tracing::debug!(task_id, error = %e, "failure report lost the transition race");
                }
                tracing::warn!(task_id, "task failed in the runner");
                self.release_execution(task_id, handle).await;
                self.slot.release(task_id);
                SweepAction::Failed
            }
        }
    }

    /// Tell the runner a finalized execution is no longer needed so it
    /// can drop its record of the handle. Never called on the deferred
    /// publish path, which still needs the terminal poll result.
    async fn release_execution(&self, task_id: TaskId, handle: &str) {
        match tokio::time::timeout(self.call_timeout, self.runner.stop(handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(task_id, handle, error = %e, "could not release finished execution");
            }
            Err(_) => {
                tracing::warn!(task_id, handle, "release of finished execution timed out");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
