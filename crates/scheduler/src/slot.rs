//! Execution slot manager and dispatcher loop.
//!
//! Exactly one analysis runs at a time. The slot is a capacity-1
//! semaphore; the owned permit is moved into [`RunningExecution`] while
//! a task runs and dropped on release, so the slot can never be held
//! twice or leaked past a release call. The dispatcher is the only
//! writer of the `queued → running` transition.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::queue::PriorityQueue;
use crate::runner::{Runner, RunnerError};
use crate::store::{TaskStore, TransitionError};
use crate::task::{ErrorCategory, TaskId, TaskStatus};

// ── Slot state ───────────────────────────────────────────────────────

/// The currently running execution. Holds the slot permit; dropping
/// this releases the slot.
#[derive(Debug)]
pub struct RunningExecution {
    pub task_id: TaskId,
    pub handle: String,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct SlotState {
    semaphore: Arc<Semaphore>,
    current: Mutex<Option<RunningExecution>>,
    notify: Notify,
}

impl SlotState {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            current: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Wake the dispatcher (new work, or a freed slot).
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }

    pub(crate) async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    /// Park the permit inside the running execution record.
    pub fn occupy(&self, task_id: TaskId, handle: String, permit: OwnedSemaphorePermit) {
        let mut current = self.current.lock().unwrap();
        *current = Some(RunningExecution {
            task_id,
            handle,
            _permit: permit,
        });
    }

    /// Free the slot held by `task_id` and wake the dispatcher.
    /// Returns whether that task actually held the slot.
    pub fn release(&self, task_id: TaskId) -> bool {
        let released = {
            let mut current = self.current.lock().unwrap();
            match current.as_ref() {
                Some(exec) if exec.task_id == task_id => {
                    *current = None;
                    true
                }
                _ => false,
            }
        };
        if released {
            self.notify.notify_one();
        }
        released
    }

    /// (task id, runner handle) of the running execution, if any.
    pub fn current(&self) -> Option<(TaskId, String)> {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|exec| (exec.task_id, exec.handle.clone()))
    }

    pub fn is_occupied(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    /// Shut the dispatcher down. Closing the semaphore makes every
    /// pending and future acquire fail.
    pub fn close(&self) {
        self.semaphore.close();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for SlotState {
    fn default() -> Self {
        Self::new()
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Claim the slot, pop the queue head, start it. Runs until the slot
/// is closed.
pub async fn run_dispatcher(
    store: Arc<TaskStore>,
    queue: Arc<PriorityQueue>,
    slot: Arc<SlotState>,
    runner: Arc<dyn Runner>,
    call_timeout: Duration,
) {
    tracing::info!("dispatcher started");
    loop {
        let Some(permit) = slot.acquire().await else {
            break;
        };

        // Hold the permit while waiting so a popped task always has a
        // slot to run in.
        let task_id = loop {
            if let Some(id) = queue.pop_head() {
                break id;
            }
            slot.notified().await;
            if slot.is_closed() {
                tracing::info!("dispatcher stopped");
                return;
            }
        };

        dispatch_one(&store, &slot, runner.as_ref(), permit, task_id, call_timeout).await;
    }
    tracing::info!("dispatcher stopped");
}

/// Start one task. On success the permit moves into the slot state; on
/// any failure it drops here, freeing the slot for the next head.
async fn dispatch_one(
    store: &TaskStore,
    slot: &SlotState,
    runner: &dyn Runner,
    permit: OwnedSemaphorePermit,
    task_id: TaskId,
    call_timeout: Duration,
) {
    let Some(task) = store.get(task_id) else {
        tracing::warn!(task_id, "queued task vanished from the store");
        return;
    };
    if task.status != TaskStatus::Queued {
        // Already resolved elsewhere; skip without consuming the slot.
        tracing::debug!(task_id, status = task.status.as_str(), "skipping stale queue entry");
        return;
    }

    let started = match tokio::time::timeout(call_timeout, runner.start(&task)).await {
        Ok(result) => result,
        Err(_) => Err(RunnerError::StartFailed(format!(
            "start call exceeded {}s",
            call_timeout.as_secs()
        ))),
    };

    match started {
        Ok(handle) => {
            let now = Utc::now();
            let transition =
                store.transition(task_id, TaskStatus::Queued, TaskStatus::Running, |t| {
                    t.started_at = Some(now);
                    t.execution_handle = Some(handle.clone());
                    t.last_heartbeat = Some(now);
                });
            match transition {
                Ok(task) => {
                    tracing::info!(
                        task_id,
                        package = %task.coordinate,
                        handle = %handle,
                        "task dispatched"
                    );
                    slot.occupy(task_id, handle, permit);
                }
                Err(e) => {
                    // The task was terminally resolved between pop and
                    // start; the execution must not keep running.
                    tracing::warn!(task_id, error = %e, "dispatch lost the transition race");
                    let _ = runner.stop(&handle).await;
                }
            }
        }
        Err(e) => {
            tracing::warn!(task_id, error = %e, "runner failed to start task");
            let failed = store.transition(task_id, TaskStatus::Queued, TaskStatus::Failed, |t| {
                t.completed_at = Some(Utc::now());
                t.error_category = Some(ErrorCategory::RunnerError);
                t.error_details = Some(json!({ "reason": e.to_string() }));
            });
            if let Err(TransitionError::NotFound(_)) = failed {
                tracing::warn!(task_id, "failed task missing from the store");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
