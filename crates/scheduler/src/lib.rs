//! Analysis task scheduling: admission, priority queue, the single
//! execution slot, runner supervision, and result publishing.
//!
//! [`Scheduler`] wires the pieces together and is the only type the
//! server crate talks to.

pub mod admission;
pub mod monitor;
pub mod publisher;
pub mod queue;
pub mod report_store;
pub mod runner;
pub mod slot;
pub mod store;
pub mod task;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use zoll_core::{Config, ZollError};

pub use crate::admission::{AdmissionOutcome, SubmitRequest};
pub use crate::monitor::{SweepAction, SweepOutcome};
pub use crate::runner::{PollStatus, Runner, RunnerError, SandboxRunner};
pub use crate::task::{ErrorCategory, Task, TaskId, TaskSnapshot, TaskStatus};

use crate::admission::AdmissionController;
use crate::monitor::TimeoutMonitor;
use crate::publisher::ResultPublisher;
use crate::queue::PriorityQueue;
use crate::report_store::ReportStore;
use crate::slot::SlotState;
use crate::store::TaskStore;

// ── Overview views ───────────────────────────────────────────────────

/// Compact task view for queue listings.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub package: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub queued_at: Option<DateTime<Utc>>,
    pub queue_position: Option<usize>,
}

impl TaskSummary {
    fn from_task(task: &Task, queue_position: Option<usize>) -> Self {
        Self {
            id: task.id,
            package: task.coordinate.to_string(),
            status: task.status,
            priority: task.priority,
            queued_at: task.queued_at,
            queue_position,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueOverview {
    pub queue_length: usize,
    pub running: Option<TaskSummary>,
    /// Queued tasks in dispatch order.
    pub queued: Vec<TaskSummary>,
}

/// Timeout status of the running task, if any.
#[derive(Debug, Clone, Serialize)]
pub struct TimeoutOverview {
    pub checked_at: DateTime<Utc>,
    pub running: Option<RunningTimeout>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningTimeout {
    pub task_id: TaskId,
    pub package: String,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub timeout_minutes: u32,
    pub remaining_time_minutes: Option<i64>,
    pub is_timed_out: bool,
}

// ── Facade ───────────────────────────────────────────────────────────

pub struct Scheduler {
    store: Arc<TaskStore>,
    queue: Arc<PriorityQueue>,
    slot: Arc<SlotState>,
    runner: Arc<dyn Runner>,
    reports: Arc<ReportStore>,
    admission: AdmissionController,
    monitor: Arc<TimeoutMonitor>,
    monitor_period: Duration,
    call_timeout: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: &Config, runner: Arc<dyn Runner>) -> Self {
        let store = Arc::new(TaskStore::new());
        let queue = Arc::new(PriorityQueue::new());
        let slot = Arc::new(SlotState::new());
        let reports = Arc::new(ReportStore::new(&config.storage.data_dir));
        let publisher = Arc::new(ResultPublisher::new(store.clone(), reports.clone()));
        let call_timeout = Duration::from_secs(config.scheduler.runner_poll_timeout_secs);

        let admission = AdmissionController::new(
            store.clone(),
            queue.clone(),
            slot.clone(),
            reports.clone(),
            config.scheduler.default_timeout_minutes,
        );
        let monitor = Arc::new(TimeoutMonitor::new(
            store.clone(),
            slot.clone(),
            runner.clone(),
            publisher,
            call_timeout,
        ));

        Self {
            store,
            queue,
            slot,
            runner,
            reports,
            admission,
            monitor,
            monitor_period: Duration::from_secs(config.scheduler.monitor_period_secs),
            call_timeout,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the dispatcher and monitor loops.
    pub fn spawn(&self) {
        let dispatcher = tokio::spawn(slot::run_dispatcher(
            self.store.clone(),
            self.queue.clone(),
            self.slot.clone(),
            self.runner.clone(),
            self.call_timeout,
        ));
        let monitor = tokio::spawn(self.monitor.clone().run(self.monitor_period));
        *self.handles.lock().unwrap() = vec![dispatcher, monitor];
    }

    /// Stop both loops and wait for them to exit. The monitor may be
    /// mid-sleep on its tick, so it is aborted rather than joined.
    pub async fn shutdown(&self) {
        self.slot.close();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn submit(&self, request: SubmitRequest) -> Result<AdmissionOutcome, ZollError> {
        self.admission.submit(request)
    }

    /// Full status view of one task, derived fields included.
    pub fn snapshot(&self, id: TaskId) -> Result<TaskSnapshot, ZollError> {
        let task = self.store.get(id).ok_or(ZollError::TaskNotFound(id))?;
        let queue_position = if task.status == TaskStatus::Queued {
            self.queue.position_of(id)
        } else {
            None
        };
        Ok(task.snapshot(queue_position, Utc::now()))
    }

    pub fn queue_overview(&self) -> QueueOverview {
        let running = self
            .store
            .running_task()
            .map(|t| TaskSummary::from_task(&t, None));
        let queued: Vec<TaskSummary> = self
            .queue
            .ordered_ids()
            .into_iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.store
                    .get(id)
                    .map(|t| TaskSummary::from_task(&t, Some(i + 1)))
            })
            .collect();
        QueueOverview {
            queue_length: queued.len(),
            running,
            queued,
        }
    }

    pub fn timeout_overview(&self) -> TimeoutOverview {
        let now = Utc::now();
        let running = self.store.running_task().map(|task| RunningTimeout {
            task_id: task.id,
            package: task.coordinate.to_string(),
            started_at: task.started_at,
            last_heartbeat: task.last_heartbeat,
            timeout_minutes: task.timeout_minutes,
            remaining_time_minutes: task.remaining_minutes(now),
            is_timed_out: task.is_timed_out(now),
        });
        TimeoutOverview {
            checked_at: now,
            running,
        }
    }

    /// Run one monitor sweep immediately (the manual trigger).
    pub async fn force_sweep(&self) -> SweepOutcome {
        self.monitor.sweep().await
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }
}

// ── Tests ────────────────────────────────────────────────────────────
