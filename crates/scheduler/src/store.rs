//! In-memory task record store.
//!
//! [`TaskStore`] is the source of truth for all task state. Every
//! status change goes through [`TaskStore::transition`], a
//! compare-and-set keyed by task id and expected prior status, so
//! racing writers (request handlers, dispatcher, monitor) are safe
//! without broad locking. [`TaskStore::admit`] is the single-writer
//! admission checkpoint: the whole dedupe/cache/create decision runs
//! under one lock, closing the race where two submissions for the same
//! coordinate would both create tasks.
//!
//! Uses `IndexMap` to preserve creation order (newest last) while
//! allowing O(1) lookups by task id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use indexmap::IndexMap;

use zoll_core::PackageCoordinate;

use crate::task::{Task, TaskId, TaskStatus};

// ── Requests and outcomes ────────────────────────────────────────────

/// Validated input for one admission attempt.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub coordinate: PackageCoordinate,
    pub package_url: String,
    pub submitter: String,
    pub idempotency_key: Option<String>,
    pub priority: i32,
    pub timeout_minutes: u32,
}

/// Result of the atomic admission decision.
#[derive(Debug, Clone)]
pub enum AdmissionDecision {
    /// A fresh task was created and stamped `queued`.
    Created(Task),
    /// An existing task absorbed this submission (idempotency key or
    /// active-coordinate collapse).
    Existing(Task),
    /// The coordinate already has a completed report; no task created.
    CachedReport { reference: String },
}

/// A rejected compare-and-set. The loser of a transition race gets one
/// of these and must treat it as a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    NotFound(TaskId),
    /// The task is already `completed`/`failed`; terminal states absorb
    /// all further transitions.
    AlreadyTerminal { id: TaskId, status: TaskStatus },
    WrongStatus {
        id: TaskId,
        expected: TaskStatus,
        actual: TaskStatus,
    },
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "task not found: {}", id),
            Self::AlreadyTerminal { id, status } => {
                write!(f, "task {} is already terminal ({})", id, status.as_str())
            }
            Self::WrongStatus {
                id,
                expected,
                actual,
            } => write!(
                f,
                "task {} is {} (expected {})",
                id,
                actual.as_str(),
                expected.as_str()
            ),
        }
    }
}

impl std::error::Error for TransitionError {}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<IndexMap<TaskId, Task>>,
    next_id: AtomicU64,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the admission decision atomically.
    ///
    /// Precedence: idempotency-key match (regardless of that task's
    /// status), then active task for the same coordinate, then a
    /// completed report (in-store or the caller's `stored_report`
    /// answer from disk), then create. The disk lookup happens outside
    /// the lock, so the caller passes its answer in rather than
    /// short-circuiting ahead of the key check.
    ///
    /// Created tasks pass through `pending` and come out `queued` with
    /// `queued_at` stamped — queue insertion is the caller's next step
    /// and cannot fail, so the two states are merged here.
    pub fn admit(&self, new: NewTask, stored_report: Option<String>) -> AdmissionDecision {
        let mut tasks = self.tasks.lock().unwrap();

        if let Some(key) = new.idempotency_key.as_deref() {
            if let Some(existing) = tasks.values().find(|t| {
                t.submitter == new.submitter && t.idempotency_key.as_deref() == Some(key)
            }) {
                return AdmissionDecision::Existing(existing.clone());
            }
        }

        if let Some(active) = tasks.values().find(|t| {
            t.coordinate == new.coordinate
                && matches!(
                    t.status,
                    TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Running
                )
        }) {
            return AdmissionDecision::Existing(active.clone());
        }

        let completed = tasks.values().find_map(|t| {
            if t.coordinate == new.coordinate && t.status == TaskStatus::Completed {
                t.report_reference.clone()
            } else {
                None
            }
        });
        if let Some(reference) = completed.or(stored_report) {
            return AdmissionDecision::CachedReport { reference };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let task = Task {
            id,
            coordinate: new.coordinate,
            package_url: new.package_url,
            submitter: new.submitter,
            idempotency_key: new.idempotency_key,
            status: TaskStatus::Queued,
            priority: new.priority,
            timeout_minutes: new.timeout_minutes,
            created_at: now,
            queued_at: Some(now),
            started_at: None,
            execution_handle: None,
            last_heartbeat: None,
            completed_at: None,
            report_reference: None,
            error_category: None,
            error_details: None,
        };
        tasks.insert(id, task.clone());
        AdmissionDecision::Created(task)
    }

    /// Compare-and-set a status transition.
    ///
    /// `apply` mutates the side fields (timestamps, handle, outcome)
    /// and runs only when the guard holds; the status flips to `to`
    /// afterwards. Returns the updated record.
    pub fn transition(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Task, TransitionError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(&id).ok_or(TransitionError::NotFound(id))?;

        if task.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                id,
                status: task.status,
            });
        }
        if task.status != from {
            return Err(TransitionError::WrongStatus {
                id,
                expected: from,
                actual: task.status,
            });
        }

        apply(task);
        task.status = to;
        Ok(task.clone())
    }

    /// Record a liveness signal for a running task. No-op otherwise.
    pub fn touch_heartbeat(&self, id: TaskId) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.get_mut(&id) {
            if task.status == TaskStatus::Running {
                task.last_heartbeat = Some(Utc::now());
            }
        }
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    /// Tasks currently `queued`, in creation order. Ordering for
    /// dispatch/position purposes is the queue's business, not ours.
    pub fn queued_tasks(&self) -> Vec<Task> {
        self.tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .cloned()
            .collect()
    }

    pub fn running_task(&self) -> Option<Task> {
        self.tasks
            .lock()
            .unwrap()
            .values()
            .find(|t| t.status == TaskStatus::Running)
            .cloned()
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use zoll_core::Ecosystem;

    fn coord(name: &str) -> PackageCoordinate {
        PackageCoordinate {
            ecosystem: Ecosystem::Npm,
            name: name.to_string(),
            version: "1.0.0".to_string(),
        }
    }

    fn new_task(name: &str) -> NewTask {
        NewTask {
            coordinate: coord(name),
            package_url: format!("pkg:npm/{}@1.0.0", name),
            submitter: "tester".to_string(),
            idempotency_key: None,
            priority: 0,
            timeout_minutes: 30,
        }
    }

    #[test]
    fn test_admit_creates_queued_task() {
        let store = TaskStore::new();
        match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Created(task) => {
                assert_eq!(task.id, 1);
                assert_eq!(task.status, TaskStatus::Queued);
                assert!(task.queued_at.is_some());
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[test]
    fn test_admit_collapses_active_coordinate() {
        let store = TaskStore::new();
        let first = match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };
        match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Existing(t) => assert_eq!(t.id, first.id),
            other => panic!("expected Existing, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_admit_idempotency_key_wins_over_coordinate() {
        let store = TaskStore::new();
        let mut req = new_task("left-pad");
        req.idempotency_key = Some("abc".to_string());
        let first = match store.admit(req, None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };

        // Same key, different coordinate: the key match takes precedence.
        let mut req2 = new_task("other-package");
        req2.idempotency_key = Some("abc".to_string());
        match store.admit(req2, None) {
            AdmissionDecision::Existing(t) => assert_eq!(t.id, first.id),
            other => panic!("expected Existing, got {:?}", other),
        }
    }

    #[test]
    fn test_admit_idempotency_key_scoped_to_submitter() {
        let store = TaskStore::new();
        let mut req = new_task("left-pad");
        req.idempotency_key = Some("abc".to_string());
        store.admit(req, None);

        let mut req2 = new_task("other-package");
        req2.idempotency_key = Some("abc".to_string());
        req2.submitter = "someone-else".to_string();
        match store.admit(req2, None) {
            AdmissionDecision::Created(t) => assert_eq!(t.id, 2),
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[test]
    fn test_admit_idempotency_match_even_when_terminal() {
        let store = TaskStore::new();
        let mut req = new_task("left-pad");
        req.idempotency_key = Some("abc".to_string());
        let task = match store.admit(req.clone(), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };
        store
            .transition(task.id, TaskStatus::Queued, TaskStatus::Running, |t| {
                t.started_at = Some(Utc::now());
            })
            .unwrap();
        store
            .transition(task.id, TaskStatus::Running, TaskStatus::Failed, |_| {})
            .unwrap();

        match store.admit(req, None) {
            AdmissionDecision::Existing(t) => assert_eq!(t.id, task.id),
            other => panic!("expected Existing, got {:?}", other),
        }
    }

    #[test]
    fn test_admit_returns_cached_report() {
        let store = TaskStore::new();
        let task = match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };
        store
            .transition(task.id, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap();
        store
            .transition(task.id, TaskStatus::Running, TaskStatus::Completed, |t| {
                t.report_reference = Some("reports/npm/left-pad/1.0.0/report.json".to_string());
            })
            .unwrap();

        match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::CachedReport { reference } => {
                assert_eq!(reference, "reports/npm/left-pad/1.0.0/report.json");
            }
            other => panic!("expected CachedReport, got {:?}", other),
        }
        assert_eq!(store.len(), 1, "cache hit must not create a task");
    }

    #[test]
    fn test_admit_uses_stored_report_when_nothing_matches() {
        let store = TaskStore::new();
        let on_disk = "reports/npm/left-pad/1.0.0/report.json".to_string();
        match store.admit(new_task("left-pad"), Some(on_disk.clone())) {
            AdmissionDecision::CachedReport { reference } => assert_eq!(reference, on_disk),
            other => panic!("expected CachedReport, got {:?}", other),
        }
        assert!(store.is_empty(), "cache hit must not create a task");
    }

    #[test]
    fn test_admit_idempotency_key_wins_over_stored_report() {
        let store = TaskStore::new();
        let mut req = new_task("left-pad");
        req.idempotency_key = Some("abc".to_string());
        let task = match store.admit(req.clone(), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };
        store
            .transition(task.id, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap();
        store
            .transition(task.id, TaskStatus::Running, TaskStatus::Completed, |t| {
                t.report_reference = Some("reports/npm/left-pad/1.0.0/report.json".to_string());
            })
            .unwrap();

        // A completed report exists, but the key match still wins.
        let on_disk = "reports/npm/left-pad/1.0.0/report.json".to_string();
        match store.admit(req, Some(on_disk)) {
            AdmissionDecision::Existing(t) => assert_eq!(t.id, task.id),
            other => panic!("expected Existing, got {:?}", other),
        }
    }

    #[test]
    fn test_transition_guards_prior_status() {
        let store = TaskStore::new();
        let task = match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };

        let err = store
            .transition(task.id, TaskStatus::Running, TaskStatus::Completed, |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::WrongStatus {
                id: task.id,
                expected: TaskStatus::Running,
                actual: TaskStatus::Queued,
            }
        );
    }

    #[test]
    fn test_terminal_states_absorb_transitions() {
        let store = TaskStore::new();
        let task = match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };
        store
            .transition(task.id, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap();
        store
            .transition(task.id, TaskStatus::Running, TaskStatus::Failed, |_| {})
            .unwrap();

        // Loser of the completed/failed race gets a no-op error.
        let err = store
            .transition(task.id, TaskStatus::Running, TaskStatus::Completed, |_| {})
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyTerminal { .. }));
        assert_eq!(store.get(task.id).unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn test_transition_unknown_task() {
        let store = TaskStore::new();
        let err = store
            .transition(99, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap_err();
        assert_eq!(err, TransitionError::NotFound(99));
    }

    #[test]
    fn test_concurrent_duplicate_submissions_create_one_task() {
        let store = Arc::new(TaskStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                match store.admit(new_task("left-pad"), None) {
                    AdmissionDecision::Created(t) | AdmissionDecision::Existing(t) => t.id,
                    AdmissionDecision::CachedReport { .. } => panic!("no report exists"),
                }
            }));
        }
        let ids: Vec<TaskId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 1, "exactly one task row must result");
        assert!(ids.iter().all(|&id| id == ids[0]), "all callers share one id");
    }

    #[test]
    fn test_concurrent_idempotency_key_race() {
        let store = Arc::new(TaskStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                // Different coordinates, same (submitter, key) pair.
                let mut req = new_task(&format!("pkg-{}", i));
                req.idempotency_key = Some("same-key".to_string());
                match store.admit(req, None) {
                    AdmissionDecision::Created(t) | AdmissionDecision::Existing(t) => t.id,
                    AdmissionDecision::CachedReport { .. } => panic!("no report exists"),
                }
            }));
        }
        let ids: Vec<TaskId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_touch_heartbeat_only_when_running() {
        let store = TaskStore::new();
        let task = match store.admit(new_task("left-pad"), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };

        store.touch_heartbeat(task.id);
        assert!(store.get(task.id).unwrap().last_heartbeat.is_none());

        store
            .transition(task.id, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap();
        store.touch_heartbeat(task.id);
        assert!(store.get(task.id).unwrap().last_heartbeat.is_some());
    }

    #[test]
    fn test_running_invariant_helpers() {
        let store = TaskStore::new();
        let a = match store.admit(new_task("a"), None) {
            AdmissionDecision::Created(t) => t,
            other => panic!("expected Created, got {:?}", other),
        };
        store.admit(new_task("b"), None);
        assert_eq!(store.running_count(), 0);

        store
            .transition(a.id, TaskStatus::Queued, TaskStatus::Running, |_| {})
            .unwrap();
        assert_eq!(store.running_count(), 1);
        assert_eq!(store.running_task().unwrap().id, a.id);
        assert_eq!(store.queued_tasks().len(), 1);
    }
}
