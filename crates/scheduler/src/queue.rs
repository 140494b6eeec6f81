//! Priority queue over queued task ids.
//!
//! Dispatch order is `priority desc, queued_at asc, id asc`. Nothing
//! is cached or maintained incrementally: the queue is small (one
//! analysis at a time drains it) so positions are recomputed per query.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    id: TaskId,
    priority: i32,
    queued_at: DateTime<Utc>,
}

impl Entry {
    /// Sort key for dispatch order. Higher priority first, then older
    /// `queued_at`, then smaller id as the final tiebreak.
    fn key(&self) -> (i64, DateTime<Utc>, TaskId) {
        (-(self.priority as i64), self.queued_at, self.id)
    }
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    entries: Mutex<Vec<Entry>>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: TaskId, priority: i32, queued_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        let entry = Entry {
            id,
            priority,
            queued_at,
        };
        let at = entries.partition_point(|e| e.key() <= entry.key());
        entries.insert(at, entry);
    }

    /// Remove and return the next task to dispatch.
    pub fn pop_head(&self) -> Option<TaskId> {
        let mut entries = self.entries.lock().unwrap();
        if entries.is_empty() {
            None
        } else {
            Some(entries.remove(0).id)
        }
    }

    /// Drop an entry without dispatching it. Returns whether it was
    /// present.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() < before
    }

    /// 1-based dispatch position (head = 1), `None` if not queued.
    pub fn position_of(&self, id: TaskId) -> Option<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .position(|e| e.id == id)
            .map(|i| i + 1)
    }

    /// Task ids in dispatch order.
    pub fn ordered_ids(&self) -> Vec<TaskId> {
        self.entries.lock().unwrap().iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
