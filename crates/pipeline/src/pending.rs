//! In-flight query markers.
//!
//! One entry per task id with a provider round-trip running. Insertion is
//! an atomic check-and-set under a mutex; the mutex is never held across
//! an `.await`.
//!
//! The table lives in process memory, so the at-most-one guarantee holds
//! per process only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use genflow_core::types::DbId;

/// Marker for a running round-trip.
#[derive(Debug, Clone, Copy)]
pub struct PendingQuery {
    pub started_at: Instant,
    /// Whether an end user (rather than the sweeper) started it.
    pub user_initiated: bool,
}

#[derive(Debug, Default)]
pub struct PendingQueries {
    inner: Mutex<HashMap<DbId, PendingQuery>>,
}

impl PendingQueries {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a marker for `task_id` unless one exists.
    ///
    /// The returned guard removes the marker when dropped, whichever way
    /// the round-trip ends.
    pub fn try_acquire(
        self: &Arc<Self>,
        task_id: DbId,
        user_initiated: bool,
    ) -> Option<PendingQueryGuard> {
        let mut map = self.lock();
        if map.contains_key(&task_id) {
            return None;
        }
        map.insert(
            task_id,
            PendingQuery {
                started_at: Instant::now(),
                user_initiated,
            },
        );
        Some(PendingQueryGuard {
            table: Arc::clone(self),
            task_id,
        })
    }

    pub fn is_pending(&self, task_id: DbId) -> bool {
        self.lock().contains_key(&task_id)
    }

    /// How long the round-trip for `task_id` has been running.
    pub fn age(&self, task_id: DbId) -> Option<Duration> {
        self.lock().get(&task_id).map(|q| q.started_at.elapsed())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn release(&self, task_id: DbId) {
        self.lock().remove(&task_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DbId, PendingQuery>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns a [`PendingQuery`] marker; dropping it releases the marker.
#[derive(Debug)]
pub struct PendingQueryGuard {
    table: Arc<PendingQueries>,
    task_id: DbId,
}

impl PendingQueryGuard {
    pub fn task_id(&self) -> DbId {
        self.task_id
    }
}

impl Drop for PendingQueryGuard {
    fn drop(&mut self) {
        self.table.release(self.task_id);
    }
}
