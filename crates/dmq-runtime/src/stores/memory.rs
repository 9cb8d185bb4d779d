//! In-memory transactional store for testing and development.
//!
//! This module provides a fully functional in-memory store that:
//! - Implements watch/commit-or-abort semantics with per-key versions
//! - Applies transactions atomically under a single backend lock
//! - Supports many connection-like sessions over one shared backend
//!
//! This store is intended for:
//! - Unit testing of dmq-runtime consumers
//! - Development and prototyping
//! - Reference implementation for real store adapters

use crate::error::StoreError;
use crate::message::TimestampRange;
use crate::store::{CommitOutcome, Transaction, TransactionalStore, WriteOp};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// One sorted set: member -> score plus a score-ordered view.
///
/// Range queries iterate `ordered`, which ties equal scores by member string,
/// giving the deterministic tie order the store contract requires.
#[derive(Default)]
struct Schedule {
    by_member: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl Schedule {
    /// Insert or replace a member's score. Returns true when the set changed.
    fn add(&mut self, score: i64, member: &str) -> bool {
        match self.by_member.get(member) {
            Some(&existing) if existing == score => false,
            Some(&existing) => {
                self.ordered.remove(&(existing, member.to_string()));
                self.ordered.insert((score, member.to_string()));
                self.by_member.insert(member.to_string(), score);
                true
            }
            None => {
                self.ordered.insert((score, member.to_string()));
                self.by_member.insert(member.to_string(), score);
                true
            }
        }
    }

    /// Remove a member. Returns true when it was present.
    fn remove(&mut self, member: &str) -> bool {
        match self.by_member.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn score(&self, member: &str) -> Option<i64> {
        self.by_member.get(member).copied()
    }

    fn range(&self, range: &TimestampRange, limit: usize) -> Vec<String> {
        self.ordered
            .iter()
            .filter(|(score, _)| range.contains(*score))
            .take(limit)
            .map(|(_, member)| member.clone())
            .collect()
    }

    fn count(&self, range: &TimestampRange) -> u64 {
        self.ordered
            .iter()
            .filter(|(score, _)| range.contains(*score))
            .count() as u64
    }

    /// Remove every member inside the range. Returns true when any was removed.
    fn remove_range(&mut self, range: &TimestampRange) -> bool {
        let victims: Vec<(i64, String)> = self
            .ordered
            .iter()
            .filter(|(score, _)| range.contains(*score))
            .cloned()
            .collect();
        for (score, member) in &victims {
            self.by_member.remove(member);
            self.ordered.remove(&(*score, member.clone()));
        }
        !victims.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }
}

/// Backend state shared by every session of one store
#[derive(Default)]
struct Backend {
    payloads: HashMap<String, Bytes>,
    schedules: HashMap<String, Schedule>,
    /// Monotonic per-key modification counters; watch validation compares
    /// these, so only effective mutations bump them
    versions: HashMap<String, u64>,
}

impl Backend {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Apply one staged write. Bumps the touched key's version only when the
    /// write effectively changed state, matching the watch-invalidation rules
    /// of sorted-set stores (deleting an absent key dirties nothing).
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::SetPayload { key, value } => {
                self.payloads.insert(key.clone(), value);
                self.bump(&key);
            }
            WriteOp::DeletePayload { key } => {
                if self.payloads.remove(&key).is_some() {
                    self.bump(&key);
                }
            }
            WriteOp::ScheduleAdd {
                schedule,
                score,
                member,
            } => {
                if self
                    .schedules
                    .entry(schedule.clone())
                    .or_default()
                    .add(score, &member)
                {
                    self.bump(&schedule);
                }
            }
            WriteOp::ScheduleRemove { schedule, member } => {
                let changed = self
                    .schedules
                    .get_mut(&schedule)
                    .map(|s| s.remove(&member))
                    .unwrap_or(false);
                if changed {
                    self.bump(&schedule);
                    self.drop_if_empty(&schedule);
                }
            }
            WriteOp::ScheduleRemoveRangeByScore { schedule, range } => {
                let changed = self
                    .schedules
                    .get_mut(&schedule)
                    .map(|s| s.remove_range(&range))
                    .unwrap_or(false);
                if changed {
                    self.bump(&schedule);
                    self.drop_if_empty(&schedule);
                }
            }
        }
    }

    fn drop_if_empty(&mut self, schedule: &str) {
        if self
            .schedules
            .get(schedule)
            .map(Schedule::is_empty)
            .unwrap_or(false)
        {
            self.schedules.remove(schedule);
        }
    }
}

// ============================================================================
// MemoryTransactionalStore
// ============================================================================

/// In-memory store session.
///
/// All sessions created via [`handle`](Self::handle) share one backend but
/// keep independent watch sets, mirroring one connection per queue instance
/// against a shared server.
pub struct MemoryTransactionalStore {
    backend: Arc<Mutex<Backend>>,
    /// Watched key -> version observed at registration time
    watched: Mutex<HashMap<String, u64>>,
}

impl MemoryTransactionalStore {
    /// Create a store with a fresh, empty backend
    pub fn new() -> Self {
        Self {
            backend: Arc::new(Mutex::new(Backend::default())),
            watched: Mutex::new(HashMap::new()),
        }
    }

    /// New session over the same backend with an independent watch set
    pub fn handle(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            watched: Mutex::new(HashMap::new()),
        }
    }

    fn backend(&self) -> Result<MutexGuard<'_, Backend>, StoreError> {
        self.backend.lock().map_err(|_| StoreError::Driver {
            message: "backend lock poisoned".to_string(),
        })
    }

    fn watch_set(&self) -> Result<MutexGuard<'_, HashMap<String, u64>>, StoreError> {
        self.watched.lock().map_err(|_| StoreError::Driver {
            message: "watch set lock poisoned".to_string(),
        })
    }
}

impl Default for MemoryTransactionalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionalStore for MemoryTransactionalStore {
    async fn get_payload(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let backend = self.backend()?;
        Ok(backend.payloads.get(key).cloned())
    }

    async fn schedule_score(
        &self,
        schedule: &str,
        member: &str,
    ) -> Result<Option<i64>, StoreError> {
        let backend = self.backend()?;
        Ok(backend
            .schedules
            .get(schedule)
            .and_then(|s| s.score(member)))
    }

    async fn schedule_range_by_score(
        &self,
        schedule: &str,
        range: &TimestampRange,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let backend = self.backend()?;
        Ok(backend
            .schedules
            .get(schedule)
            .map(|s| s.range(range, limit))
            .unwrap_or_default())
    }

    async fn schedule_count_by_score(
        &self,
        schedule: &str,
        range: &TimestampRange,
    ) -> Result<u64, StoreError> {
        let backend = self.backend()?;
        Ok(backend
            .schedules
            .get(schedule)
            .map(|s| s.count(range))
            .unwrap_or(0))
    }

    async fn watch(&self, keys: &[String]) -> Result<(), StoreError> {
        let backend = self.backend()?;
        let mut watched = self.watch_set()?;
        for key in keys {
            // First registration wins; re-watching must not refresh the
            // observed version, or changes between the two would be missed
            watched
                .entry(key.clone())
                .or_insert_with(|| backend.version(key));
        }
        Ok(())
    }

    async fn unwatch(&self) -> Result<(), StoreError> {
        self.watch_set()?.clear();
        Ok(())
    }

    async fn commit(&self, tx: Transaction) -> Result<CommitOutcome, StoreError> {
        let mut backend = self.backend()?;
        let mut watched = self.watch_set()?;

        let conflicted = watched
            .iter()
            .any(|(key, observed)| backend.version(key) != *observed);
        watched.clear();
        if conflicted {
            return Ok(CommitOutcome::Aborted);
        }

        for op in tx.into_ops() {
            backend.apply(op);
        }
        Ok(CommitOutcome::Applied)
    }
}
