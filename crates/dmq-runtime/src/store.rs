//! The optimistic-transaction store abstraction.
//!
//! The queue requires only a small contract from its backing store: plain
//! reads of payload records and schedule entries, a watch protocol that
//! registers a read-set, and an atomic commit of staged writes that aborts
//! when any watched key changed since registration. Anything a concrete
//! driver does beyond that (stale reads, compression quirks, reconnects) is
//! the adapter's concern and must never leak into queue logic.

use crate::error::StoreError;
use crate::message::TimestampRange;
use async_trait::async_trait;
use bytes::Bytes;

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Result of submitting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All staged writes were applied atomically
    Applied,
    /// A watched key changed since registration; zero writes were applied
    Aborted,
}

impl CommitOutcome {
    /// Check whether the transaction was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// A single staged write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    SetPayload { key: String, value: Bytes },
    DeletePayload { key: String },
    ScheduleAdd {
        schedule: String,
        score: i64,
        member: String,
    },
    ScheduleRemove { schedule: String, member: String },
    ScheduleRemoveRangeByScore {
        schedule: String,
        range: TimestampRange,
    },
}

/// An ordered batch of staged writes, applied atomically on commit.
///
/// Built up by the queue between its reads and the commit; the store never
/// sees individual writes outside a transaction.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    /// Begin an empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a payload write
    pub fn set_payload(mut self, key: impl Into<String>, value: Bytes) -> Self {
        self.ops.push(WriteOp::SetPayload {
            key: key.into(),
            value,
        });
        self
    }

    /// Stage a payload deletion
    pub fn delete_payload(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::DeletePayload { key: key.into() });
        self
    }

    /// Stage a schedule entry insertion or score replacement
    pub fn schedule_add(
        mut self,
        schedule: impl Into<String>,
        score: i64,
        member: impl Into<String>,
    ) -> Self {
        self.ops.push(WriteOp::ScheduleAdd {
            schedule: schedule.into(),
            score,
            member: member.into(),
        });
        self
    }

    /// Stage a schedule entry removal
    pub fn schedule_remove(mut self, schedule: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::ScheduleRemove {
            schedule: schedule.into(),
            member: member.into(),
        });
        self
    }

    /// Stage removal of every schedule entry whose score falls in the range
    pub fn schedule_remove_range_by_score(
        mut self,
        schedule: impl Into<String>,
        range: TimestampRange,
    ) -> Self {
        self.ops.push(WriteOp::ScheduleRemoveRangeByScore {
            schedule: schedule.into(),
            range,
        });
        self
    }

    /// Check whether any writes are staged
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Staged writes, in staging order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the transaction, yielding its staged writes
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Contract a backing store must fulfil for the queue to run on it.
///
/// One value of this trait represents one connection-like session: the watch
/// set registered via [`watch`](Self::watch) belongs to this session alone
/// and is consumed by the next [`commit`](Self::commit) or cleared by
/// [`unwatch`](Self::unwatch). Independent queue instances must use
/// independent sessions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Read a payload record, `None` when absent
    async fn get_payload(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Read the score of a schedule member, `None` when absent
    async fn schedule_score(
        &self,
        schedule: &str,
        member: &str,
    ) -> Result<Option<i64>, StoreError>;

    /// Members whose score falls in the range, ascending by score with a
    /// deterministic tie order, at most `limit` of them
    async fn schedule_range_by_score(
        &self,
        schedule: &str,
        range: &TimestampRange,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Number of members whose score falls in the range
    async fn schedule_count_by_score(
        &self,
        schedule: &str,
        range: &TimestampRange,
    ) -> Result<u64, StoreError>;

    /// Register keys in this session's read-set; a later commit aborts if any
    /// of them changed since registration
    async fn watch(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Discard this session's read-set without committing
    async fn unwatch(&self) -> Result<(), StoreError>;

    /// Apply all staged writes atomically, or none when a watched key changed.
    /// The watch set is consumed either way.
    async fn commit(&self, tx: Transaction) -> Result<CommitOutcome, StoreError>;
}
