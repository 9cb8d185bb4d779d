//! The queue orchestrator.
//!
//! `Queue` holds no state between calls; every operation is a bounded
//! sequence of watch/read/commit steps against the backing store, retried on
//! abort according to the operation's own policy. Correctness across
//! independent processes comes entirely from the store's optimistic
//! transactions, never from in-process locking.

use crate::error::{QueueError, StoreError};
use crate::message::{Message, MessageData, MessageId, TimestampRange};
use crate::reducer::MessageReducer;
use crate::store::{CommitOutcome, Transaction, TransactionalStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

/// Process-wide queue configuration, passed once at construction.
///
/// Key names determine the persisted layout and must match across every
/// process sharing one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Prefix for payload record keys; the message id is appended verbatim
    pub data_key_prefix: String,
    /// Key of the sorted set mapping message id to timestamp score
    pub timestamp_index_key: String,
    /// Retry bound for `update` and `pop` unless overridden per call
    pub default_retry_limit: i64,
    /// Retry bound for `put_messages` unless overridden per call
    pub default_put_retry_limit: i64,
    /// Candidates fetched per `clear` iteration
    pub clear_batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_key_prefix: "dmq:data:".to_string(),
            timestamp_index_key: "dmq:tsIndex".to_string(),
            default_retry_limit: 1000,
            default_put_retry_limit: 3,
            clear_batch_size: 1000,
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Timestamp-ordered delayed-message queue over an optimistic-transaction
/// store.
///
/// Safe to call concurrently from many tasks, threads, or processes sharing
/// one backing store, provided each `Queue` owns its own store session (watch
/// sets are per-session).
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use dmq_runtime::{MemoryTransactionalStore, Message, Queue, TimestampRange};
///
/// # tokio_test::block_on(async {
/// let store = MemoryTransactionalStore::new();
/// let queue = Queue::with_store(Box::new(store.handle()));
///
/// let message = Message::new("a".parse().unwrap(), 100, Bytes::from("x"));
/// queue.push(&message).await.unwrap();
///
/// let popped = queue.pop(TimestampRange::unbounded()).await.unwrap();
/// assert_eq!(popped, Some(message));
/// # });
/// ```
pub struct Queue {
    store: Box<dyn TransactionalStore>,
    config: QueueConfig,
}

impl Queue {
    /// Create a queue over a store session with explicit configuration
    pub fn new(store: Box<dyn TransactionalStore>, config: QueueConfig) -> Self {
        Self { store, config }
    }

    /// Create a queue with the default persisted layout and retry bounds
    pub fn with_store(store: Box<dyn TransactionalStore>) -> Self {
        Self::new(store, QueueConfig::default())
    }

    /// The configuration this queue was built with
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // push
    // ------------------------------------------------------------------

    /// Store a message: payload record plus schedule entry, atomically.
    ///
    /// No watch is registered, so an abort signals an unrelated store race;
    /// the caller owns the decision to retry the whole push.
    pub async fn push(&self, message: &Message) -> Result<(), QueueError> {
        match self.try_push(message).await? {
            CommitOutcome::Applied => Ok(()),
            CommitOutcome::Aborted => Err(QueueError::PushConflict),
        }
    }

    // ------------------------------------------------------------------
    // update
    // ------------------------------------------------------------------

    /// Replace a message in place via a transform, using the configured
    /// retry bound.
    ///
    /// See [`update_with_retry_limit`](Self::update_with_retry_limit).
    pub async fn update<F>(&self, id: &MessageId, transform: F) -> Result<(), QueueError>
    where
        F: Fn(&Message) -> Option<MessageData>,
    {
        self.update_with_retry_limit(id, transform, self.config.default_retry_limit)
            .await
    }

    /// Replace a message in place via a transform, with an explicit retry
    /// bound.
    ///
    /// The transform only ever runs against a fully present message; a
    /// missing id fails fast with [`QueueError::MessageNotFound`]. A
    /// transform returning `None` declares its own input unusable and fails
    /// fast with [`QueueError::InvalidTransform`]; that is a caller bug,
    /// never retried. Commit aborts (a racing writer touched the payload
    /// between watch and commit) retry from a fresh read, up to
    /// `retry_limit` extra attempts.
    pub async fn update_with_retry_limit<F>(
        &self,
        id: &MessageId,
        transform: F,
        retry_limit: i64,
    ) -> Result<(), QueueError>
    where
        F: Fn(&Message) -> Option<MessageData>,
    {
        validate_retry_limit(retry_limit)?;
        let data_key = self.data_key(id.as_str());

        for attempt in 0..=retry_limit {
            self.store.watch(std::slice::from_ref(&data_key)).await?;

            let current = match self.read_message_data(id.as_str()).await? {
                Some(data) => Message::from_data(id.clone(), data),
                None => {
                    self.store.unwatch().await?;
                    return Err(QueueError::MessageNotFound {
                        id: id.to_string(),
                    });
                }
            };

            let replacement = match transform(&current) {
                Some(data) => Message::from_data(id.clone(), data),
                None => {
                    self.store.unwatch().await?;
                    return Err(QueueError::InvalidTransform { id: id.to_string() });
                }
            };

            match self.try_push(&replacement).await? {
                CommitOutcome::Applied => return Ok(()),
                CommitOutcome::Aborted => {
                    debug!(id = %id, attempt, "update aborted by concurrent writer, retrying");
                }
            }
        }

        Err(QueueError::RetryLimitExceeded {
            limit: retry_limit,
            attempts: (retry_limit + 1) as u64,
        })
    }

    // ------------------------------------------------------------------
    // pop
    // ------------------------------------------------------------------

    /// Remove and return the earliest-scheduled message in the range, using
    /// the configured retry bound.
    ///
    /// See [`pop_with_retry_limit`](Self::pop_with_retry_limit).
    pub async fn pop(&self, range: TimestampRange) -> Result<Option<Message>, QueueError> {
        self.pop_with_retry_limit(range, self.config.default_retry_limit)
            .await
    }

    /// Remove and return the earliest-scheduled message in the range, with an
    /// explicit retry bound.
    ///
    /// Returns `Ok(None)` when the range holds no messages, and also when
    /// the retry bound is exhausted by contention. Unlike `update`, pop is
    /// not pinned to one identity: a lost race just means the candidate went
    /// to another consumer, and the next attempt re-queries the live
    /// candidate set.
    pub async fn pop_with_retry_limit(
        &self,
        range: TimestampRange,
        retry_limit: i64,
    ) -> Result<Option<Message>, QueueError> {
        validate_retry_limit(retry_limit)?;

        for attempt in 0..=retry_limit {
            let candidates = self
                .store
                .schedule_range_by_score(&self.config.timestamp_index_key, &range, 1)
                .await?;
            let Some(id) = candidates.into_iter().next() else {
                return Ok(None);
            };

            let data_key = self.data_key(&id);
            self.store.watch(std::slice::from_ref(&data_key)).await?;

            // Re-read both halves after the watch; the candidate may already
            // be gone, consumed between the range query and here
            let Some(data) = self.read_message_data(&id).await? else {
                self.store.unwatch().await?;
                debug!(id = %id, attempt, "pop candidate vanished, retrying");
                continue;
            };

            let tx = Transaction::new()
                .delete_payload(data_key)
                .schedule_remove(&self.config.timestamp_index_key, &id);
            match self.store.commit(tx).await? {
                CommitOutcome::Applied => {
                    return Ok(Some(Message::from_data(parse_member_id(&id)?, data)));
                }
                CommitOutcome::Aborted => {
                    debug!(id = %id, attempt, "pop lost the race, retrying");
                }
            }
        }

        Ok(None)
    }

    // ------------------------------------------------------------------
    // put_messages
    // ------------------------------------------------------------------

    /// Batched upsert-with-merge, using the configured retry bound.
    ///
    /// See [`put_messages_with_retry_limit`](Self::put_messages_with_retry_limit).
    pub async fn put_messages(
        &self,
        messages: &[Message],
        reducer: &dyn MessageReducer,
    ) -> Result<(), QueueError> {
        self.put_messages_with_retry_limit(messages, reducer, self.config.default_put_retry_limit)
            .await
    }

    /// Batched upsert-with-merge, with an explicit retry bound.
    ///
    /// Messages without a stored counterpart are written as-is; the rest are
    /// merged through the reducer against the freshest visible snapshot. Ids
    /// repeated within one batch fold left to right against the running merge
    /// result. An aborted commit restarts from the original input list;
    /// merge results are recomputed, never carried over.
    pub async fn put_messages_with_retry_limit(
        &self,
        messages: &[Message],
        reducer: &dyn MessageReducer,
        retry_limit: i64,
    ) -> Result<(), QueueError> {
        if messages.is_empty() {
            return Ok(());
        }
        validate_retry_limit(retry_limit)?;

        let watch_keys: Vec<String> = messages
            .iter()
            .map(|m| self.data_key(m.id.as_str()))
            .collect();

        for attempt in 0..=retry_limit {
            self.store.watch(&watch_keys).await?;

            // Merge in input order; `order` keeps the staging order stable
            // while `merged` tracks the running result per id
            let mut merged: HashMap<String, Message> = HashMap::new();
            let mut order: Vec<String> = Vec::new();
            for incoming in messages {
                let id = incoming.id.as_str();
                let prior = match merged.get(id) {
                    Some(m) => Some(m.clone()),
                    None => self
                        .read_message_data(id)
                        .await?
                        .map(|data| Message::from_data(incoming.id.clone(), data)),
                };
                let result = match prior {
                    Some(previous) => reducer.reduce(&previous, incoming),
                    None => incoming.clone(),
                };
                if !merged.contains_key(id) {
                    order.push(id.to_string());
                }
                merged.insert(id.to_string(), result);
            }

            let mut tx = Transaction::new();
            for id in &order {
                let message = &merged[id];
                tx = tx
                    .set_payload(self.data_key(id), message.data.clone())
                    .schedule_add(&self.config.timestamp_index_key, message.timestamp, id);
            }

            match self.store.commit(tx).await? {
                CommitOutcome::Applied => return Ok(()),
                CommitOutcome::Aborted => {
                    debug!(
                        batch = messages.len(),
                        attempt, "put_messages aborted by concurrent writer, retrying"
                    );
                }
            }
        }

        Err(QueueError::RetryLimitExceeded {
            limit: retry_limit,
            attempts: (retry_limit + 1) as u64,
        })
    }

    // ------------------------------------------------------------------
    // count / clear
    // ------------------------------------------------------------------

    /// Number of messages whose timestamp falls in the range.
    ///
    /// Read-only; counts schedule entries, unaffected by transient payload
    /// visibility races.
    pub async fn count(&self, range: TimestampRange) -> Result<u64, QueueError> {
        Ok(self
            .store
            .schedule_count_by_score(&self.config.timestamp_index_key, &range)
            .await?)
    }

    /// Remove every message whose timestamp falls in the range.
    ///
    /// Drains in batches with no retry bound: an aborted batch leaves its
    /// candidates in place to be re-selected, so the loop converges once
    /// writers quiesce.
    ///
    /// Known hazard, kept for contract compatibility: each batch removes the
    /// *entire* matching range from the schedule but deletes payloads only
    /// for the *fetched* candidates. A message pushed into the range between
    /// the fetch and the commit loses its schedule entry while its payload
    /// survives orphaned.
    pub async fn clear(&self, range: TimestampRange) -> Result<(), QueueError> {
        loop {
            let candidates = self
                .store
                .schedule_range_by_score(
                    &self.config.timestamp_index_key,
                    &range,
                    self.config.clear_batch_size,
                )
                .await?;
            if candidates.is_empty() {
                return Ok(());
            }

            let watch_keys: Vec<String> =
                candidates.iter().map(|id| self.data_key(id)).collect();
            self.store.watch(&watch_keys).await?;

            let mut tx = Transaction::new()
                .schedule_remove_range_by_score(&self.config.timestamp_index_key, range);
            for key in watch_keys {
                tx = tx.delete_payload(key);
            }

            if self.store.commit(tx).await? == CommitOutcome::Aborted {
                debug!(batch = candidates.len(), "clear batch aborted, re-selecting");
            }
        }
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn data_key(&self, id: &str) -> String {
        format!("{}{}", self.config.data_key_prefix, id)
    }

    /// Stage and commit the two halves of a message in one transaction
    async fn try_push(&self, message: &Message) -> Result<CommitOutcome, StoreError> {
        let tx = Transaction::new()
            .set_payload(self.data_key(message.id.as_str()), message.data.clone())
            .schedule_add(
                &self.config.timestamp_index_key,
                message.timestamp,
                message.id.as_str(),
            );
        self.store.commit(tx).await
    }

    /// Read both halves of a message; `None` unless both exist.
    ///
    /// Seeing exactly one half means a racing writer tore our observation;
    /// callers treat that as "not currently a valid message" and retry,
    /// never as partial data.
    async fn read_message_data(&self, id: &str) -> Result<Option<MessageData>, StoreError> {
        let score = self
            .store
            .schedule_score(&self.config.timestamp_index_key, id)
            .await?;
        let Some(timestamp) = score else {
            return Ok(None);
        };
        let payload = self.store.get_payload(&self.data_key(id)).await?;
        Ok(payload.map(|data| MessageData::new(timestamp, data)))
    }
}

/// Parse a schedule member back into a message id
fn parse_member_id(member: &str) -> Result<MessageId, StoreError> {
    MessageId::from_str(member).map_err(|err| StoreError::MalformedResponse {
        message: format!("schedule member is not a valid message id: {}", err),
    })
}

/// Negative retry limits are caller misuse, rejected before any store access
fn validate_retry_limit(retry_limit: i64) -> Result<(), QueueError> {
    if retry_limit < 0 {
        return Err(QueueError::InvalidRetryLimit { value: retry_limit });
    }
    Ok(())
}
