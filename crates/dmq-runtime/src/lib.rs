//! # DMQ Runtime
//!
//! Persistent, timestamp-ordered delayed-message queue layered over any
//! backing store that offers optimistic (watch-then-commit-or-abort)
//! transactions.
//!
//! This library provides:
//! - Store-agnostic queue operations (push, pop, update, batched upsert)
//! - Retry-bounded optimistic concurrency control across independent processes
//! - Caller-supplied conflict resolution for batched inserts
//! - A fully functional in-memory store for testing and development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue and store operations
//! - [`message`] - Message value types and timestamp ranges
//! - [`reducer`] - Merge strategy contract for batched upserts
//! - [`store`] - The optimistic-transaction store abstraction
//! - [`queue`] - The queue orchestrator

// Module declarations
pub mod error;
pub mod message;
pub mod queue;
pub mod reducer;
pub mod store;
pub mod stores;

// Re-export commonly used types at crate root for convenience
pub use error::{QueueError, StoreError, ValidationError};
pub use message::{Message, MessageData, MessageId, TimestampRange};
pub use queue::{Queue, QueueConfig};
pub use reducer::MessageReducer;
pub use store::{CommitOutcome, Transaction, TransactionalStore, WriteOp};
pub use stores::MemoryTransactionalStore;
