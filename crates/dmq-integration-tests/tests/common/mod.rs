//! Shared helpers for integration tests.

use bytes::Bytes;
use dmq_runtime::{MemoryTransactionalStore, Message, Queue};

/// Build a message from plain parts
pub fn msg(id: &str, timestamp: i64, data: &str) -> Message {
    Message::new(id.parse().unwrap(), timestamp, Bytes::from(data.to_string()))
}

/// A queue with its own session over the shared backend
pub fn queue_for(backend: &MemoryTransactionalStore) -> Queue {
    Queue::with_store(Box::new(backend.handle()))
}
