//! Merge strategy contract for batched upserts.
//!
//! When [`put_messages`](crate::queue::Queue::put_messages) finds a message
//! already stored under an incoming id, it asks a reducer to merge the two.
//! Reducers must be pure and deterministic: an aborted commit re-reads the
//! store and re-runs the reducer against the fresher snapshot, so a stateful
//! reducer would observe its own earlier, discarded results.

use crate::message::Message;

/// Merges a previously stored message with an incoming one
pub trait MessageReducer: Send + Sync {
    /// Produce the message to store given the prior and incoming versions.
    /// Both carry the same id; the result should too.
    fn reduce(&self, previous: &Message, incoming: &Message) -> Message;
}

impl<F> MessageReducer for F
where
    F: Fn(&Message, &Message) -> Message + Send + Sync,
{
    fn reduce(&self, previous: &Message, incoming: &Message) -> Message {
        self(previous, incoming)
    }
}

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod tests;
