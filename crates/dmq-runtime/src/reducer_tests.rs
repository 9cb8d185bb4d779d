//! Tests for the reducer contract.

use super::*;
use bytes::Bytes;

#[test]
fn test_closure_acts_as_reducer() {
    let concat = |previous: &Message, incoming: &Message| {
        let mut data = previous.data.to_vec();
        data.extend_from_slice(&incoming.data);
        Message::new(incoming.id.clone(), incoming.timestamp, Bytes::from(data))
    };

    let previous = Message::new("a".parse().unwrap(), 100, Bytes::from("1"));
    let incoming = Message::new("a".parse().unwrap(), 200, Bytes::from("2"));

    let merged = MessageReducer::reduce(&concat, &previous, &incoming);
    assert_eq!(merged.data, Bytes::from("12"));
    assert_eq!(merged.timestamp, 200);
    assert_eq!(merged.id, previous.id);
}

#[test]
fn test_reducer_trait_object() {
    struct KeepEarliest;

    impl MessageReducer for KeepEarliest {
        fn reduce(&self, previous: &Message, incoming: &Message) -> Message {
            if previous.timestamp <= incoming.timestamp {
                previous.clone()
            } else {
                incoming.clone()
            }
        }
    }

    let reducer: &dyn MessageReducer = &KeepEarliest;
    let previous = Message::new("a".parse().unwrap(), 100, Bytes::from("old"));
    let incoming = Message::new("a".parse().unwrap(), 50, Bytes::from("new"));

    let merged = reducer.reduce(&previous, &incoming);
    assert_eq!(merged.timestamp, 50);
    assert_eq!(merged.data, Bytes::from("new"));
}
