//! Message value types and timestamp ranges.

use crate::error::ValidationError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Stable external identifier of a queued message, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A complete queued message: identity plus its schedulable content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Scheduling key; the queue orders and selects by this score
    pub timestamp: i64,
    /// Opaque payload, never parsed by the queue
    #[serde(with = "bytes_serde")]
    pub data: Bytes,
}

impl Message {
    /// Create new message
    pub fn new(id: MessageId, timestamp: i64, data: Bytes) -> Self {
        Self {
            id,
            timestamp,
            data,
        }
    }

    /// Rebuild a message from its identity and id-less content
    pub fn from_data(id: MessageId, data: MessageData) -> Self {
        Self {
            id,
            timestamp: data.timestamp,
            data: data.data,
        }
    }

    /// The id-less half of this message
    pub fn message_data(&self) -> MessageData {
        MessageData {
            timestamp: self.timestamp,
            data: self.data.clone(),
        }
    }
}

/// The id-less half of a message: what `update` transforms produce and what
/// internal reads reconstruct from the schedule score and payload record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub timestamp: i64,
    #[serde(with = "bytes_serde")]
    pub data: Bytes,
}

impl MessageData {
    /// Create new message content
    pub fn new(timestamp: i64, data: Bytes) -> Self {
        Self { timestamp, data }
    }
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

// ============================================================================
// Timestamp Ranges
// ============================================================================

/// Inclusive timestamp range; an absent side is unbounded and maps to
/// negative/positive infinity in store range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimestampRange {
    min: Option<i64>,
    max: Option<i64>,
}

impl TimestampRange {
    /// Create a range with optional bounds, validated before any store access
    pub fn new(min: Option<i64>, max: Option<i64>) -> Result<Self, ValidationError> {
        if let (Some(min), Some(max)) = (min, max) {
            if max < min {
                return Err(ValidationError::OutOfRange {
                    field: "timestamp_range".to_string(),
                    message: format!("max ({}) is less than min ({})", max, min),
                });
            }
        }

        Ok(Self { min, max })
    }

    /// Range matching every timestamp
    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    /// Range bounded below only
    pub fn at_least(min: i64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    /// Range bounded above only
    pub fn at_most(max: i64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Lower bound, if any
    pub fn min(&self) -> Option<i64> {
        self.min
    }

    /// Upper bound, if any
    pub fn max(&self) -> Option<i64> {
        self.max
    }

    /// Check whether a timestamp falls inside the range
    pub fn contains(&self, timestamp: i64) -> bool {
        if let Some(min) = self.min {
            if timestamp < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if timestamp > max {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for TimestampRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let min = self
            .min
            .map_or_else(|| "-inf".to_string(), |v| v.to_string());
        let max = self
            .max
            .map_or_else(|| "+inf".to_string(), |v| v.to_string());
        write!(f, "[{}, {}]", min, max)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
