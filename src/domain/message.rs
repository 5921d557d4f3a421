//! DomainEventMessage definition.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::MetaData;

/// One domain occurrence within an aggregate's event stream.
///
/// `P` is the typed payload. The storage layer never looks inside it; it is
/// handed to a [`Serializer`](crate::serialization::Serializer) on write and
/// reconstructed by the same serializer on read.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEventMessage<P> {
    /// Unique event identifier (UUID v4 unless supplied).
    pub identifier: String,
    /// Type identifier of the aggregate that produced the event.
    pub aggregate_type: String,
    /// Identifier of the aggregate that produced the event.
    pub aggregate_identifier: String,
    /// Position in the aggregate's stream, starting at 0.
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: P,
    pub metadata: MetaData,
}

impl<P> DomainEventMessage<P> {
    /// Create a message with a fresh identifier, the current time and empty metadata.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_identifier: impl Into<String>,
        sequence_number: u64,
        payload: P,
    ) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            aggregate_type: aggregate_type.into(),
            aggregate_identifier: aggregate_identifier.into(),
            sequence_number,
            timestamp: Utc::now(),
            payload,
            metadata: MetaData::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetaData) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Replace the payload, keeping identity, position and metadata.
    ///
    /// Used when one stored payload is upcast into several logical events.
    pub fn map_payload<Q>(self, payload: Q) -> DomainEventMessage<Q> {
        DomainEventMessage {
            identifier: self.identifier,
            aggregate_type: self.aggregate_type,
            aggregate_identifier: self.aggregate_identifier,
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            payload,
            metadata: self.metadata,
        }
    }
}
