//! Commit codec.
//!
//! Validates commits, serializes payloads and hands the stored entries to a
//! [`StorageStrategy`] for placement into documents. On the way back it
//! decodes the entries of one document, runs every payload through the
//! upcaster chain and deserializes the result.

use bson::Document;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use super::strategy::{SerializedDomainEvent, StorageStrategy};
use super::{Result, StorageError};
use crate::domain::{DomainEventMessage, MetaData};
use crate::serialization::{SerializationError, Serializer, UpcastResult, UpcasterChain};

/// Stored form of a timestamp. RFC 3339 with nanoseconds and a `Z` suffix,
/// so lexicographic order is chronological order.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::MalformedDocument(format!("timestamp {value:?}: {e}")))
}

/// Check that `events` form one commit of `aggregate_type`.
fn validate_commit<P>(aggregate_type: &str, events: &[DomainEventMessage<P>]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(StorageError::InvalidCommit(
            "commit contains no events".to_string(),
        ));
    };

    for event in events {
        if event.aggregate_type != aggregate_type {
            return Err(StorageError::InvalidCommit(format!(
                "event {} belongs to aggregate type {}, expected {}",
                event.identifier, event.aggregate_type, aggregate_type
            )));
        }
        if event.aggregate_identifier != first.aggregate_identifier {
            return Err(StorageError::InvalidCommit(format!(
                "commit spans aggregates {} and {}",
                first.aggregate_identifier, event.aggregate_identifier
            )));
        }
        if event.sequence_number > i64::MAX as u64 {
            return Err(StorageError::InvalidCommit(format!(
                "sequence number {} out of range",
                event.sequence_number
            )));
        }
    }

    for pair in events.windows(2) {
        if pair[1].sequence_number != pair[0].sequence_number + 1 {
            return Err(StorageError::InvalidCommit(format!(
                "sequence numbers not contiguous: {} followed by {}",
                pair[0].sequence_number, pair[1].sequence_number
            )));
        }
    }
    Ok(())
}

fn serialize_event<P>(
    serializer: &dyn Serializer<P>,
    event: &DomainEventMessage<P>,
) -> Result<SerializedDomainEvent> {
    let payload = serializer
        .serialize(&event.payload)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(SerializedDomainEvent {
        event_identifier: event.identifier.clone(),
        aggregate_identifier: event.aggregate_identifier.clone(),
        sequence_number: event.sequence_number,
        timestamp: format_timestamp(&event.timestamp),
        payload,
        metadata: event.metadata.to_document(),
    })
}

/// Encode one commit into the documents of the strategy's layout.
pub fn create_documents<P>(
    strategy: &dyn StorageStrategy,
    aggregate_type: &str,
    serializer: &dyn Serializer<P>,
    events: &[DomainEventMessage<P>],
) -> Result<Vec<Document>> {
    validate_commit(aggregate_type, events)?;
    let entries = events
        .iter()
        .map(|event| serialize_event(serializer, event))
        .collect::<Result<Vec<_>>>()?;
    Ok(strategy.create_documents(aggregate_type, entries))
}

/// Encode a snapshot event.
pub fn create_snapshot_document<P>(
    strategy: &dyn StorageStrategy,
    aggregate_type: &str,
    serializer: &dyn Serializer<P>,
    snapshot: &DomainEventMessage<P>,
) -> Result<Document> {
    validate_commit(aggregate_type, std::slice::from_ref(snapshot))?;
    let entry = serialize_event(serializer, snapshot)?;
    Ok(strategy.create_snapshot_document(aggregate_type, entry))
}

/// Decode the event messages stored in `document`, ascending by sequence.
///
/// `aggregate_identifier` overrides the stored identifier when given. With
/// `skip_unknown_types`, payloads whose type neither the upcasters nor the
/// serializer resolve are left out instead of failing the read.
pub fn extract_event_messages<P>(
    strategy: &dyn StorageStrategy,
    document: &Document,
    aggregate_identifier: Option<&str>,
    serializer: &dyn Serializer<P>,
    upcasters: &UpcasterChain,
    skip_unknown_types: bool,
) -> Result<Vec<DomainEventMessage<P>>> {
    let aggregate_type = document
        .get_str(super::strategy::fields::AGGREGATE_TYPE)
        .map_err(|e| StorageError::MalformedDocument(format!("aggregate_type: {e}")))?
        .to_string();

    let mut entries = strategy.extract_entries(document)?;
    entries.sort_by_key(|entry| entry.sequence_number);

    let mut messages = Vec::with_capacity(entries.len());
    for entry in entries {
        let timestamp = parse_timestamp(&entry.timestamp)?;
        let metadata = MetaData::from_document(&entry.metadata).map_err(|key| {
            StorageError::MalformedDocument(format!("metadata value of {key} is not a scalar"))
        })?;

        let objects = match upcasters.upcast(entry.payload) {
            UpcastResult::Upcasted(objects) => objects,
            UpcastResult::UnknownType(serialized_type) if skip_unknown_types => {
                warn!(
                    payload_type = %serialized_type,
                    sequence = entry.sequence_number,
                    "Skipping event with unknown payload type"
                );
                continue;
            }
            UpcastResult::UnknownType(serialized_type) => {
                return Err(StorageError::Deserialization {
                    payload_type: serialized_type.to_string(),
                    reason: "unknown payload type".to_string(),
                });
            }
        };

        let aggregate_identifier = aggregate_identifier.unwrap_or(&entry.aggregate_identifier);
        for object in objects {
            let payload = match serializer.deserialize(&object) {
                Ok(payload) => payload,
                Err(SerializationError::UnknownType(payload_type)) if skip_unknown_types => {
                    warn!(
                        %payload_type,
                        sequence = entry.sequence_number,
                        "Skipping event with unknown payload type"
                    );
                    continue;
                }
                Err(e) => {
                    return Err(StorageError::Deserialization {
                        payload_type: object.serialized_type.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            messages.push(DomainEventMessage {
                identifier: entry.event_identifier.clone(),
                aggregate_type: aggregate_type.clone(),
                aggregate_identifier: aggregate_identifier.to_string(),
                sequence_number: entry.sequence_number,
                timestamp,
                payload,
                metadata: metadata.clone(),
            });
        }
    }
    Ok(messages)
}
