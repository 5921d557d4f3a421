//! Layout-independent stored event entry.

use bson::{Bson, Document};

use super::{fields, get_sequence, get_str};
use crate::serialization::{SerializedObject, SerializedType};
use crate::storage::{Result, StorageError};

/// One event in stored form, before it is placed into a document.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedDomainEvent {
    pub event_identifier: String,
    pub aggregate_identifier: String,
    pub sequence_number: u64,
    /// RFC 3339 timestamp, as stored.
    pub timestamp: String,
    pub payload: SerializedObject,
    pub metadata: Document,
}

impl SerializedDomainEvent {
    /// Entry fields, without aggregate fields.
    pub(crate) fn to_entry(&self) -> Document {
        let mut entry = Document::new();
        entry.insert(fields::EVENT_ID, self.event_identifier.clone());
        // sequence numbers are validated to fit i64 before encoding
        entry.insert(fields::SEQUENCE, Bson::Int64(self.sequence_number as i64));
        entry.insert(fields::CREATED_AT, self.timestamp.clone());
        entry.insert(
            fields::PAYLOAD_TYPE,
            self.payload.serialized_type.name.clone(),
        );
        if let Some(revision) = &self.payload.serialized_type.revision {
            entry.insert(fields::PAYLOAD_REVISION, revision.clone());
        }
        entry.insert(fields::PAYLOAD, self.payload.data.clone());
        entry.insert(fields::METADATA, self.metadata.clone());
        entry
    }

    /// Read entry fields from `entry`.
    pub(crate) fn from_entry(aggregate_identifier: &str, entry: &Document) -> Result<Self> {
        let revision = match entry.get(fields::PAYLOAD_REVISION) {
            None | Some(Bson::Null) => None,
            Some(Bson::String(revision)) => Some(revision.clone()),
            Some(other) => {
                return Err(StorageError::MalformedDocument(format!(
                    "{}: expected a string, found {other}",
                    fields::PAYLOAD_REVISION
                )))
            }
        };
        let data = entry.get(fields::PAYLOAD).cloned().ok_or_else(|| {
            StorageError::MalformedDocument(format!("{}: missing", fields::PAYLOAD))
        })?;
        let metadata = match entry.get(fields::METADATA) {
            None | Some(Bson::Null) => Document::new(),
            Some(Bson::Document(metadata)) => metadata.clone(),
            Some(other) => {
                return Err(StorageError::MalformedDocument(format!(
                    "{}: expected a document, found {other}",
                    fields::METADATA
                )))
            }
        };

        Ok(Self {
            event_identifier: get_str(entry, fields::EVENT_ID)?.to_string(),
            aggregate_identifier: aggregate_identifier.to_string(),
            sequence_number: get_sequence(entry, fields::SEQUENCE)?,
            timestamp: get_str(entry, fields::CREATED_AT)?.to_string(),
            payload: SerializedObject::new(
                SerializedType::new(get_str(entry, fields::PAYLOAD_TYPE)?, revision),
                data,
            ),
            metadata,
        })
    }
}
