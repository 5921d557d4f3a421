//! Document layout strategies.
//!
//! A strategy decides how commits map onto documents. It owns the document
//! shape, the stream and snapshot queries, where each criteria property
//! lives inside a document, and which indexes back all of that. Keeping
//! these in one place keeps the codec, cursor provider and index manager
//! consistent with each other.
//!
//! - [`DocumentPerCommitStrategy`]: one document per commit, events nested
//!   under `events` (default)
//! - [`DocumentPerEventStrategy`]: one document per event

mod entry;
mod per_commit;
mod per_event;

use bson::{doc, Document};

use super::criteria::Property;
use super::document::{FindQuery, IndexSpec, SortOrder};
use super::{Result, StorageError};

pub use entry::SerializedDomainEvent;
pub use per_commit::DocumentPerCommitStrategy;
pub use per_event::DocumentPerEventStrategy;

/// Stored field names.
pub mod fields {
    pub const AGGREGATE_TYPE: &str = "aggregate_type";
    pub const AGGREGATE_ID: &str = "aggregate_id";
    pub const EVENT_ID: &str = "event_id";
    pub const SEQUENCE: &str = "sequence";
    pub const CREATED_AT: &str = "created_at";
    pub const PAYLOAD_TYPE: &str = "payload_type";
    pub const PAYLOAD_REVISION: &str = "payload_revision";
    pub const PAYLOAD: &str = "payload";
    pub const METADATA: &str = "metadata";

    pub const FIRST_SEQUENCE: &str = "first_sequence";
    pub const LAST_SEQUENCE: &str = "last_sequence";
    pub const FIRST_CREATED_AT: &str = "first_created_at";
    pub const LAST_CREATED_AT: &str = "last_created_at";
    pub const EVENTS: &str = "events";
}

/// Index names shared by both layouts.
pub const SNAPSHOT_INDEX: &str = "snapshot_stream";
pub const PAYLOAD_TYPE_INDEX: &str = "event_payload_type";
pub const CREATED_AT_INDEX: &str = "event_created_at";

/// Layout policy for event and snapshot documents.
pub trait StorageStrategy: Send + Sync {
    /// Short layout name for logs.
    fn name(&self) -> &'static str;

    /// Encode the entries of one validated commit.
    fn create_documents(
        &self,
        aggregate_type: &str,
        events: Vec<SerializedDomainEvent>,
    ) -> Vec<Document>;

    /// Encode a single snapshot entry.
    fn create_snapshot_document(
        &self,
        aggregate_type: &str,
        snapshot: SerializedDomainEvent,
    ) -> Document;

    /// Decode the entries stored in one document, in stored order.
    fn extract_entries(&self, document: &Document) -> Result<Vec<SerializedDomainEvent>>;

    /// Query for documents holding events with sequence >= `first_sequence`,
    /// ascending.
    fn stream_query(
        &self,
        aggregate_type: &str,
        aggregate_identifier: &str,
        first_sequence: u64,
    ) -> FindQuery;

    /// Prefix of event-level fields inside a document (`""` or `"events."`).
    fn event_prefix(&self) -> &'static str;

    /// Indexes on the events collection. The first is the unique commit index.
    fn event_indexes(&self) -> Vec<IndexSpec>;

    /// Whether criteria may only reference indexed fields.
    fn index_backed_queries(&self) -> bool;

    /// Query for an aggregate's snapshots, newest first.
    fn snapshot_query(&self, aggregate_type: &str, aggregate_identifier: &str) -> FindQuery {
        FindQuery::new(doc! {
            "aggregate_type": aggregate_type,
            "aggregate_id": aggregate_identifier,
        })
        .sorted_by(doc! { "sequence": -1 })
    }

    fn snapshot_indexes(&self) -> Vec<IndexSpec> {
        vec![IndexSpec::new(SNAPSHOT_INDEX)
            .key(fields::AGGREGATE_TYPE, SortOrder::Ascending)
            .key(fields::AGGREGATE_ID, SortOrder::Ascending)
            .key(fields::SEQUENCE, SortOrder::Descending)]
    }

    /// Document path of a criteria property in this layout.
    fn property_path(&self, property: &Property) -> Result<String> {
        let prefix = self.event_prefix();
        let path = match property {
            Property::AggregateType => fields::AGGREGATE_TYPE.to_string(),
            Property::AggregateIdentifier => fields::AGGREGATE_ID.to_string(),
            Property::SequenceNumber => format!("{prefix}{}", fields::SEQUENCE),
            Property::Timestamp => format!("{prefix}{}", fields::CREATED_AT),
            Property::PayloadType => format!("{prefix}{}", fields::PAYLOAD_TYPE),
            Property::PayloadRevision => format!("{prefix}{}", fields::PAYLOAD_REVISION),
            Property::MetaData(key) => {
                validate_metadata_key(key)?;
                format!("{prefix}{}.{key}", fields::METADATA)
            }
            Property::Payload(path) => {
                validate_payload_path(path)?;
                format!("{prefix}{}.{path}", fields::PAYLOAD)
            }
        };

        if self.index_backed_queries()
            && !self
                .event_indexes()
                .iter()
                .any(|index| index.covers_field(&path))
        {
            return Err(StorageError::InvalidCriteria(format!(
                "{path} is not backed by an index in the {} layout",
                self.name()
            )));
        }
        Ok(path)
    }
}

fn validate_metadata_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('$') || key.contains('.') {
        return Err(StorageError::InvalidCriteria(format!(
            "invalid metadata key {key:?}"
        )));
    }
    Ok(())
}

fn validate_payload_path(path: &str) -> Result<()> {
    if path
        .split('.')
        .any(|segment| segment.is_empty() || segment.starts_with('$'))
    {
        return Err(StorageError::InvalidCriteria(format!(
            "invalid payload path {path:?}"
        )));
    }
    Ok(())
}

/// Criteria indexes on event-level fields under `prefix`.
fn criteria_indexes(prefix: &str) -> Vec<IndexSpec> {
    vec![
        IndexSpec::new(PAYLOAD_TYPE_INDEX)
            .key(format!("{prefix}{}", fields::PAYLOAD_TYPE), SortOrder::Ascending),
        IndexSpec::new(CREATED_AT_INDEX)
            .key(format!("{prefix}{}", fields::CREATED_AT), SortOrder::Ascending),
    ]
}

/// `$gte` condition on a stored sequence field. Positions beyond
/// `i64::MAX` are never stored, so they select nothing.
fn at_or_after(first_sequence: u64) -> Document {
    match i64::try_from(first_sequence) {
        Ok(first) => doc! { "$gte": first },
        Err(_) => doc! { "$gt": i64::MAX },
    }
}

/// Required string field.
fn get_str<'a>(document: &'a Document, field: &str) -> Result<&'a str> {
    document
        .get_str(field)
        .map_err(|e| StorageError::MalformedDocument(format!("{field}: {e}")))
}

/// Required sequence field, stored as Int64 (Int32 accepted).
fn get_sequence(document: &Document, field: &str) -> Result<u64> {
    let value = match document.get(field) {
        Some(bson::Bson::Int64(v)) => *v,
        Some(bson::Bson::Int32(v)) => i64::from(*v),
        Some(other) => {
            return Err(StorageError::MalformedDocument(format!(
                "{field}: expected an integer, found {other}"
            )))
        }
        None => {
            return Err(StorageError::MalformedDocument(format!(
                "{field}: missing"
            )))
        }
    };
    u64::try_from(value)
        .map_err(|_| StorageError::MalformedDocument(format!("{field}: negative sequence {value}")))
}
