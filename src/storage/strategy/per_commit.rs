//! Document-per-commit layout.
//!
//! ```text
//! {
//!   aggregate_type, aggregate_id,
//!   sequence, first_sequence, last_sequence,
//!   first_created_at, last_created_at,
//!   events: [ { event_id, sequence, created_at, payload_type, payload, metadata }, ... ]
//! }
//! ```
//!
//! The unique index on `first_sequence` rejects a second commit starting at
//! the same position. Replay selects commits by `last_sequence`, so a commit
//! straddling the requested start is returned whole.

use bson::{doc, Bson, Document};

use super::{
    at_or_after, criteria_indexes, fields, get_sequence, get_str, SerializedDomainEvent,
    StorageStrategy,
};
use crate::storage::document::{FindQuery, IndexSpec, SortOrder};
use crate::storage::{Result, StorageError};

pub const UNIQUE_COMMIT_INDEX: &str = "unique_commit";
pub const COMMIT_RANGE_INDEX: &str = "commit_range";

/// Stores every commit as one document with its events nested under `events`.
#[derive(Debug, Clone, Default)]
pub struct DocumentPerCommitStrategy {
    index_backed_queries: bool,
}

impl DocumentPerCommitStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject criteria on fields that no event index covers.
    pub fn with_index_backed_queries(mut self, enabled: bool) -> Self {
        self.index_backed_queries = enabled;
        self
    }

    fn commit_document(aggregate_type: &str, events: &[SerializedDomainEvent]) -> Document {
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Document::new();
        };

        let mut document = Document::new();
        document.insert(fields::AGGREGATE_TYPE, aggregate_type);
        document.insert(fields::AGGREGATE_ID, first.aggregate_identifier.clone());
        document.insert(fields::SEQUENCE, Bson::Int64(first.sequence_number as i64));
        document.insert(
            fields::FIRST_SEQUENCE,
            Bson::Int64(first.sequence_number as i64),
        );
        document.insert(fields::LAST_SEQUENCE, Bson::Int64(last.sequence_number as i64));
        document.insert(fields::FIRST_CREATED_AT, first.timestamp.clone());
        document.insert(fields::LAST_CREATED_AT, last.timestamp.clone());
        document.insert(
            fields::EVENTS,
            events
                .iter()
                .map(|event| Bson::Document(event.to_entry()))
                .collect::<Vec<_>>(),
        );
        document
    }
}

impl StorageStrategy for DocumentPerCommitStrategy {
    fn name(&self) -> &'static str {
        "per_commit"
    }

    fn create_documents(
        &self,
        aggregate_type: &str,
        events: Vec<SerializedDomainEvent>,
    ) -> Vec<Document> {
        if events.is_empty() {
            return Vec::new();
        }
        vec![Self::commit_document(aggregate_type, &events)]
    }

    fn create_snapshot_document(
        &self,
        aggregate_type: &str,
        snapshot: SerializedDomainEvent,
    ) -> Document {
        Self::commit_document(aggregate_type, std::slice::from_ref(&snapshot))
    }

    fn extract_entries(&self, document: &Document) -> Result<Vec<SerializedDomainEvent>> {
        let aggregate_identifier = get_str(document, fields::AGGREGATE_ID)?;
        let first_sequence = get_sequence(document, fields::FIRST_SEQUENCE)?;
        let events = document
            .get_array(fields::EVENTS)
            .map_err(|e| StorageError::MalformedDocument(format!("{}: {e}", fields::EVENTS)))?;

        let mut entries = Vec::with_capacity(events.len());
        for event in events {
            let Bson::Document(entry) = event else {
                return Err(StorageError::MalformedDocument(format!(
                    "commit {aggregate_identifier}@{first_sequence} holds a non-document event"
                )));
            };
            entries.push(SerializedDomainEvent::from_entry(aggregate_identifier, entry)?);
        }
        Ok(entries)
    }

    fn stream_query(
        &self,
        aggregate_type: &str,
        aggregate_identifier: &str,
        first_sequence: u64,
    ) -> FindQuery {
        FindQuery::new(doc! {
            "aggregate_type": aggregate_type,
            "aggregate_id": aggregate_identifier,
            "last_sequence": at_or_after(first_sequence),
        })
        .sorted_by(doc! { "last_sequence": 1 })
    }

    fn event_prefix(&self) -> &'static str {
        "events."
    }

    fn event_indexes(&self) -> Vec<IndexSpec> {
        let mut indexes = vec![
            IndexSpec::new(UNIQUE_COMMIT_INDEX)
                .key(fields::AGGREGATE_TYPE, SortOrder::Ascending)
                .key(fields::AGGREGATE_ID, SortOrder::Ascending)
                .key(fields::FIRST_SEQUENCE, SortOrder::Ascending)
                .unique(),
            IndexSpec::new(COMMIT_RANGE_INDEX)
                .key(fields::AGGREGATE_TYPE, SortOrder::Ascending)
                .key(fields::AGGREGATE_ID, SortOrder::Ascending)
                .key(fields::LAST_SEQUENCE, SortOrder::Ascending),
        ];
        indexes.extend(criteria_indexes(self.event_prefix()));
        indexes
    }

    fn index_backed_queries(&self) -> bool {
        self.index_backed_queries
    }
}
