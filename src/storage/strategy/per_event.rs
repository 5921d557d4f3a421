//! Document-per-event layout.
//!
//! Each event is one document carrying the aggregate fields and the entry
//! fields inline. The unique index on `sequence` doubles as the replay
//! index. A commit spans several documents, which are written in order.

use bson::{doc, Document};

use super::{
    at_or_after, criteria_indexes, fields, get_str, SerializedDomainEvent, StorageStrategy,
};
use crate::storage::document::{FindQuery, IndexSpec, SortOrder};
use crate::storage::Result;

pub const UNIQUE_EVENT_INDEX: &str = "unique_event";

/// Stores every event as its own document.
#[derive(Debug, Clone, Default)]
pub struct DocumentPerEventStrategy {
    index_backed_queries: bool,
}

impl DocumentPerEventStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index_backed_queries(mut self, enabled: bool) -> Self {
        self.index_backed_queries = enabled;
        self
    }

    fn event_document(aggregate_type: &str, event: &SerializedDomainEvent) -> Document {
        let mut document = Document::new();
        document.insert(fields::AGGREGATE_TYPE, aggregate_type);
        document.insert(fields::AGGREGATE_ID, event.aggregate_identifier.clone());
        for (field, value) in event.to_entry() {
            document.insert(field, value);
        }
        document
    }
}

impl StorageStrategy for DocumentPerEventStrategy {
    fn name(&self) -> &'static str {
        "per_event"
    }

    fn create_documents(
        &self,
        aggregate_type: &str,
        events: Vec<SerializedDomainEvent>,
    ) -> Vec<Document> {
        events
            .iter()
            .map(|event| Self::event_document(aggregate_type, event))
            .collect()
    }

    fn create_snapshot_document(
        &self,
        aggregate_type: &str,
        snapshot: SerializedDomainEvent,
    ) -> Document {
        Self::event_document(aggregate_type, &snapshot)
    }

    fn extract_entries(&self, document: &Document) -> Result<Vec<SerializedDomainEvent>> {
        let aggregate_identifier = get_str(document, fields::AGGREGATE_ID)?;
        Ok(vec![SerializedDomainEvent::from_entry(
            aggregate_identifier,
            document,
        )?])
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
            "sequence": at_or_after(first_sequence),
        })
        .sorted_by(doc! { "sequence": 1 })
    }

    fn event_prefix(&self) -> &'static str {
        ""
    }

    fn event_indexes(&self) -> Vec<IndexSpec> {
        let mut indexes = vec![IndexSpec::new(UNIQUE_EVENT_INDEX)
            .key(fields::AGGREGATE_TYPE, SortOrder::Ascending)
            .key(fields::AGGREGATE_ID, SortOrder::Ascending)
            .key(fields::SEQUENCE, SortOrder::Ascending)
            .unique()];
        indexes.extend(criteria_indexes(self.event_prefix()));
        indexes
    }

    fn index_backed_queries(&self) -> bool {
        self.index_backed_queries
    }
}
