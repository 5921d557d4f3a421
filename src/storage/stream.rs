//! Lazy document streams and the per-aggregate stream query.

use bson::Document;
use tracing::debug;

use super::document::{DocumentCollection, DocumentCursor};
use super::strategy::StorageStrategy;
use super::Result;

/// Forward-only stream of stored documents.
///
/// Wraps a store cursor and translates store failures. Nothing is read
/// until the first [`next_document`](Self::next_document). Resources are
/// released by [`close`](Self::close), on exhaustion, on error and on drop.
pub struct DocumentStream {
    cursor: Box<dyn DocumentCursor>,
}

impl DocumentStream {
    pub fn new(cursor: Box<dyn DocumentCursor>) -> Self {
        Self { cursor }
    }

    /// Next document, or `None` once the stream is exhausted.
    pub async fn next_document(&mut self) -> Result<Option<Document>> {
        Ok(self.cursor.advance().await?)
    }

    pub async fn close(mut self) {
        self.cursor.close().await;
    }

    /// Drain the remaining documents.
    pub async fn collect_documents(mut self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        loop {
            match self.cursor.advance().await {
                Ok(Some(document)) => documents.push(document),
                Ok(None) => return Ok(documents),
                Err(e) => {
                    self.cursor.close().await;
                    return Err(e.into());
                }
            }
        }
    }
}

impl std::fmt::Debug for DocumentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStream").finish_non_exhaustive()
    }
}

/// Documents of one aggregate holding events with sequence number at or
/// after `first_sequence_number`, ascending.
///
/// In the per-commit layout a returned commit may start below
/// `first_sequence_number`; callers drop those events after decoding.
pub fn find_events(
    strategy: &dyn StorageStrategy,
    collection: &dyn DocumentCollection,
    aggregate_type: &str,
    aggregate_identifier: &str,
    first_sequence_number: u64,
) -> DocumentStream {
    let query = strategy.stream_query(aggregate_type, aggregate_identifier, first_sequence_number);
    debug!(
        collection = collection.name(),
        layout = strategy.name(),
        %aggregate_type,
        %aggregate_identifier,
        from = first_sequence_number,
        "Opening event stream"
    );
    DocumentStream::new(collection.find(query))
}
