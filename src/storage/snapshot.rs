//! Snapshot lookup.

use tracing::debug;

use super::document::DocumentCollection;
use super::strategy::StorageStrategy;
use super::stream::DocumentStream;

/// Snapshot documents of one aggregate, newest first. Callers take the
/// first document; an empty stream means no snapshot exists.
pub fn find_last_snapshot(
    strategy: &dyn StorageStrategy,
    collection: &dyn DocumentCollection,
    aggregate_type: &str,
    aggregate_identifier: &str,
) -> DocumentStream {
    debug!(
        collection = collection.name(),
        %aggregate_type,
        %aggregate_identifier,
        "Looking up latest snapshot"
    );
    DocumentStream::new(collection.find(strategy.snapshot_query(aggregate_type, aggregate_identifier)))
}
