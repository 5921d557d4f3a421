//! Storage layer.
//!
//! Maps aggregate event streams onto a document store:
//! - [`codec`]: commit validation, encoding and decoding
//! - [`stream`]: lazy per-aggregate replay
//! - [`criteria`]: storage-agnostic queries across aggregates
//! - [`snapshot`]: latest-snapshot lookup
//! - [`indexes`]: index provisioning
//! - [`event_store`]: the service composing all of the above

use std::sync::Arc;

use tracing::info;

use crate::config::{LayoutPolicy, StorageConfig, StorageType};

pub mod codec;
pub mod criteria;
pub mod document;
mod error;
pub mod event_store;
pub mod indexes;
pub mod snapshot;
pub mod strategy;
pub mod stream;

pub use criteria::{timestamp_value, Criteria, Property};
pub use document::{DocumentCollection, DocumentCursor, MemoryDocumentStore};
pub use error::{Result, StorageError};
pub use event_store::DocumentEventStore;
pub use strategy::{DocumentPerCommitStrategy, DocumentPerEventStrategy, StorageStrategy};
pub use stream::DocumentStream;

#[cfg(feature = "mongodb")]
pub use document::MongoDocumentStore;

/// Collection handles and layout built from configuration.
#[derive(Clone)]
pub struct StorageHandles {
    pub strategy: Arc<dyn StorageStrategy>,
    pub events: Arc<dyn DocumentCollection>,
    pub snapshots: Arc<dyn DocumentCollection>,
    pub skip_unknown_types: bool,
}

/// Build the configured layout strategy.
pub fn build_strategy(config: &StorageConfig) -> Arc<dyn StorageStrategy> {
    match config.layout {
        LayoutPolicy::PerCommit => Arc::new(
            DocumentPerCommitStrategy::new()
                .with_index_backed_queries(config.index_backed_queries),
        ),
        LayoutPolicy::PerEvent => Arc::new(
            DocumentPerEventStrategy::new().with_index_backed_queries(config.index_backed_queries),
        ),
    }
}

/// Initialize storage based on configuration.
///
/// Connects to the configured store and returns handles to the events and
/// snapshots collections. Indexes are not created here; see
/// [`indexes::ensure_indexes`].
pub async fn init_storage(config: &StorageConfig) -> Result<StorageHandles> {
    info!(
        "Storage: {} ({} layout), collections {}/{}",
        config.storage_type, config.layout, config.events_collection, config.snapshots_collection
    );

    let strategy = build_strategy(config);

    match config.storage_type {
        StorageType::Memory => {
            if config.memory.max_cursors == 0 {
                return Err(StorageError::Config(
                    "memory.max_cursors must be at least 1".to_string(),
                ));
            }
            let store = MemoryDocumentStore::with_max_cursors(config.memory.max_cursors);
            Ok(StorageHandles {
                strategy,
                events: Arc::new(store.collection(&config.events_collection).await),
                snapshots: Arc::new(store.collection(&config.snapshots_collection).await),
                skip_unknown_types: config.skip_unknown_types,
            })
        }
        #[cfg(feature = "mongodb")]
        StorageType::Mongodb => {
            let store =
                MongoDocumentStore::connect(&config.mongodb.uri, &config.mongodb.database).await?;
            Ok(StorageHandles {
                strategy,
                events: Arc::new(store.collection(&config.events_collection)),
                snapshots: Arc::new(store.collection(&config.snapshots_collection)),
                skip_unknown_types: config.skip_unknown_types,
            })
        }
        #[cfg(not(feature = "mongodb"))]
        StorageType::Mongodb => {
            tracing::error!("MongoDB storage requested but 'mongodb' feature is not enabled");
            Err(StorageError::Config(
                "MongoDB feature not enabled".to_string(),
            ))
        }
    }
}
