//! Index provisioning.

use tracing::{error, info};

use super::document::{DocumentCollection, IndexSpec};
use super::strategy::StorageStrategy;
use super::{Result, StorageError};

/// Create the strategy's indexes on the events and snapshots collections.
///
/// Existing identical indexes are left alone, so this is safe to run on
/// every startup. Any failure, including an incompatible index under the
/// same name or key pattern, is returned as `IndexProvisioning`.
pub async fn ensure_indexes(
    strategy: &dyn StorageStrategy,
    events: &dyn DocumentCollection,
    snapshots: &dyn DocumentCollection,
) -> Result<()> {
    for index in strategy.event_indexes() {
        create(events, index).await?;
    }
    for index in strategy.snapshot_indexes() {
        create(snapshots, index).await?;
    }
    info!(
        layout = strategy.name(),
        events = events.name(),
        snapshots = snapshots.name(),
        "Indexes ensured"
    );
    Ok(())
}

async fn create(collection: &dyn DocumentCollection, index: IndexSpec) -> Result<()> {
    let name = format!("{}.{}", collection.name(), index.name);
    let unique = index.unique;
    collection.create_index(index).await.map_err(|e| {
        error!(index = %name, error = %e, "Index provisioning failed");
        StorageError::IndexProvisioning {
            index: name.clone(),
            reason: e.to_string(),
        }
    })?;
    info!(index = %name, unique, "Index ready");
    Ok(())
}
