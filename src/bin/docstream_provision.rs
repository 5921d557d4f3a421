//! docstream-provision: create storage indexes
//!
//! Loads configuration, connects to the configured document store and
//! ensures the layout's indexes on the events and snapshots collections.
//! Run once per deployment before writers start; safe to re-run.
//!
//! ## Usage
//! ```text
//! docstream-provision [--config <path>]
//! ```
//!
//! ## Configuration
//! - storage.type: "memory" or "mongodb"
//! - storage.layout: "per_commit" (default) or "per_event"
//! - storage.events_collection / storage.snapshots_collection
//! - storage.mongodb.uri / storage.mongodb.database

use tracing::{error, info};

use docstream::config::Config;
use docstream::storage::{indexes, init_storage};
use docstream::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let handles = init_storage(&config.storage).await.map_err(|e| {
        error!("Failed to initialize storage: {}", e);
        e
    })?;

    indexes::ensure_indexes(
        handles.strategy.as_ref(),
        handles.events.as_ref(),
        handles.snapshots.as_ref(),
    )
    .await
    .map_err(|e| {
        error!("Index provisioning failed: {}", e);
        e
    })?;

    info!(
        storage = %config.storage.storage_type,
        layout = %config.storage.layout,
        "docstream-provision finished"
    );
    Ok(())
}
