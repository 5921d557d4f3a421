//! Index provisioning interface step definitions.

use bson::doc;
use cucumber::{given, then, when, World};

use docstream::storage::document::{IndexSpec, SortOrder};
use docstream::storage::{indexes, StorageError};

use crate::backend::{parse_layout, strategy_for, StoreBackend, StoreContext};

/// Test context for index provisioning scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct IndexWorld {
    backend: StoreBackend,
    context: Option<StoreContext>,
    last_error: Option<StorageError>,
}

impl IndexWorld {
    fn new() -> Self {
        Self {
            backend: StoreBackend::from_env(),
            context: None,
            last_error: None,
        }
    }

    fn context(&self) -> &StoreContext {
        self.context
            .as_ref()
            .expect("Store context not initialized")
    }

    async fn event_indexes(&self) -> Vec<IndexSpec> {
        self.context()
            .events
            .list_indexes()
            .await
            .expect("Failed to list indexes")
    }
}

// --- Background ---

#[given("a document store")]
async fn given_document_store(world: &mut IndexWorld) {
    println!("Using backend: {}", world.backend.name());
    world.context = Some(StoreContext::new(world.backend).await);
}

// --- Given steps ---

#[given(expr = "the events collection has a unique index {string} on {string}")]
async fn given_existing_index(world: &mut IndexWorld, name: String, field: String) {
    world
        .context()
        .events
        .create_index(IndexSpec::new(name).key(field, SortOrder::Ascending).unique())
        .await
        .expect("Failed to create index");
}

#[given(expr = "the events collection holds two events of {string} at sequence {int}")]
async fn given_duplicate_events(world: &mut IndexWorld, aggregate_id: String, sequence: i64) {
    let duplicate = doc! {
        "aggregate_type": "inventory",
        "aggregate_id": aggregate_id,
        "sequence": sequence,
    };
    world
        .context()
        .events
        .insert_many(vec![duplicate.clone(), duplicate])
        .await
        .expect("Failed to insert documents");
}

#[given("the document store is unavailable")]
async fn given_store_unavailable(world: &mut IndexWorld) {
    world.context().memory().set_available(false);
}

// --- When steps ---

#[when(expr = "I ensure the indexes of the {word} layout")]
async fn when_ensure(world: &mut IndexWorld, layout: String) {
    let strategy = strategy_for(parse_layout(&layout), false);
    let context = world.context();
    let result = indexes::ensure_indexes(
        strategy.as_ref(),
        context.events.as_ref(),
        context.snapshots.as_ref(),
    )
    .await;
    world.last_error = result.err();
}

// --- Then steps ---

#[then("provisioning succeeds")]
async fn then_succeeds(world: &mut IndexWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
}

#[then(expr = "provisioning fails for index {string}")]
async fn then_fails_for(world: &mut IndexWorld, expected: String) {
    match &world.last_error {
        Some(StorageError::IndexProvisioning { index, .. }) => assert_eq!(index, &expected),
        other => panic!("Expected IndexProvisioning, got {:?}", other),
    }
}

#[then("provisioning fails")]
async fn then_fails(world: &mut IndexWorld) {
    assert!(
        matches!(world.last_error, Some(StorageError::IndexProvisioning { .. })),
        "Expected IndexProvisioning, got {:?}",
        world.last_error
    );
}

#[then(expr = "the events collection has {int} indexes")]
async fn then_event_index_count(world: &mut IndexWorld, count: usize) {
    assert_eq!(world.event_indexes().await.len(), count);
}

#[then(expr = "the snapshots collection has {int} indexes")]
async fn then_snapshot_index_count(world: &mut IndexWorld, count: usize) {
    let indexes = world
        .context()
        .snapshots
        .list_indexes()
        .await
        .expect("Failed to list indexes");
    assert_eq!(indexes.len(), count);
}

#[then(expr = "the events collection has a unique index {string}")]
async fn then_unique_index(world: &mut IndexWorld, name: String) {
    let indexes = world.event_indexes().await;
    let index = indexes
        .iter()
        .find(|i| i.name == name)
        .unwrap_or_else(|| panic!("Index {} not found", name));
    assert!(index.unique, "Index {} is not unique", name);
}
