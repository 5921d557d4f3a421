//! Event store interface step definitions.
//!
//! Covers appends, replay, snapshots and criteria scans through
//! [`DocumentEventStore`].

use std::sync::Arc;

use bson::doc;
use cucumber::{given, then, when, World};

use docstream::config::LayoutPolicy;
use docstream::domain::DomainEventMessage;
use docstream::serialization::{BsonSerializer, Serializer};
use docstream::storage::{codec, Criteria, DocumentEventStore, Property, StorageError};

use super::fixtures::{make_commit, parse_list, rewrite_entry, InventoryEvent, AGGREGATE_TYPE};
use crate::backend::{parse_layout, strategy_for, StoreBackend, StoreContext};

/// Test context for EventStore scenarios.
#[derive(Debug, World)]
#[world(init = Self::new)]
pub struct EventStoreWorld {
    backend: StoreBackend,
    context: Option<StoreContext>,
    layout: LayoutPolicy,
    index_backed_queries: bool,
    skip_unknown_types: bool,
    events: Vec<DomainEventMessage<InventoryEvent>>,
    last_error: Option<StorageError>,
}

impl EventStoreWorld {
    fn new() -> Self {
        Self {
            backend: StoreBackend::from_env(),
            context: None,
            layout: LayoutPolicy::PerCommit,
            index_backed_queries: false,
            skip_unknown_types: false,
            events: Vec::new(),
            last_error: None,
        }
    }

    fn context(&self) -> &StoreContext {
        self.context
            .as_ref()
            .expect("Store context not initialized")
    }

    fn store(&self) -> DocumentEventStore<InventoryEvent> {
        let strategy = strategy_for(self.layout, self.index_backed_queries);
        let serializer: Arc<dyn Serializer<InventoryEvent>> = Arc::new(BsonSerializer::new());
        DocumentEventStore::new(
            self.context().handles(strategy, self.skip_unknown_types),
            serializer,
        )
    }

    /// Fresh collections with the layout's indexes in place.
    async fn open(&mut self) {
        self.context = Some(StoreContext::new(self.backend).await);
        self.store()
            .ensure_indexes()
            .await
            .expect("Failed to ensure indexes");
    }

    fn record<T>(&mut self, result: Result<T, StorageError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(e) => {
                self.last_error = Some(e);
                None
            }
        }
    }

    fn snapshot(aggregate_id: &str, sequence: u64) -> DomainEventMessage<InventoryEvent> {
        DomainEventMessage::new(
            AGGREGATE_TYPE,
            aggregate_id,
            sequence,
            InventoryEvent::Snapshot {
                on_hand: sequence as i64,
            },
        )
    }

    async fn visit(&mut self, criteria: Criteria) {
        let mut visited = Vec::new();
        let result = self
            .store()
            .visit_events(&criteria, |message| visited.push(message))
            .await;
        if self.record(result).is_some() {
            self.events = visited;
        }
    }
}

// --- Background ---

#[given(expr = "an event store with the {word} layout")]
async fn given_event_store(world: &mut EventStoreWorld, layout: String) {
    println!("Using backend: {}", world.backend.name());
    world.layout = parse_layout(&layout);
    world.open().await;
}

#[given(expr = "an event store with the {word} layout and index-backed queries")]
async fn given_event_store_index_backed(world: &mut EventStoreWorld, layout: String) {
    world.layout = parse_layout(&layout);
    world.index_backed_queries = true;
    world.open().await;
}

// --- Given steps ---

#[given(expr = "a commit for {string} of {int} events starting at sequence {int}")]
async fn given_commit(world: &mut EventStoreWorld, aggregate_id: String, count: u64, first: u64) {
    world
        .store()
        .append_events(AGGREGATE_TYPE, &make_commit(&aggregate_id, first, count, "main"))
        .await
        .expect("Failed to append commit");
}

#[given(expr = "a commit for {string} of {int} events starting at sequence {int} in warehouse {string}")]
async fn given_commit_in_warehouse(
    world: &mut EventStoreWorld,
    aggregate_id: String,
    count: u64,
    first: u64,
    warehouse: String,
) {
    world
        .store()
        .append_events(
            AGGREGATE_TYPE,
            &make_commit(&aggregate_id, first, count, &warehouse),
        )
        .await
        .expect("Failed to append commit");
}

#[given(expr = "a snapshot of {string} at sequence {int}")]
async fn given_snapshot(world: &mut EventStoreWorld, aggregate_id: String, sequence: u64) {
    world
        .store()
        .append_snapshot_event(AGGREGATE_TYPE, &EventStoreWorld::snapshot(&aggregate_id, sequence))
        .await
        .expect("Failed to store snapshot");
}

#[given(expr = "an unreadable snapshot of {string} at sequence {int}")]
async fn given_unreadable_snapshot(world: &mut EventStoreWorld, aggregate_id: String, sequence: u64) {
    let store = world.store();
    let mut document = codec::create_snapshot_document(
        store.strategy(),
        AGGREGATE_TYPE,
        &BsonSerializer::<InventoryEvent>::new(),
        &EventStoreWorld::snapshot(&aggregate_id, sequence),
    )
    .expect("Failed to encode snapshot");
    rewrite_entry(&mut document, sequence, "inventory.Retired", doc! {});

    world
        .context()
        .snapshots
        .insert_many(vec![document])
        .await
        .expect("Failed to store snapshot");
}

#[given("unknown payload types are skipped")]
async fn given_skip_unknown(world: &mut EventStoreWorld) {
    world.skip_unknown_types = true;
}

#[given("the document store is unavailable")]
async fn given_store_unavailable(world: &mut EventStoreWorld) {
    world.context().memory().set_available(false);
}

// --- When steps ---

#[when(expr = "I append a commit for {string} of {int} events starting at sequence {int}")]
async fn when_append(world: &mut EventStoreWorld, aggregate_id: String, count: u64, first: u64) {
    let result = world
        .store()
        .append_events(AGGREGATE_TYPE, &make_commit(&aggregate_id, first, count, "main"))
        .await;
    world.record(result);
}

#[when(expr = "I read the events of {string}")]
async fn when_read(world: &mut EventStoreWorld, aggregate_id: String) {
    let result = world.store().read_events(AGGREGATE_TYPE, &aggregate_id).await;
    world.events = world.record(result).unwrap_or_default();
}

#[when(expr = "I read the events of {string} from sequence {int}")]
async fn when_read_from(world: &mut EventStoreWorld, aggregate_id: String, first: u64) {
    let result = world
        .store()
        .read_events_from(AGGREGATE_TYPE, &aggregate_id, first)
        .await;
    world.events = world.record(result).unwrap_or_default();
}

#[when(expr = "I visit events with payload type {string}")]
async fn when_visit_payload_type(world: &mut EventStoreWorld, payload_type: String) {
    world.visit(Property::PayloadType.is(payload_type)).await;
}

#[when(expr = "I visit events with metadata {string} equal to {string}")]
async fn when_visit_metadata(world: &mut EventStoreWorld, key: String, value: String) {
    world.visit(Property::metadata(key).is(value)).await;
}

#[when(expr = "I visit events of aggregate {string} with sequence at least {int}")]
async fn when_visit_sequence(world: &mut EventStoreWorld, aggregate_id: String, first: i64) {
    let criteria = Property::AggregateIdentifier
        .is(aggregate_id)
        .and(Property::SequenceNumber.greater_than_equals(first));
    world.visit(criteria).await;
}

// --- Then steps ---

#[then(expr = "the sequences are {string}")]
async fn then_sequences(world: &mut EventStoreWorld, expected: String) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    let actual: Vec<String> = world
        .events
        .iter()
        .map(|m| m.sequence_number.to_string())
        .collect();
    assert_eq!(actual, parse_list(&expected));
}

#[then("no events are returned")]
async fn then_no_events(world: &mut EventStoreWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    assert!(world.events.is_empty(), "Expected no events, got {}", world.events.len());
}

#[then(expr = "the first event is a snapshot at sequence {int}")]
async fn then_first_is_snapshot(world: &mut EventStoreWorld, sequence: u64) {
    let first = world.events.first().expect("No events returned");
    assert_eq!(first.payload.type_name(), "Snapshot");
    assert_eq!(first.sequence_number, sequence);
}

#[then("no snapshot is among the events")]
async fn then_no_snapshot(world: &mut EventStoreWorld) {
    assert!(world
        .events
        .iter()
        .all(|m| m.payload.type_name() != "Snapshot"));
}

#[then(expr = "the visited aggregates are {string}")]
async fn then_visited_aggregates(world: &mut EventStoreWorld, expected: String) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    let mut actual: Vec<String> = world
        .events
        .iter()
        .map(|m| m.aggregate_identifier.clone())
        .collect();
    actual.sort();
    actual.dedup();
    assert_eq!(actual, parse_list(&expected));
}

#[then(expr = "every visited event has type {string}")]
async fn then_every_visited_type(world: &mut EventStoreWorld, event_type: String) {
    assert!(!world.events.is_empty(), "No events visited");
    assert!(world
        .events
        .iter()
        .all(|m| m.payload.type_name() == event_type));
}

#[then(expr = "some visited event has type {string}")]
async fn then_some_visited_type(world: &mut EventStoreWorld, event_type: String) {
    assert!(world
        .events
        .iter()
        .any(|m| m.payload.type_name() == event_type));
}

#[then(expr = "the append fails with a commit conflict at sequence {int}")]
async fn then_commit_conflict(world: &mut EventStoreWorld, sequence: u64) {
    match &world.last_error {
        Some(StorageError::CommitConflict {
            aggregate_type,
            first_sequence,
            ..
        }) => {
            assert_eq!(aggregate_type, AGGREGATE_TYPE);
            assert_eq!(*first_sequence, sequence);
        }
        other => panic!("Expected CommitConflict, got {:?}", other),
    }
}

#[then("the operation succeeds")]
async fn then_succeeds(world: &mut EventStoreWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
}

#[then("the operation fails with an invalid criteria error")]
async fn then_invalid_criteria(world: &mut EventStoreWorld) {
    assert!(
        matches!(world.last_error, Some(StorageError::InvalidCriteria(_))),
        "Expected InvalidCriteria, got {:?}",
        world.last_error
    );
}

#[then("the operation fails with a storage unavailable error")]
async fn then_unavailable(world: &mut EventStoreWorld) {
    match &world.last_error {
        Some(e @ StorageError::StorageUnavailable(_)) => assert!(e.is_transient()),
        other => panic!("Expected StorageUnavailable, got {:?}", other),
    }
}

#[then("no cursors remain open")]
async fn then_no_open_cursors(world: &mut EventStoreWorld) {
    assert_eq!(world.context().memory().active_cursors(), 0);
}
