//! Commit codec interface step definitions.

use std::sync::Arc;

use bson::{doc, Document};
use cucumber::{given, then, when, World};

use docstream::domain::DomainEventMessage;
use docstream::serialization::{BsonSerializer, UpcasterChain};
use docstream::storage::{codec, StorageError, StorageStrategy};

use super::fixtures::{
    make_commit, parse_list, rewrite_entry, InventoryEvent, RejectDiscontinued, SplitRestocked,
    AGGREGATE_TYPE,
};
use crate::backend::{parse_layout, strategy_for};

/// Test context for codec scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct CodecWorld {
    strategy: Arc<dyn StorageStrategy>,
    serializer: BsonSerializer<InventoryEvent>,
    upcasters: UpcasterChain,
    commit: Vec<DomainEventMessage<InventoryEvent>>,
    documents: Vec<Document>,
    decoded: Vec<DomainEventMessage<InventoryEvent>>,
    last_error: Option<StorageError>,
}

impl std::fmt::Debug for CodecWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecWorld")
            .field("layout", &self.strategy.name())
            .field("commit", &self.commit.len())
            .field("documents", &self.documents.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl CodecWorld {
    fn new() -> Self {
        Self {
            strategy: strategy_for(parse_layout("per_commit"), false),
            serializer: BsonSerializer::new(),
            upcasters: UpcasterChain::passthrough(),
            commit: Vec::new(),
            documents: Vec::new(),
            decoded: Vec::new(),
            last_error: None,
        }
    }

    fn encode(&mut self) {
        match codec::create_documents(
            self.strategy.as_ref(),
            AGGREGATE_TYPE,
            &self.serializer,
            &self.commit,
        ) {
            Ok(documents) => {
                self.documents = documents;
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e),
        }
    }

    fn decode(&mut self, skip_unknown_types: bool) {
        let mut decoded = Vec::new();
        for document in &self.documents {
            match codec::extract_event_messages(
                self.strategy.as_ref(),
                document,
                None,
                &self.serializer,
                &self.upcasters,
                skip_unknown_types,
            ) {
                Ok(messages) => decoded.extend(messages),
                Err(e) => {
                    self.last_error = Some(e);
                    return;
                }
            }
        }
        self.decoded = decoded;
        self.last_error = None;
    }
}

// --- Given steps ---

#[given(expr = "the {word} layout")]
fn given_layout(world: &mut CodecWorld, layout: String) {
    world.strategy = strategy_for(parse_layout(&layout), false);
}

#[given(expr = "a commit for {string} of {int} events starting at sequence {int}")]
fn given_commit(world: &mut CodecWorld, aggregate_id: String, count: u64, first: u64) {
    world.commit = make_commit(&aggregate_id, first, count, "main");
}

#[given("an empty commit")]
fn given_empty_commit(world: &mut CodecWorld) {
    world.commit.clear();
}

#[given(expr = "the event at sequence {int} belongs to aggregate {string}")]
fn given_event_other_aggregate(world: &mut CodecWorld, sequence: u64, aggregate_id: String) {
    for event in &mut world.commit {
        if event.sequence_number == sequence {
            event.aggregate_identifier = aggregate_id.clone();
        }
    }
}

#[given(expr = "the event at sequence {int} is renumbered to {int}")]
fn given_event_renumbered(world: &mut CodecWorld, sequence: u64, renumbered: u64) {
    for event in &mut world.commit {
        if event.sequence_number == sequence {
            event.sequence_number = renumbered;
        }
    }
}

#[given(expr = "the stored payload at sequence {int} has type {string}")]
fn given_stored_payload_type(world: &mut CodecWorld, sequence: u64, payload_type: String) {
    world.encode();
    for document in &mut world.documents {
        rewrite_entry(document, sequence, &payload_type, doc! {});
    }
}

#[given(expr = "the stored payload at sequence {int} is a legacy restock of {int} received and {int} returned")]
fn given_legacy_restock(world: &mut CodecWorld, sequence: u64, received: i64, returned: i64) {
    world.encode();
    let payload = doc! { "received": received, "returned": returned };
    for document in &mut world.documents {
        rewrite_entry(document, sequence, "inventory.Restocked", payload.clone());
    }
}

#[given("the restock upcaster is registered")]
fn given_restock_upcaster(world: &mut CodecWorld) {
    world.upcasters = world.upcasters.clone().with(Arc::new(SplitRestocked));
}

#[given("the discontinued upcaster is registered")]
fn given_discontinued_upcaster(world: &mut CodecWorld) {
    world.upcasters = world.upcasters.clone().with(Arc::new(RejectDiscontinued));
}

// --- When steps ---

#[when("the commit is encoded")]
fn when_encoded(world: &mut CodecWorld) {
    world.encode();
}

#[when("the documents are decoded")]
fn when_decoded(world: &mut CodecWorld) {
    world.decode(false);
}

#[when("the documents are decoded skipping unknown types")]
fn when_decoded_skipping(world: &mut CodecWorld) {
    world.decode(true);
}

// --- Then steps ---

#[then(expr = "{int} document(s) is/are produced")]
fn then_document_count(world: &mut CodecWorld, count: usize) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    assert_eq!(world.documents.len(), count);
}

#[then("the decoded events equal the commit")]
fn then_decoded_equal_commit(world: &mut CodecWorld) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    assert_eq!(world.decoded, world.commit);
}

#[then(expr = "the decoded sequences are {string}")]
fn then_decoded_sequences(world: &mut CodecWorld, expected: String) {
    assert!(world.last_error.is_none(), "Unexpected error: {:?}", world.last_error);
    let actual: Vec<String> = world
        .decoded
        .iter()
        .map(|m| m.sequence_number.to_string())
        .collect();
    assert_eq!(actual, parse_list(&expected));
}

#[then(expr = "the decoded event types are {string}")]
fn then_decoded_types(world: &mut CodecWorld, expected: String) {
    let actual: Vec<String> = world
        .decoded
        .iter()
        .map(|m| m.payload.type_name().to_string())
        .collect();
    assert_eq!(actual, parse_list(&expected));
}

#[then("encoding fails with an invalid commit error")]
fn then_invalid_commit(world: &mut CodecWorld) {
    assert!(
        matches!(world.last_error, Some(StorageError::InvalidCommit(_))),
        "Expected InvalidCommit, got {:?}",
        world.last_error
    );
}

#[then(expr = "decoding fails with a deserialization error for {string}")]
fn then_deserialization_error(world: &mut CodecWorld, payload_type: String) {
    match &world.last_error {
        Some(StorageError::Deserialization {
            payload_type: actual,
            ..
        }) => assert_eq!(actual, &payload_type),
        other => panic!("Expected Deserialization error, got {:?}", other),
    }
}
