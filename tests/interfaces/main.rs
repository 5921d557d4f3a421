//! Interface tests for the storage layer using Cucumber.
//!
//! These tests verify that both document layouts fulfil the same contract
//! against a document store. Select a backend via environment variable:
//!
//! ```bash
//! # In-memory store (default)
//! cargo test --test interfaces
//!
//! # MongoDB (one throwaway database per scenario)
//! STORE_BACKEND=mongodb MONGODB_URI=mongodb://localhost:27017 \
//!     cargo test --test interfaces --features mongodb
//! ```
//!
//! Scenarios tagged `@memory_only` simulate outages and inspect cursor
//! bookkeeping; they only run against the in-memory store.

mod steps;

use cucumber::World;

use backend::StoreBackend;
use steps::codec::CodecWorld;
use steps::event_store::EventStoreWorld;
use steps::indexes::IndexWorld;

const MEMORY_ONLY_TAG: &str = "memory_only";

fn runs_on(backend: StoreBackend, tags: &[String]) -> bool {
    backend == StoreBackend::Memory || !tags.iter().any(|t| t == MEMORY_ONLY_TAG)
}

#[tokio::main]
async fn main() {
    let backend = StoreBackend::from_env();

    // Run codec tests
    println!("\n=== Running Codec Interface Tests ===\n");
    CodecWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/codec.feature")
        .await;

    // Run EventStore tests
    println!("\n=== Running EventStore Interface Tests ===\n");
    EventStoreWorld::cucumber()
        .fail_on_skipped()
        .filter_run("tests/interfaces/features/event_store.feature", move |_, _, sc| {
            runs_on(backend, &sc.tags)
        })
        .await;

    // Run snapshot tests
    println!("\n=== Running Snapshot Interface Tests ===\n");
    EventStoreWorld::cucumber()
        .fail_on_skipped()
        .filter_run("tests/interfaces/features/snapshots.feature", move |_, _, sc| {
            runs_on(backend, &sc.tags)
        })
        .await;

    // Run criteria tests
    println!("\n=== Running Criteria Interface Tests ===\n");
    EventStoreWorld::cucumber()
        .fail_on_skipped()
        .filter_run("tests/interfaces/features/criteria.feature", move |_, _, sc| {
            runs_on(backend, &sc.tags)
        })
        .await;

    // Run index provisioning tests
    println!("\n=== Running Index Interface Tests ===\n");
    IndexWorld::cucumber()
        .fail_on_skipped()
        .filter_run("tests/interfaces/features/indexes.feature", move |_, _, sc| {
            runs_on(backend, &sc.tags)
        })
        .await;
}
