//! docstream - Event Store Storage Strategies
//!
//! Maps append-only, per-aggregate event streams onto document-oriented
//! stores. Commits are encoded into BSON documents by a layout strategy,
//! replayed through lazy cursors, queried with storage-agnostic criteria and
//! protected against concurrent writers by store-native unique indexes.

pub mod config;
pub mod domain;
pub mod serialization;
pub mod storage;
pub mod utils;

pub use domain::{DomainEventMessage, MetaData, MetaValue};
pub use serialization::{
    BsonSerializer, EventPayload, SerializedObject, SerializedType, Serializer, Upcaster,
    UpcasterChain,
};
pub use storage::{Result, StorageError};
