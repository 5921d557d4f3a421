//! Payload serialization collaborators.
//!
//! The storage layer is agnostic to event encoding. Payloads are turned into
//! [`SerializedObject`]s by a [`Serializer`] on write and migrated to the
//! current schema by an [`UpcasterChain`] on read.

mod serializer;
mod upcasting;

pub use serializer::{
    BsonSerializer, EventPayload, SerializationError, SerializedObject, SerializedType,
    Serializer,
};
pub use upcasting::{UpcastResult, Upcaster, UpcasterChain};
