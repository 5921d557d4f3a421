//! Domain event messages.
//!
//! The in-memory form of a stored event: identity, position in the
//! aggregate's stream, timestamp, typed payload and scalar metadata.

mod message;
mod metadata;

pub use message::DomainEventMessage;
pub use metadata::{MetaData, MetaValue};
