//! Cucumber step definitions for interface tests.

pub mod codec;
pub mod event_store;
pub mod indexes;
