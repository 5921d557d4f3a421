//! Upcaster chain for migrating stored payloads to the current schema.
//!
//! An upcaster sees one serialized payload and returns zero or more payloads
//! at a newer schema, or flags the payload's type as unknown. The chain feeds
//! every produced payload to the remaining upcasters, preserving order. An
//! empty chain is a passthrough.

use std::sync::Arc;

use super::{SerializedObject, SerializedType};

/// Outcome of upcasting one serialized payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UpcastResult {
    /// Payloads at the newer schema, in event order. May be empty.
    Upcasted(Vec<SerializedObject>),
    /// The payload's type cannot be resolved.
    UnknownType(SerializedType),
}

/// A single schema migration step.
pub trait Upcaster: Send + Sync {
    /// Whether this upcaster handles payloads of `serialized_type`.
    fn can_upcast(&self, serialized_type: &SerializedType) -> bool;

    fn upcast(&self, object: SerializedObject) -> UpcastResult;
}

/// Ordered list of upcasters.
#[derive(Clone, Default)]
pub struct UpcasterChain {
    upcasters: Vec<Arc<dyn Upcaster>>,
}

impl UpcasterChain {
    pub fn new(upcasters: Vec<Arc<dyn Upcaster>>) -> Self {
        Self { upcasters }
    }

    /// Chain that returns every payload unchanged.
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn with(mut self, upcaster: Arc<dyn Upcaster>) -> Self {
        self.upcasters.push(upcaster);
        self
    }

    pub fn len(&self) -> usize {
        self.upcasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upcasters.is_empty()
    }

    /// Run `object` through every upcaster in order.
    pub fn upcast(&self, object: SerializedObject) -> UpcastResult {
        let mut current = vec![object];

        for upcaster in &self.upcasters {
            let mut next = Vec::with_capacity(current.len());
            for object in current {
                if !upcaster.can_upcast(&object.serialized_type) {
                    next.push(object);
                    continue;
                }
                match upcaster.upcast(object) {
                    UpcastResult::Upcasted(objects) => next.extend(objects),
                    unknown @ UpcastResult::UnknownType(_) => return unknown,
                }
            }
            current = next;
        }

        UpcastResult::Upcasted(current)
    }
}

impl FromIterator<Arc<dyn Upcaster>> for UpcasterChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Upcaster>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for UpcasterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpcasterChain")
            .field("upcasters", &self.upcasters.len())
            .finish()
    }
}
