//! Document store abstraction.
//!
//! The storage strategies only need a narrow slice of a document database:
//! insert, filtered find with sort, and index declaration. Collection handles
//! are owned by the caller and outlive every call made through them.
//!
//! Implementations:
//! - `MemoryCollection`: in-process store with unique index enforcement
//! - `MongoCollection`: MongoDB (feature `mongodb`)

use async_trait::async_trait;
use bson::{Bson, Document};

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use memory::{MemoryCollection, MemoryDocumentStore};

#[cfg(feature = "mongodb")]
pub use self::mongodb::{MongoCollection, MongoDocumentStore};

/// Result type for store-native operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store-native failures, translated into `StorageError` by the layer above.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate key on index {index}")]
    DuplicateKey { index: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Index conflict on {index}: {reason}")]
    IndexConflict { index: String, reason: String },

    #[error("Store error: {0}")]
    Backend(String),
}

/// Direction of an index key or sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Parse a sort direction as stored in key documents (`1` / `-1`).
    pub fn from_bson(value: &Bson) -> Option<Self> {
        let direction = match value {
            Bson::Int32(i) => f64::from(*i),
            Bson::Int64(i) => *i as f64,
            Bson::Double(d) => *d,
            _ => return None,
        };
        if direction > 0.0 {
            Some(SortOrder::Ascending)
        } else if direction < 0.0 {
            Some(SortOrder::Descending)
        } else {
            None
        }
    }
}

/// Declaration of a physical index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, SortOrder)>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            unique: false,
        }
    }

    pub fn key(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push((field.into(), order));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Key pattern in store form, e.g. `{ "aggregate_id": 1, "sequence": -1 }`.
    pub fn keys_document(&self) -> Document {
        self.keys
            .iter()
            .map(|(field, order)| (field.clone(), Bson::Int32(order.as_i32())))
            .collect()
    }

    /// Rebuild a spec from a stored key pattern. Unknown directions (text,
    /// hashed) are skipped.
    pub fn from_keys_document(name: impl Into<String>, keys: &Document, unique: bool) -> Self {
        Self {
            name: name.into(),
            keys: keys
                .iter()
                .filter_map(|(field, v)| SortOrder::from_bson(v).map(|o| (field.clone(), o)))
                .collect(),
            unique,
        }
    }

    pub fn covers_field(&self, field: &str) -> bool {
        self.keys.iter().any(|(f, _)| f == field)
    }
}

/// A filtered, optionally sorted and limited find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
}

impl FindQuery {
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            sort: None,
            limit: None,
        }
    }

    pub fn sorted_by(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Forward-only iteration over query results.
///
/// A cursor performs no I/O until the first [`advance`](Self::advance), so
/// store unavailability surfaces there. Resources held by the cursor (a
/// connection slot, a server-side cursor) are released by [`close`](Self::close),
/// on exhaustion, on error, and when the cursor is dropped.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Next document, or `None` once exhausted.
    async fn advance(&mut self) -> StoreResult<Option<Document>>;

    /// Release underlying resources. Later advances return `None`.
    async fn close(&mut self);
}

/// Handle to one collection of a document store.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert documents in order. A unique index violation is reported as
    /// [`StoreError::DuplicateKey`].
    async fn insert_many(&self, documents: Vec<Document>) -> StoreResult<()>;

    /// Prepare a lazy cursor over matching documents.
    fn find(&self, query: FindQuery) -> Box<dyn DocumentCursor>;

    /// Create an index unless an identical one exists.
    async fn create_index(&self, index: IndexSpec) -> StoreResult<()>;

    async fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>>;
}
