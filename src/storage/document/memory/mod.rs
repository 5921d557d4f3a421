//! In-memory document store.
//!
//! Behaves like a single-node document database for the operations the
//! storage strategies use: unique indexes are enforced on insert and on
//! index creation, queries go through a filter matcher, and every open
//! cursor holds one slot of a bounded connection pool until it is closed,
//! exhausted, fails or is dropped.

mod filter;


use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::debug;

use super::{
    DocumentCollection, DocumentCursor, FindQuery, IndexSpec, SortOrder, StoreError, StoreResult,
};

/// Default number of concurrently open cursors.
pub const DEFAULT_MAX_CURSORS: usize = 64;

/// Name of the implicit primary key index.
const ID_INDEX: &str = "_id_";

/// Connection-level state shared by every collection of one store.
struct Connection {
    slots: Arc<Semaphore>,
    max_slots: usize,
    available: AtomicBool,
}

impl Connection {
    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        }
    }

    async fn acquire(&self) -> StoreResult<OwnedSemaphorePermit> {
        self.ensure_available()?;
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Unavailable("connection pool closed".to_string()))
    }
}

#[derive(Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// In-memory document store holding named collections.
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    connection: Arc<Connection>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_max_cursors(DEFAULT_MAX_CURSORS)
    }

    pub fn with_max_cursors(max_cursors: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            connection: Arc::new(Connection {
                slots: Arc::new(Semaphore::new(max_cursors)),
                max_slots: max_cursors,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Handle to the named collection, created on first use.
    pub async fn collection(&self, name: &str) -> MemoryCollection {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection::new(name, self.connection.clone()))
            .clone()
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_available(&self, available: bool) {
        self.connection.available.store(available, Ordering::SeqCst);
    }

    /// Number of cursors currently holding a connection slot.
    pub fn active_cursors(&self) -> usize {
        self.connection.max_slots - self.connection.slots.available_permits()
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one in-memory collection. Clones share the same data.
#[derive(Clone)]
pub struct MemoryCollection {
    name: String,
    state: Arc<RwLock<CollectionState>>,
    connection: Arc<Connection>,
}

impl MemoryCollection {
    fn new(name: &str, connection: Arc<Connection>) -> Self {
        let state = CollectionState {
            documents: Vec::new(),
            indexes: vec![IndexSpec::new(ID_INDEX)
                .key("_id", SortOrder::Ascending)
                .unique()],
        };
        Self {
            name: name.to_string(),
            state: Arc::new(RwLock::new(state)),
            connection,
        }
    }

    /// Number of stored documents.
    pub async fn count(&self) -> usize {
        self.state.read().await.documents.len()
    }
}

fn index_key(document: &Document, index: &IndexSpec) -> Vec<Bson> {
    index
        .keys
        .iter()
        .map(|(field, _)| {
            filter::field_values(document, field)
                .into_iter()
                .next()
                .cloned()
                .unwrap_or(Bson::Null)
        })
        .collect()
}

fn same_key(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| filter::bson_equals(x, y))
}

/// First unique index that `documents` would violate, given `existing`.
fn violated_index<'a>(
    indexes: &'a [IndexSpec],
    existing: &[Document],
    documents: &[Document],
) -> Option<&'a IndexSpec> {
    indexes.iter().filter(|index| index.unique).find(|index| {
        let mut seen: Vec<Vec<Bson>> = existing.iter().map(|d| index_key(d, index)).collect();
        documents.iter().any(|document| {
            let key = index_key(document, index);
            let duplicate = seen.iter().any(|k| same_key(k, &key));
            seen.push(key);
            duplicate
        })
    })
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_many(&self, documents: Vec<Document>) -> StoreResult<()> {
        let _slot = self.connection.acquire().await?;

        let documents: Vec<Document> = documents
            .into_iter()
            .map(|mut document| {
                if !document.contains_key("_id") {
                    document.insert("_id", ObjectId::new());
                }
                document
            })
            .collect();

        let mut state = self.state.write().await;
        if let Some(index) = violated_index(&state.indexes, &state.documents, &documents) {
            return Err(StoreError::DuplicateKey {
                index: index.name.clone(),
            });
        }

        debug!(collection = %self.name, count = documents.len(), "memory insert");
        state.documents.extend(documents);
        Ok(())
    }

    fn find(&self, query: FindQuery) -> Box<dyn DocumentCursor> {
        Box::new(MemoryCursor {
            collection: self.clone(),
            query,
            state: CursorState::Pending,
        })
    }

    async fn create_index(&self, index: IndexSpec) -> StoreResult<()> {
        let _slot = self.connection.acquire().await?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.indexes.iter().find(|i| i.name == index.name) {
            if existing.keys == index.keys && existing.unique == index.unique {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                index: index.name.clone(),
                reason: "an index with this name exists with different options".to_string(),
            });
        }
        if let Some(existing) = state.indexes.iter().find(|i| i.keys == index.keys) {
            return Err(StoreError::IndexConflict {
                index: index.name.clone(),
                reason: format!("same key pattern already indexed as {}", existing.name),
            });
        }
        if index.unique
            && violated_index(std::slice::from_ref(&index), &[], &state.documents).is_some()
        {
            return Err(StoreError::DuplicateKey {
                index: index.name.clone(),
            });
        }

        debug!(collection = %self.name, index = %index.name, "memory index created");
        state.indexes.push(index);
        Ok(())
    }

    async fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        self.connection.ensure_available()?;
        Ok(self.state.read().await.indexes.clone())
    }
}

enum CursorState {
    Pending,
    Open {
        buffer: VecDeque<Document>,
        _slot: OwnedSemaphorePermit,
    },
    Closed,
}

/// Cursor over a point-in-time result set, evaluated on first advance.
pub struct MemoryCursor {
    collection: MemoryCollection,
    query: FindQuery,
    state: CursorState,
}

impl MemoryCursor {
    async fn open(&mut self) -> StoreResult<()> {
        let slot = self.collection.connection.acquire().await?;
        let state = self.collection.state.read().await;

        let mut results = Vec::new();
        for document in &state.documents {
            if filter::matches(document, &self.query.filter)? {
                results.push(document.clone());
            }
        }
        drop(state);

        if let Some(sort) = &self.query.sort {
            filter::sort_documents(&mut results, sort);
        }
        if let Some(limit) = self.query.limit.filter(|l| *l > 0) {
            results.truncate(limit as usize);
        }

        debug!(
            collection = %self.collection.name,
            matched = results.len(),
            "memory cursor opened"
        );
        self.state = CursorState::Open {
            buffer: results.into(),
            _slot: slot,
        };
        Ok(())
    }
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn advance(&mut self) -> StoreResult<Option<Document>> {
        let opened = match self.state {
            CursorState::Closed => return Ok(None),
            CursorState::Pending => self.open().await,
            CursorState::Open { .. } => self.collection.connection.ensure_available(),
        };
        if let Err(e) = opened {
            self.state = CursorState::Closed;
            return Err(e);
        }

        let next = match &mut self.state {
            CursorState::Open { buffer, .. } => buffer.pop_front(),
            _ => None,
        };
        if next.is_none() {
            self.state = CursorState::Closed;
        }
        Ok(next)
    }

    async fn close(&mut self) {
        self.state = CursorState::Closed;
    }
}
