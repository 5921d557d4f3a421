//! MongoDB document store.

use async_trait::async_trait;
use mongodb::bson::Document;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, Cursor, Database, IndexModel};
use tracing::debug;

use super::{DocumentCollection, DocumentCursor, FindQuery, IndexSpec, StoreError, StoreResult};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;
/// Server error codes for an index that exists with other options / keys.
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;

/// Translate a driver error into the store-native taxonomy.
fn translate(e: mongodb::error::Error) -> StoreError {
    match *e.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref write_err))
            if write_err.code == DUPLICATE_KEY =>
        {
            StoreError::DuplicateKey {
                index: duplicate_index_name(&write_err.message),
            }
        }
        ErrorKind::Command(ref cmd) if cmd.code == DUPLICATE_KEY => StoreError::DuplicateKey {
            index: duplicate_index_name(&cmd.message),
        },
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::Unavailable(e.to_string()),
        _ => StoreError::Backend(e.to_string()),
    }
}

fn translate_index_error(index: &str, e: mongodb::error::Error) -> StoreError {
    if let ErrorKind::Command(ref cmd) = *e.kind {
        if cmd.code == INDEX_OPTIONS_CONFLICT || cmd.code == INDEX_KEY_SPECS_CONFLICT {
            return StoreError::IndexConflict {
                index: index.to_string(),
                reason: cmd.message.clone(),
            };
        }
    }
    translate(e)
}

/// Extract `index: <name>` from an E11000 message.
fn duplicate_index_name(message: &str) -> String {
    message
        .split("index: ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

/// MongoDB database holding the event and snapshot collections.
pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Connect to MongoDB. The driver connects lazily; unreachable servers
    /// surface on the first operation.
    pub async fn connect(uri: &str, database_name: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await.map_err(translate)?;
        Ok(Self::new(&client, database_name))
    }

    pub fn new(client: &Client, database_name: &str) -> Self {
        Self {
            database: client.database(database_name),
        }
    }

    pub fn collection(&self, name: &str) -> MongoCollection {
        MongoCollection {
            name: name.to_string(),
            collection: self.database.collection(name),
        }
    }

    /// Get the database reference.
    pub fn database(&self) -> &Database {
        &self.database
    }
}

/// Handle to one MongoDB collection.
#[derive(Clone)]
pub struct MongoCollection {
    name: String,
    collection: Collection<Document>,
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_many(&self, documents: Vec<Document>) -> StoreResult<()> {
        // Ordered single inserts: the first duplicate stops the write, and the
        // unique index reports it as a write error.
        for document in documents {
            self.collection
                .insert_one(document)
                .await
                .map_err(translate)?;
        }
        Ok(())
    }

    fn find(&self, query: FindQuery) -> Box<dyn DocumentCursor> {
        Box::new(MongoCursor {
            collection: self.collection.clone(),
            query,
            cursor: None,
            closed: false,
        })
    }

    async fn create_index(&self, index: IndexSpec) -> StoreResult<()> {
        let options = IndexOptions::builder()
            .name(index.name.clone())
            .unique(index.unique)
            .build();
        let model = IndexModel::builder()
            .keys(index.keys_document())
            .options(options)
            .build();

        self.collection
            .create_index(model)
            .await
            .map_err(|e| translate_index_error(&index.name, e))?;

        debug!(collection = %self.name, index = %index.name, "MongoDB index ensured");
        Ok(())
    }

    async fn list_indexes(&self) -> StoreResult<Vec<IndexSpec>> {
        let mut cursor = self.collection.list_indexes().await.map_err(translate)?;

        let mut indexes = Vec::new();
        while cursor.advance().await.map_err(translate)? {
            let model: IndexModel = cursor.deserialize_current().map_err(translate)?;
            let (name, unique) = match &model.options {
                Some(options) => (
                    options.name.clone().unwrap_or_default(),
                    options.unique.unwrap_or(false),
                ),
                None => (String::new(), false),
            };
            indexes.push(IndexSpec::from_keys_document(name, &model.keys, unique));
        }
        Ok(indexes)
    }
}

/// Lazy cursor: the find is sent on the first advance.
pub struct MongoCursor {
    collection: Collection<Document>,
    query: FindQuery,
    cursor: Option<Cursor<Document>>,
    closed: bool,
}

#[async_trait]
impl DocumentCursor for MongoCursor {
    async fn advance(&mut self) -> StoreResult<Option<Document>> {
        if self.closed {
            return Ok(None);
        }

        if self.cursor.is_none() {
            let options = FindOptions::builder()
                .sort(self.query.sort.clone())
                .limit(self.query.limit)
                .build();
            match self
                .collection
                .find(self.query.filter.clone())
                .with_options(options)
                .await
            {
                Ok(cursor) => self.cursor = Some(cursor),
                Err(e) => {
                    self.closed = true;
                    return Err(translate(e));
                }
            }
        }

        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        let next = match cursor.advance().await {
            Ok(true) => cursor.deserialize_current().map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };

        match next {
            Ok(Some(document)) => Ok(Some(document)),
            Ok(None) => {
                self.close().await;
                Ok(None)
            }
            Err(e) => {
                self.close().await;
                Err(translate(e))
            }
        }
    }

    async fn close(&mut self) {
        // Dropping the driver cursor kills the server-side cursor.
        self.cursor = None;
        self.closed = true;
    }
}
