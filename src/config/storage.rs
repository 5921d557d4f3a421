//! Storage configuration types.

use std::fmt;

use serde::Deserialize;

use crate::storage::document::memory::DEFAULT_MAX_CURSORS;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Mongodb,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Memory => write!(f, "memory"),
            StorageType::Mongodb => write!(f, "mongodb"),
        }
    }
}

/// Document layout of stored commits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPolicy {
    /// One document per commit.
    #[default]
    PerCommit,
    /// One document per event.
    PerEvent,
}

impl fmt::Display for LayoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutPolicy::PerCommit => write!(f, "per_commit"),
            LayoutPolicy::PerEvent => write!(f, "per_event"),
        }
    }
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub layout: LayoutPolicy,
    /// Collection holding event documents.
    pub events_collection: String,
    /// Collection holding snapshot documents.
    pub snapshots_collection: String,
    /// Leave out events with unresolvable payload types instead of failing.
    pub skip_unknown_types: bool,
    /// Only allow criteria on indexed fields.
    pub index_backed_queries: bool,
    /// In-memory store configuration.
    pub memory: MemoryConfig,
    /// MongoDB-specific configuration.
    pub mongodb: MongodbConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            layout: LayoutPolicy::PerCommit,
            events_collection: "domainevents".to_string(),
            snapshots_collection: "snapshots".to_string(),
            skip_unknown_types: false,
            index_backed_queries: false,
            memory: MemoryConfig::default(),
            mongodb: MongodbConfig::default(),
        }
    }
}

/// In-memory store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of concurrently open cursors.
    pub max_cursors: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_cursors: DEFAULT_MAX_CURSORS,
        }
    }
}

/// MongoDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongodbConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
}

impl Default for MongodbConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "docstream".to_string(),
        }
    }
}
