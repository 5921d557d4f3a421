//! Serializer contract and the default BSON serializer.

use std::fmt;
use std::marker::PhantomData;

use bson::Bson;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors raised by a serializer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializationError {
    #[error("Unknown payload type: {0}")]
    UnknownType(String),

    #[error("Malformed payload of type {payload_type}: {reason}")]
    Malformed { payload_type: String, reason: String },
}

/// Name and schema revision of a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializedType {
    pub name: String,
    pub revision: Option<String>,
}

impl SerializedType {
    pub fn new(name: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            name: name.into(),
            revision,
        }
    }
}

impl fmt::Display for SerializedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(revision) => write!(f, "{}@{}", self.name, revision),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A payload in stored form.
///
/// `data` may be structured (a BSON document, queryable through criteria on
/// payload fields) or opaque (binary or string). The storage layer stores it
/// as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedObject {
    pub serialized_type: SerializedType,
    pub data: Bson,
}

impl SerializedObject {
    pub fn new(serialized_type: SerializedType, data: Bson) -> Self {
        Self {
            serialized_type,
            data,
        }
    }
}

/// Turns typed payloads into [`SerializedObject`]s and back.
///
/// Must be deterministic for a given payload and type so that
/// write-then-read returns an equal payload.
pub trait Serializer<P>: Send + Sync {
    fn serialize(&self, payload: &P) -> Result<SerializedObject, SerializationError>;

    fn deserialize(&self, object: &SerializedObject) -> Result<P, SerializationError>;

    /// Whether `serialized_type` resolves to a payload this serializer produces.
    fn can_deserialize(&self, serialized_type: &SerializedType) -> bool;
}

/// A serde payload that names its own stored type.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync {
    /// Type name written next to the payload.
    fn payload_type(&self) -> String;

    /// Schema revision written next to the payload.
    fn payload_revision(&self) -> Option<String> {
        None
    }

    /// Whether a stored type name can be read back as `Self`.
    fn is_known_type(name: &str) -> bool;
}

/// Serializer storing payloads as structured BSON via serde.
pub struct BsonSerializer<P> {
    _payload: PhantomData<fn() -> P>,
}

impl<P> BsonSerializer<P> {
    pub fn new() -> Self {
        Self {
            _payload: PhantomData,
        }
    }
}

impl<P> Default for BsonSerializer<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: EventPayload> Serializer<P> for BsonSerializer<P> {
    fn serialize(&self, payload: &P) -> Result<SerializedObject, SerializationError> {
        let payload_type = payload.payload_type();
        let data = bson::to_bson(payload).map_err(|e| SerializationError::Malformed {
            payload_type: payload_type.clone(),
            reason: e.to_string(),
        })?;
        Ok(SerializedObject::new(
            SerializedType::new(payload_type, payload.payload_revision()),
            data,
        ))
    }

    fn deserialize(&self, object: &SerializedObject) -> Result<P, SerializationError> {
        if !self.can_deserialize(&object.serialized_type) {
            return Err(SerializationError::UnknownType(
                object.serialized_type.to_string(),
            ));
        }
        bson::from_bson(object.data.clone()).map_err(|e| SerializationError::Malformed {
            payload_type: object.serialized_type.to_string(),
            reason: e.to_string(),
        })
    }

    fn can_deserialize(&self, serialized_type: &SerializedType) -> bool {
        P::is_known_type(&serialized_type.name)
    }
}
