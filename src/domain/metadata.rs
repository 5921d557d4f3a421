//! Event metadata: string keys mapped to scalar values.

use std::collections::BTreeMap;

use bson::{Bson, Document};

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl MetaValue {
    fn to_bson(&self) -> Bson {
        match self {
            MetaValue::String(s) => Bson::String(s.clone()),
            MetaValue::Int(i) => Bson::Int64(*i),
            MetaValue::Float(f) => Bson::Double(*f),
            MetaValue::Bool(b) => Bson::Boolean(*b),
        }
    }

    fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::String(s) => Some(MetaValue::String(s.clone())),
            Bson::Int32(i) => Some(MetaValue::Int(i64::from(*i))),
            Bson::Int64(i) => Some(MetaValue::Int(*i)),
            Bson::Double(f) => Some(MetaValue::Float(*f)),
            Bson::Boolean(b) => Some(MetaValue::Bool(*b)),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// Ordered mapping of metadata keys to scalar values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaData(BTreeMap<String, MetaValue>);

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }

    /// Stored form: a flat document, so metadata keys are queryable fields.
    pub fn to_document(&self) -> Document {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_bson()))
            .collect()
    }

    /// Rebuild from the stored form. Returns the offending key on a
    /// non-scalar value.
    pub fn from_document(document: &Document) -> std::result::Result<Self, String> {
        let mut metadata = MetaData::new();
        for (key, value) in document {
            let value = MetaValue::from_bson(value).ok_or_else(|| key.clone())?;
            metadata.0.insert(key.clone(), value);
        }
        Ok(metadata)
    }
}
