//! Storage-agnostic event criteria.
//!
//! Criteria are built from [`Property`] values and compiled into a store
//! filter by the active layout. In the per-commit layout event-level
//! properties resolve under `events.` and hold when any event of the commit
//! satisfies them.
//!
//! ```ignore
//! let criteria = Property::PayloadType
//!     .is("order.Shipped")
//!     .and(Property::metadata("region").in_values(["eu", "us"]));
//! ```

use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::codec::format_timestamp;
use super::document::{DocumentCollection, FindQuery};
use super::strategy::StorageStrategy;
use super::stream::DocumentStream;
use super::{Result, StorageError};

/// An event attribute that criteria can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    AggregateType,
    AggregateIdentifier,
    SequenceNumber,
    Timestamp,
    PayloadType,
    PayloadRevision,
    /// A metadata key.
    MetaData(String),
    /// A dotted path inside structured payloads.
    Payload(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    NotEquals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
}

impl Comparison {
    fn operator(self) -> &'static str {
        match self {
            Comparison::Equals => "$eq",
            Comparison::NotEquals => "$ne",
            Comparison::LessThan => "$lt",
            Comparison::LessThanEquals => "$lte",
            Comparison::GreaterThan => "$gt",
            Comparison::GreaterThanEquals => "$gte",
        }
    }
}

/// Immutable predicate tree over event attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Compare {
        property: Property,
        comparison: Comparison,
        value: Bson,
    },
    Membership {
        property: Property,
        values: Vec<Bson>,
        negated: bool,
    },
}

impl Property {
    pub fn metadata(key: impl Into<String>) -> Self {
        Property::MetaData(key.into())
    }

    pub fn payload(path: impl Into<String>) -> Self {
        Property::Payload(path.into())
    }

    fn compare(self, comparison: Comparison, value: impl Into<Bson>) -> Criteria {
        Criteria::Compare {
            property: self,
            comparison,
            value: value.into(),
        }
    }

    pub fn is(self, value: impl Into<Bson>) -> Criteria {
        self.compare(Comparison::Equals, value)
    }

    pub fn is_not(self, value: impl Into<Bson>) -> Criteria {
        self.compare(Comparison::NotEquals, value)
    }

    pub fn less_than(self, value: impl Into<Bson>) -> Criteria {
        self.compare(Comparison::LessThan, value)
    }

    pub fn less_than_equals(self, value: impl Into<Bson>) -> Criteria {
        self.compare(Comparison::LessThanEquals, value)
    }

    pub fn greater_than(self, value: impl Into<Bson>) -> Criteria {
        self.compare(Comparison::GreaterThan, value)
    }

    pub fn greater_than_equals(self, value: impl Into<Bson>) -> Criteria {
        self.compare(Comparison::GreaterThanEquals, value)
    }

    pub fn in_values<I, V>(self, values: I) -> Criteria
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Criteria::Membership {
            property: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Criteria
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        Criteria::Membership {
            property: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }
}

impl Criteria {
    /// Conjunction. Nested conjunctions are flattened.
    pub fn and(self, other: Criteria) -> Criteria {
        match self {
            Criteria::And(mut clauses) => {
                clauses.push(other);
                Criteria::And(clauses)
            }
            first => Criteria::And(vec![first, other]),
        }
    }

    /// Disjunction. Nested disjunctions are flattened.
    pub fn or(self, other: Criteria) -> Criteria {
        match self {
            Criteria::Or(mut clauses) => {
                clauses.push(other);
                Criteria::Or(clauses)
            }
            first => Criteria::Or(vec![first, other]),
        }
    }
}

/// Comparable stored form of a timestamp, for criteria on
/// [`Property::Timestamp`].
pub fn timestamp_value(timestamp: &DateTime<Utc>) -> Bson {
    Bson::String(format_timestamp(timestamp))
}

/// Compile `criteria` into a filter for the strategy's layout.
pub fn compile(strategy: &dyn StorageStrategy, criteria: &Criteria) -> Result<Document> {
    match criteria {
        Criteria::And(clauses) => Ok(doc! { "$and": compile_clauses(strategy, "and", clauses)? }),
        Criteria::Or(clauses) => Ok(doc! { "$or": compile_clauses(strategy, "or", clauses)? }),
        Criteria::Compare {
            property,
            comparison,
            value,
        } => {
            let path = strategy.property_path(property)?;
            let mut condition = Document::new();
            condition.insert(comparison.operator(), value.clone());
            let mut filter = Document::new();
            filter.insert(path, condition);
            Ok(filter)
        }
        Criteria::Membership {
            property,
            values,
            negated,
        } => {
            let path = strategy.property_path(property)?;
            let operator = if *negated { "$nin" } else { "$in" };
            let mut condition = Document::new();
            condition.insert(operator, values.clone());
            let mut filter = Document::new();
            filter.insert(path, condition);
            Ok(filter)
        }
    }
}

fn compile_clauses(
    strategy: &dyn StorageStrategy,
    combinator: &str,
    clauses: &[Criteria],
) -> Result<Vec<Document>> {
    if clauses.is_empty() {
        return Err(StorageError::InvalidCriteria(format!(
            "empty {combinator} clause"
        )));
    }
    clauses
        .iter()
        .map(|clause| compile(strategy, clause))
        .collect()
}

/// Documents matching `criteria`, in the store's natural order.
///
/// Compilation errors are raised here, before any I/O.
pub fn find_events_matching(
    strategy: &dyn StorageStrategy,
    collection: &dyn DocumentCollection,
    criteria: &Criteria,
) -> Result<DocumentStream> {
    let filter = compile(strategy, criteria)?;
    debug!(
        collection = collection.name(),
        layout = strategy.name(),
        %filter,
        "Opening criteria scan"
    );
    Ok(DocumentStream::new(collection.find(FindQuery::new(filter))))
}
