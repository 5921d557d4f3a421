//! Filter evaluation and sorting for the in-memory store.
//!
//! Supports the query subset the storage strategies and the criteria
//! compiler emit: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in`, `$nin`, `$exists`, `$and`, `$or`, `$nor`. Dotted paths
//! traverse sub-documents and arrays; a condition on an array field holds
//! when any element satisfies it.

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::super::{SortOrder, StoreError, StoreResult};

/// Whether `document` satisfies `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let holds = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    all &= matches(document, clause)?;
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    any |= matches(document, clause)?;
                }
                any
            }
            "$nor" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    any |= matches(document, clause)?;
                }
                !any
            }
            op if op.starts_with('$') => {
                return Err(StoreError::Backend(format!("unsupported operator {op}")));
            }
            path => field_matches(&field_values(document, path), condition)?,
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> StoreResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::Backend(format!("{operator} expects an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(StoreError::Backend(format!("{operator} expects documents"))),
        })
        .collect()
}

fn field_matches(values: &[&Bson], condition: &Bson) -> StoreResult<bool> {
    let operators = match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => d,
        _ => return Ok(equals_any(values, condition)),
    };

    for (op, operand) in operators {
        let holds = match op.as_str() {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" => compares_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_list(values, op, operand)?,
            "$nin" => !in_list(values, op, operand)?,
            "$exists" => match operand {
                Bson::Boolean(expected) => values.is_empty() != *expected,
                _ => return Err(StoreError::Backend("$exists expects a boolean".into())),
            },
            other => {
                return Err(StoreError::Backend(format!("unsupported operator {other}")));
            }
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(values: &[&Bson], op: &str, operand: &Bson) -> StoreResult<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(StoreError::Backend(format!("{op} expects an array")));
    };
    Ok(candidates.iter().any(|c| equals_any(values, c)))
}

/// Null matches a missing field, as in MongoDB.
fn equals_any(values: &[&Bson], expected: &Bson) -> bool {
    if values.is_empty() {
        return matches!(expected, Bson::Null);
    }
    values.iter().any(|v| bson_equals(v, expected))
}

fn compares_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    values
        .iter()
        .any(|v| compare_bson(v, operand).is_some_and(&accept))
}

/// Every value reachable at `path`. Arrays contribute themselves and
/// their elements.
pub(crate) fn field_values<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            collect(value, rest, &mut out);
        }
    }
    out
}

fn collect<'a>(value: &'a Bson, path: &[&str], out: &mut Vec<&'a Bson>) {
    match path.split_first() {
        None => {
            out.push(value);
            if let Bson::Array(items) = value {
                out.extend(items.iter());
            }
        }
        Some((head, rest)) => match value {
            Bson::Document(d) => {
                if let Some(v) = d.get(*head) {
                    collect(v, rest, out);
                }
            }
            Bson::Array(items) => {
                for item in items {
                    if let Bson::Document(d) = item {
                        if let Some(v) = d.get(*head) {
                            collect(v, rest, out);
                        }
                    }
                }
            }
            _ => {}
        },
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

pub(crate) fn bson_equals(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Ordering between comparable values of the same kind.
pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Stable sort by a key document such as `{ "sequence": -1 }`.
/// Missing fields sort first in ascending order.
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) {
    let keys: Vec<(&str, SortOrder)> = sort
        .iter()
        .filter_map(|(field, v)| SortOrder::from_bson(v).map(|o| (field.as_str(), o)))
        .collect();

    documents.sort_by(|a, b| {
        for (field, order) in &keys {
            let left = field_values(a, field).into_iter().next();
            let right = field_values(b, field).into_iter().next();
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_bson(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
