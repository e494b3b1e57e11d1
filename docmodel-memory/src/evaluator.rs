//! Query document evaluation for in-memory filtering.
//!
//! This module interprets the MongoDB query dialect the core renders: top-level field
//! conditions, `$and`/`$or` lists, and the operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`,
//! `$lte`, `$in` and `$nin`. Field names may be dotted paths into nested documents.

use std::{cmp::Ordering, collections::HashMap};
use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docmodel_core::error::{DocumentStoreError, DocumentStoreResult};

/// Type-erased, comparable representation of BSON values.
///
/// Integers compare exactly among themselves and fall back to `f64` only against a
/// `Double`, so `Int32(12)` equals `Int64(12)` and equals `Double(12.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Double(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in MongoDB's cross-type sort order:
    /// null, numbers, strings, documents, arrays, object ids, booleans, dates.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Double(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    fn numeric_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Int(a), Comparable::Int(b)) => Some(a.cmp(b)),
            (Comparable::Int(a), Comparable::Double(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Double(a), Comparable::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::Double(a), Comparable::Double(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Total order across all types, used for sorting.
    fn total_cmp(&self, other: &Self) -> Ordering {
        let by_type = self.type_rank().cmp(&other.type_rank());
        if by_type.is_ne() {
            return by_type;
        }

        match (self, other) {
            (Comparable::Double(a), Comparable::Double(b)) => a.total_cmp(b),
            (Comparable::Int(a), Comparable::Double(b)) => (*a as f64).total_cmp(b),
            (Comparable::Double(a), Comparable::Int(b)) => a.total_cmp(&(*b as f64)),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.total_cmp(y))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => self.numeric_cmp(other).is_some_and(Ordering::is_eq),
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => self.numeric_cmp(other),
        }
    }
}

/// Ordering used for sorting: missing and null values come first, then values are
/// ordered by type and by value within a type.
pub(crate) fn sort_order(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.total_cmp(&right)
}

/// Resolves a possibly dotted field path inside `document`.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = current.as_document()?.get(part)?;
    }

    Some(current)
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(doc) => !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

/// Equality with array semantics: an array field matches a scalar it contains.
fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    let expected = Comparable::from(operand);

    match value {
        None => expected == Comparable::Null,
        Some(value) => match (Comparable::from(value), &expected) {
            (Comparable::Array(_), Comparable::Array(_)) => Comparable::from(value) == expected,
            (Comparable::Array(items), _) => items.iter().any(|item| item == &expected),
            (actual, _) => actual == expected,
        },
    }
}

fn compare(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let expected = Comparable::from(operand);
    let holds = |actual: &Comparable<'_>| actual.partial_cmp(&expected).is_some_and(accept);

    match value.map(Comparable::from) {
        Some(Comparable::Array(items)) => items.iter().any(holds),
        Some(actual) => holds(&actual),
        None => false,
    }
}

fn operands<'b>(op: &str, operand: &'b Bson) -> DocumentStoreResult<&'b [Bson]> {
    match operand {
        Bson::Array(values) => Ok(values),
        other => Err(DocumentStoreError::InvalidQuery(format!(
            "{op} expects an array, found {other}"
        ))),
    }
}

/// Evaluates native query documents against one stored document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns whether the document satisfies every condition of `filter`.
    pub fn evaluate(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.evaluate_all(condition)?,
                "$or" => self.evaluate_any(condition)?,
                op if op.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidQuery(format!(
                        "unsupported top-level operator {op}"
                    )));
                }
                field => self.evaluate_field(field, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Keeps the documents matching `filter`, in iteration order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DocumentStoreResult<Vec<&'a Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn branches(condition: &Bson) -> DocumentStoreResult<Vec<&Document>> {
        operands("$and/$or", condition)?
            .iter()
            .map(|branch| {
                branch.as_document().ok_or_else(|| {
                    DocumentStoreError::InvalidQuery(format!("expected a query document, found {branch}"))
                })
            })
            .collect()
    }

    fn evaluate_all(&self, condition: &Bson) -> DocumentStoreResult<bool> {
        for branch in Self::branches(condition)? {
            if !self.evaluate(branch)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn evaluate_any(&self, condition: &Bson) -> DocumentStoreResult<bool> {
        for branch in Self::branches(condition)? {
            if self.evaluate(branch)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn evaluate_field(&self, field: &str, condition: &Bson) -> DocumentStoreResult<bool> {
        let value = lookup(self.document, field);

        let operators = match condition {
            Bson::Document(operators) if is_operator_document(condition) => operators,
            _ => return Ok(equals(value, condition)),
        };

        for (op, operand) in operators {
            let holds = match op.as_str() {
                "$eq" => equals(value, operand),
                "$ne" => !equals(value, operand),
                "$gt" => compare(value, operand, Ordering::is_gt),
                "$gte" => compare(value, operand, Ordering::is_ge),
                "$lt" => compare(value, operand, Ordering::is_lt),
                "$lte" => compare(value, operand, Ordering::is_le),
                "$in" => operands(op, operand)?.iter().any(|candidate| equals(value, candidate)),
                "$nin" => !operands(op, operand)?.iter().any(|candidate| equals(value, candidate)),
                other => {
                    return Err(DocumentStoreError::InvalidQuery(format!(
                        "unsupported operator {other} on field {field}"
                    )));
                }
            };

            if !holds {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
