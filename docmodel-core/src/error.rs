//! Error types and result types for entity and query operations.
//!
//! This module provides error handling for every layer of the crate: entity lifecycle
//! guards, query translation, and failures surfaced by a store backend.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

use crate::{document::EntityId, filter::Operator};

/// The entity or query operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Fetch,
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Fetch => "fetch",
            Operation::Query => "query",
        })
    }
}

/// Represents all possible errors that can occur when working with entities and queries.
///
/// The lifecycle variants ([`InvalidState`](DocumentStoreError::InvalidState),
/// [`NotFound`](DocumentStoreError::NotFound), [`Store`](DocumentStoreError::Store)) carry the
/// collection, identifier and operation so a failure can be diagnosed from its message alone.
/// The remaining variants are produced by backends and by query translation.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The operation was invoked on an entity in the wrong lifecycle position.
    #[error("Cannot {operation} {collection} ({}): {reason}", display_id(.id))]
    InvalidState {
        operation: Operation,
        collection: String,
        id: Option<EntityId>,
        reason: &'static str,
    },
    /// No document matched the requested identifier.
    #[error("Cannot {operation} {collection}: id '{id}' does not exist")]
    NotFound {
        operation: Operation,
        collection: String,
        id: EntityId,
    },
    /// The store backend failed while running a lifecycle or query operation.
    #[error("Store error during {operation} on {collection} ({}): {source}", display_id(.id))]
    Store {
        operation: Operation,
        collection: String,
        id: Option<EntityId>,
        #[source]
        source: Box<DocumentStoreError>,
    },
    /// A field name or reserved value is not acceptable in a document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An identifier could not be parsed.
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
    /// A filter or sort references a field the entity does not declare.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Two filters combined with `And` place the same operator on the same field.
    #[error("Conflicting {operator} filters on field {field}")]
    QueryConflict { field: String, operator: Operator },
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A backend could not find the addressed document.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

fn display_id(id: &Option<EntityId>) -> String {
    match id {
        Some(id) => format!("id '{id}'"),
        None => "unsaved".to_string(),
    }
}

impl DocumentStoreError {
    /// Wraps a backend failure with lifecycle context.
    ///
    /// A backend [`DocumentNotFound`](DocumentStoreError::DocumentNotFound) for a known
    /// identifier becomes [`NotFound`](DocumentStoreError::NotFound); everything else
    /// becomes [`Store`](DocumentStoreError::Store).
    pub fn from_backend(
        err: DocumentStoreError,
        operation: Operation,
        collection: &str,
        id: Option<&EntityId>,
    ) -> Self {
        match (err, id) {
            (DocumentStoreError::DocumentNotFound(..), Some(id)) => DocumentStoreError::NotFound {
                operation,
                collection: collection.to_string(),
                id: *id,
            },
            (err, id) => DocumentStoreError::Store {
                operation,
                collection: collection.to_string(),
                id: id.copied(),
                source: Box::new(err),
            },
        }
    }
}

/// A specialized `Result` type for entity and query operations.
///
/// This type alias is used throughout the crate to indicate operations that may fail
/// with a [`DocumentStoreError`].
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_collection_and_id() {
        let err = DocumentStoreError::InvalidState {
            operation: Operation::Update,
            collection: "user".to_string(),
            id: None,
            reason: "entity has not been created",
        };

        assert_eq!(err.to_string(), "Cannot update user (unsaved): entity has not been created");
    }

    #[test]
    fn backend_not_found_becomes_lifecycle_not_found() {
        let id = EntityId::new();
        let err = DocumentStoreError::from_backend(
            DocumentStoreError::DocumentNotFound(id.to_hex(), "user".to_string()),
            Operation::Delete,
            "user",
            Some(&id),
        );

        assert!(matches!(
            err,
            DocumentStoreError::NotFound { operation: Operation::Delete, ref collection, .. } if collection == "user"
        ));
        assert_eq!(err.to_string(), format!("Cannot delete user: id '{id}' does not exist"));
    }

    #[test]
    fn other_backend_errors_are_wrapped_with_context() {
        let err = DocumentStoreError::from_backend(
            DocumentStoreError::Backend("connection reset".to_string()),
            Operation::Create,
            "user",
            None,
        );

        assert_eq!(
            err.to_string(),
            "Store error during create on user (unsaved): Backend error: connection reset"
        );
    }
}
