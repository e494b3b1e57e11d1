//! Storage backend abstraction consumed by entities and queries.
//!
//! This module defines the narrow connector contract the core needs from a document
//! store: single-document insert/update/delete addressed by identifier, and finds driven
//! by a native query document plus cursor modifiers.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Native documents
//!
//! Query documents use the MongoDB query dialect (`{field: value}`, `{field: {"$gt": v}}`,
//! `{"$or": [...]}`), and updates are expressed as an [`UpdateDocument`] holding a `$set`
//! group and an `$unset` group. Backends that are not MongoDB are expected to interpret
//! this dialect.
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::{StoreBackend, FindOptions};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! let id = backend.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
//! let docs = backend.find("users", doc! { "_id": id }, FindOptions::default()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Document, doc};
use std::fmt::Debug;

use crate::{
    document::EntityId,
    error::DocumentStoreResult,
    filter::Sort,
};

/// Cursor modifiers applied to a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip before returning results.
    pub skip: Option<usize>,
    /// Single-key ordering of the results.
    pub sort: Option<Sort>,
}

impl FindOptions {
    /// Renders the sort as a native key-order document, e.g. `{"name": 1}`.
    pub fn sort_document(&self) -> Option<Document> {
        self.sort
            .as_ref()
            .map(|sort| doc! { sort.key.clone(): sort.direction.order() })
    }
}

/// A partial update addressed to one document.
///
/// Fields in `set` are written, fields in `unset` are removed. Both groups are applied
/// as one atomic single-document write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDocument {
    /// Fields to write.
    pub set: Document,
    /// Fields to remove.
    pub unset: Vec<String>,
}

impl UpdateDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Renders the native update document: `{"$set": {...}, "$unset": {field: ""}}`.
    ///
    /// Empty groups are omitted.
    pub fn to_document(&self) -> Document {
        let mut update = Document::new();

        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            update.insert(
                "$unset",
                self.unset
                    .iter()
                    .map(|field| (field.clone(), "".into()))
                    .collect::<Document>(),
            );
        }

        update
    }
}

/// Abstract interface for document storage backends.
///
/// Implementers provide concrete storage strategies, from simple in-memory maps to
/// networked databases. Every method is one round trip; the core never retries.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Writes addressed to a single document must be atomic.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Writes addressed to a missing document must fail with
/// [`DocumentNotFound`](crate::error::DocumentStoreError::DocumentNotFound); other
/// failures should use [`Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a new document and returns the identifier the store generated for it.
    ///
    /// The collection is created if it does not exist. The document must not carry an
    /// `_id` field.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<EntityId>;

    /// Applies a partial update to the document addressed by `id`.
    async fn update_one(
        &self,
        collection: &str,
        id: &EntityId,
        update: &UpdateDocument,
    ) -> DocumentStoreResult<()>;

    /// Removes the document addressed by `id`.
    async fn delete_one(&self, collection: &str, id: &EntityId) -> DocumentStoreResult<()>;

    /// Returns every document matching `filter`, shaped by `options`.
    ///
    /// Returned documents include their `_id` field. A missing collection yields no
    /// documents.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64>;

    /// Drops (deletes) a collection and all its documents.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<EntityId> {
        (*self).insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &EntityId,
        update: &UpdateDocument,
    ) -> DocumentStoreResult<()> {
        (*self).update_one(collection, id, update).await
    }

    async fn delete_one(&self, collection: &str, id: &EntityId) -> DocumentStoreResult<()> {
        (*self).delete_one(collection, id).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        (*self).find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        (*self).count(collection, filter).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        (*self).drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        (*self).list_collections().await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
