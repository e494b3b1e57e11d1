//! Collection handles and find cursors.
//!
//! A [`Collection`] is what resolving a collection name against a
//! [`DocumentStore`](crate::store::DocumentStore) yields. It forwards single-document
//! writes to the backend and starts finds through a [`Cursor`].
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//!
//! let users = store.collection("users");
//! let id = users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
//! let adults = users
//!     .find(doc! { "age": { "$gte": 18 } })
//!     .sort(Sort::ascending("name"))
//!     .limit(10)
//!     .collect()
//!     .await?;
//! ```

use bson::Document;

use crate::{
    backend::{FindOptions, StoreBackend, UpdateDocument},
    document::EntityId,
    error::DocumentStoreResult,
    filter::Sort,
};

/// A handle to one named collection of a backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    /// Creates a new collection reference (internal use).
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a document and returns its store-generated identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the operation fails.
    pub async fn insert_one(&self, document: Document) -> DocumentStoreResult<EntityId> {
        self.backend
            .insert_one(self.name(), document)
            .await
    }

    /// Applies a partial update to the document addressed by `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the operation fails.
    pub async fn update_one(&self, id: &EntityId, update: &UpdateDocument) -> DocumentStoreResult<()> {
        self.backend
            .update_one(self.name(), id, update)
            .await
    }

    /// Removes the document addressed by `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the operation fails.
    pub async fn delete_one(&self, id: &EntityId) -> DocumentStoreResult<()> {
        self.backend
            .delete_one(self.name(), id)
            .await
    }

    /// Starts a find for documents matching the native query document `filter`.
    ///
    /// Nothing is sent to the backend until [`Cursor::collect`] is awaited.
    pub fn find(&self, filter: Document) -> Cursor<'a, B> {
        Cursor {
            collection: self.name.clone(),
            backend: self.backend,
            filter,
            options: FindOptions::default(),
        }
    }

    /// Counts the documents matching `filter`.
    pub async fn count(&self, filter: Document) -> DocumentStoreResult<u64> {
        self.backend
            .count(self.name(), filter)
            .await
    }
}

/// A one-shot find over a collection.
///
/// Modifiers can be applied in any order; [`collect`](Cursor::collect) consumes the
/// cursor, so the results of a find can only be read once.
#[derive(Debug)]
pub struct Cursor<'a, B: StoreBackend> {
    collection: String,
    backend: &'a B,
    filter: Document,
    options: FindOptions,
}

impl<'a, B: StoreBackend> Cursor<'a, B> {
    /// Caps the number of returned documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Skips the first `skip` matching documents.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Orders the results by a single key.
    pub fn sort(mut self, sort: Sort) -> Self {
        self.options.sort = Some(sort);
        self
    }

    /// Replaces all modifiers at once.
    pub fn with_options(mut self, options: FindOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the find and returns the raw documents.
    ///
    /// # Errors
    ///
    /// Returns a [`DocumentStoreError`](crate::error::DocumentStoreError) if the operation fails.
    pub async fn collect(self) -> DocumentStoreResult<Vec<Document>> {
        self.backend
            .find(&self.collection, self.filter, self.options)
            .await
    }
}
