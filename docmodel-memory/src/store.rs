//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in a map ordered by identifier, behind an
//! async-aware read-write lock. Object identifiers grow over time, so unsorted finds
//! return documents in insertion order.

use std::{collections::{BTreeMap, HashMap}, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Document, oid::ObjectId};
use tracing::trace;

use docmodel_core::{
    backend::{FindOptions, StoreBackend, StoreBackendBuilder, UpdateDocument},
    document::{EntityId, ID_FIELD},
    error::{DocumentStoreError, DocumentStoreResult},
};

use crate::evaluator::{DocumentEvaluator, lookup, sort_order};

type CollectionMap = BTreeMap<ObjectId, Document>;
type StoreMap = HashMap<String, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it
/// to be shared across async tasks. Clones of the same instance share the same data.
///
/// Finds scan every document of the collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::{StoreBackend, FindOptions};
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     let id = store.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
///     let docs = store.find("users", doc! { "_id": id }, FindOptions::default()).await?;
///     assert_eq!(docs.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> (document_id -> document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use docmodel_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder()
    ///     .with_collection("users")
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn document_not_found(id: &EntityId, collection: &str) -> DocumentStoreError {
    DocumentStoreError::DocumentNotFound(id.to_hex(), collection.to_string())
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<EntityId> {
        if document.contains_key(ID_FIELD) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "inserted documents must not carry an {ID_FIELD} field"
            )));
        }

        let oid = ObjectId::new();
        let mut stored = Document::new();
        stored.insert(ID_FIELD, oid);
        stored.extend(document);

        self.store
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(oid, stored);

        trace!(collection, id = %oid, "inserted document");

        Ok(EntityId::from(oid))
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &EntityId,
        update: &UpdateDocument,
    ) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let document = store
            .get_mut(collection)
            .and_then(|collection_map| collection_map.get_mut(&id.object_id()))
            .ok_or_else(|| document_not_found(id, collection))?;

        for (field, value) in &update.set {
            document.insert(field.clone(), value.clone());
        }
        for field in &update.unset {
            document.remove(field);
        }

        trace!(collection, id = %id, set = update.set.len(), unset = update.unset.len(), "updated document");

        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: &EntityId) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        store
            .get_mut(collection)
            .and_then(|collection_map| collection_map.remove(&id.object_id()))
            .ok_or_else(|| document_not_found(id, collection))?;

        trace!(collection, id = %id, "deleted document");

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut documents = DocumentEvaluator::filter_documents(collection_map.values(), &filter)?;

        if let Some(sort) = &options.sort {
            // Stable, so ties keep insertion order.
            documents.sort_by(|a, b| {
                let ordering = sort_order(lookup(a, &sort.key), lookup(b, &sort.key));
                if sort.direction.order() < 0 { ordering.reverse() } else { ordering }
            });
        }

        Ok(
            documents
                .into_iter()
                .skip(options.skip.unwrap_or(0))
                .take(options.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect()
        )
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let collection_map = match store.get(collection) {
            Some(col) => col,
            None => return Ok(0),
        };

        Ok(DocumentEvaluator::filter_documents(collection_map.values(), &filter)?.len() as u64)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.store.write().await.remove(name);

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// Collections named with [`with_collection`](Self::with_collection) exist (empty) as
/// soon as the store is built.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    collections: Vec<String>,
}

impl InMemoryStoreBuilder {
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = self.collections
            .into_iter()
            .map(|name| (name, CollectionMap::new()))
            .collect::<StoreMap>();

        Ok(InMemoryStore {
            store: Arc::new(RwLock::new(store)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Bson, doc};
    use docmodel_core::filter::Sort;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (name, age) in [("Carol", 41), ("Alice", 30), ("Bob", 25)] {
            store.insert_one("users", doc! { "name": name, "age": age }).await.unwrap();
        }
        store
    }

    fn names(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d.get_str("name").unwrap()).collect()
    }

    #[tokio::test]
    async fn inserted_documents_get_an_object_id() {
        let store = InMemoryStore::new();
        let id = store.insert_one("users", doc! { "name": "Alice" }).await.unwrap();

        let found = store.find("users", doc! { "_id": id }, FindOptions::default()).await.unwrap();
        assert_eq!(found, vec![doc! { "_id": id.object_id(), "name": "Alice" }]);
    }

    #[tokio::test]
    async fn insert_rejects_caller_supplied_ids() {
        let store = InMemoryStore::new();
        let result = store.insert_one("users", doc! { "_id": ObjectId::new() }).await;

        assert!(matches!(result, Err(DocumentStoreError::InvalidDocument(_))));
    }

    #[tokio::test]
    async fn find_keeps_insertion_order_without_sort() {
        let store = seeded().await;
        let all = store.find("users", doc! {}, FindOptions::default()).await.unwrap();

        assert_eq!(names(&all), ["Carol", "Alice", "Bob"]);
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let store = seeded().await;
        let options = FindOptions { sort: Some(Sort::descending("age")), skip: Some(1), limit: Some(1) };

        let found = store.find("users", doc! {}, options).await.unwrap();
        assert_eq!(names(&found), ["Alice"]);
    }

    #[tokio::test]
    async fn find_sorts_mixed_type_fields() {
        let store = InMemoryStore::new();
        for value in [Bson::Int32(5), Bson::from("x"), Bson::Int32(1), Bson::from("a"), Bson::Int32(3)] {
            store.insert_one("values", doc! { "v": value }).await.unwrap();
        }

        let options = FindOptions { sort: Some(Sort::ascending("v")), ..FindOptions::default() };
        let found = store.find("values", doc! {}, options).await.unwrap();
        let sorted: Vec<&Bson> = found.iter().map(|d| d.get("v").unwrap()).collect();

        assert_eq!(sorted, [&Bson::Int32(1), &Bson::Int32(3), &Bson::Int32(5), &Bson::from("a"), &Bson::from("x")]);
    }

    #[tokio::test]
    async fn update_sets_and_unsets_fields() {
        let store = InMemoryStore::new();
        let id = store.insert_one("users", doc! { "name": "Alice", "nickname": "Al" }).await.unwrap();

        let update = UpdateDocument { set: doc! { "age": 31 }, unset: vec!["nickname".to_string()] };
        store.update_one("users", &id, &update).await.unwrap();

        let found = store.find("users", doc! {}, FindOptions::default()).await.unwrap();
        assert_eq!(found[0], doc! { "_id": id.object_id(), "name": "Alice", "age": 31 });
    }

    #[tokio::test]
    async fn writes_to_missing_documents_fail() {
        let store = seeded().await;
        let id = EntityId::new();

        assert!(matches!(
            store.update_one("users", &id, &UpdateDocument::new()).await,
            Err(DocumentStoreError::DocumentNotFound(..))
        ));
        assert!(matches!(
            store.delete_one("ghosts", &id).await,
            Err(DocumentStoreError::DocumentNotFound(..))
        ));
    }

    #[tokio::test]
    async fn count_ignores_missing_collections() {
        let store = seeded().await;

        assert_eq!(store.count("users", doc! { "age": { "$gte": 30 } }).await.unwrap(), 2);
        assert_eq!(store.count("ghosts", doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn builder_creates_named_collections() {
        let store = InMemoryStore::builder().with_collection("b").with_collection("a").build().await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), ["a", "b"]);

        store.drop_collection("a").await.unwrap();
        store.drop_collection("a").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), ["b"]);
    }
}
