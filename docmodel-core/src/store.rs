//! Main document store interface shared by entities and queries.
//!
//! [`DocumentStore`] bundles a backend with the [`LifecycleObserver`] that entity
//! operations report to. Every entity and query operation takes the store explicitly.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{store::DocumentStore, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let users = store.collection("users");
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::DocumentStoreResult,
    observer::{LifecycleObserver, TracingObserver},
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
///
/// # Example
///
/// ```ignore
/// let store = DocumentStore::new(my_backend).with_observer(Arc::new(NoopObserver));
/// ```
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    observer: Arc<dyn LifecycleObserver>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    ///
    /// Lifecycle events are logged through [`TracingObserver`] until another observer
    /// is installed with [`with_observer`](Self::with_observer).
    pub fn new(backend: B) -> Self {
        Self { backend, observer: Arc::new(TracingObserver) }
    }

    /// Replaces the lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the backend this store talks to.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the observer lifecycle events are reported to.
    pub fn observer(&self) -> &dyn LifecycleObserver {
        &*self.observer
    }

    /// Resolves a collection by name.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the collection
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// Drops (deletes) a collection with the given name.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or deletion fails.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    /// Lists all collections in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// This consumes the store and should be called when no longer needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
