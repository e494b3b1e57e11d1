//! Main docmodel crate: entities with a create/fetch/update/delete lifecycle and a query
//! builder over schemaless document stores.
//!
//! This crate is the primary entry point for users of the docmodel framework. It
//! re-exports the core types from the sub-crates and provides access to the storage
//! backends.
//!
//! # Features
//!
//! - **Entities** - Application types own a [`Record`](entity::Record) of identifier, timestamps and properties
//! - **Partial updates** - Only the targeted keys are written; unset keys are removed from the document
//! - **Queries** - Filters, conditions, sorting, limits and pagination, translated to native query documents
//! - **Multiple backends** - In-memory and MongoDB storage behind one connector trait
//! - **Lifecycle hooks** - Observers notified after every successful write
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Default)]
//! pub struct User {
//!     record: Record,
//! }
//!
//! impl Entity for User {
//!     fn collection_name() -> &'static str { "user" }
//!     fn record(&self) -> &Record { &self.record }
//!     fn record_mut(&mut self) -> &mut Record { &mut self.record }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!
//!     let mut user = User::default();
//!     user.props_mut().set("name", "Alice")?;
//!     user.props_mut().set("age", 30)?;
//!     user.create(&store).await?;
//!
//!     user.props_mut().set("age", 31)?;
//!     user.update_keys(&store, &["age"]).await?;
//!
//!     let mut query = Query::<User>::new();
//!     query.add_filter(Filter::gte("age", 18)).set_sort(Sort::ascending("name"));
//!     let adults = query.get_all(&store).await?;
//!
//!     user.delete(&store).await?;
//!     store.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{backend, collection, document, entity, error, filter, observer, page, query, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
