//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend`
//! trait. It interprets the same query and update documents a MongoDB server would, so
//! entities and queries behave the same against it. It suits development and tests.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     let mut user = User::default();
//!     user.props_mut().set("name", "Alice")?;
//!     user.create(&store).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod store;
mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
