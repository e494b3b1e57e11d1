//! MongoDB backend implementation for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Query
//! and update documents rendered by the core are sent to the server unchanged, and
//! identifiers are the server-generated object ids.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{backend::StoreBackendBuilder, mongodb::MongoDbStore, store::DocumentStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .with_app_name("inventory")
//!         .build()
//!         .await?;
//!     let store = DocumentStore::new(backend);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_mongodb;

pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
