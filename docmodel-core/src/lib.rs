//! Entity lifecycle and query building over a schemaless document store.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Entities** ([`entity`]) - The [`Entity`](entity::Entity) trait and its create/fetch/update/delete lifecycle
//! - **Properties and identifiers** ([`document`]) - Property maps with explicit absent values, and entity ids
//! - **Filters** ([`filter`]) - Filter, sort, condition and limit value objects
//! - **Queries** ([`query`]) - Query building, translation to native query documents, and execution
//! - **Store backend abstraction** ([`backend`]) - The connector contract implemented by storage backends
//! - **Collections interface** ([`collection`]) - Collection handles and find cursors
//! - **Document store** ([`store`]) - The store handle passed to every operation
//! - **Lifecycle hooks** ([`observer`]) - Observers notified after successful writes
//! - **Pagination** ([`page`]) - Page results and pagination parameters
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[derive(Debug, Default)]
//! pub struct User {
//!     record: Record,
//! }
//!
//! impl Entity for User {
//!     fn collection_name() -> &'static str {
//!         "user"
//!     }
//!
//!     fn record(&self) -> &Record {
//!         &self.record
//!     }
//!
//!     fn record_mut(&mut self) -> &mut Record {
//!         &mut self.record
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod entity;
pub mod error;
pub mod filter;
pub mod observer;
pub mod page;
pub mod query;
pub mod store;
