//! Post-operation hooks for the entity lifecycle.
//!
//! A [`DocumentStore`](crate::store::DocumentStore) holds one [`LifecycleObserver`] and
//! invokes it after every successful create, update and delete. Hooks are never invoked
//! for an operation that failed.

use async_trait::async_trait;
use std::fmt::Debug;
use tracing::info;

use crate::document::EntityId;

/// Receives lifecycle events once the store has acknowledged the write.
///
/// Every method defaults to doing nothing, so implementers override only the events
/// they care about.
#[async_trait]
pub trait LifecycleObserver: Send + Sync + Debug {
    /// Called after an entity has been inserted and received its identifier.
    async fn did_create(&self, _collection: &str, _id: &EntityId) {}

    /// Called after an update has been written. `fields` lists the targeted property
    /// keys; it is empty for a timestamp-only touch.
    async fn did_update(&self, _collection: &str, _id: &EntityId, _fields: &[String]) {}

    /// Called after the backing document has been removed.
    async fn did_delete(&self, _collection: &str, _id: &EntityId) {}
}

/// Default observer: reports each lifecycle event through `tracing` at `INFO`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

#[async_trait]
impl LifecycleObserver for TracingObserver {
    async fn did_create(&self, collection: &str, id: &EntityId) {
        info!(collection, id = %id, "Created {collection} with id '{id}'.");
    }

    async fn did_update(&self, collection: &str, id: &EntityId, fields: &[String]) {
        info!(collection, id = %id, ?fields, "Updated {collection} with id '{id}'.");
    }

    async fn did_delete(&self, collection: &str, id: &EntityId) {
        info!(collection, id = %id, "Deleted {collection} with id '{id}'.");
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LifecycleObserver for NoopObserver {}
