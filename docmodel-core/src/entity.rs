//! Entities and their create/fetch/update/delete lifecycle.
//!
//! An application type becomes an entity by implementing [`Entity`]: it names its
//! collection and exposes the [`Record`] holding identifier, timestamps and properties.
//! The lifecycle operations come from [`EntityExt`], which is implemented for every
//! [`Entity`] automatically.
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
//!     fn collection_name() -> &'static str { "user" }
//!     fn record(&self) -> &Record { &self.record }
//!     fn record_mut(&mut self) -> &mut Record { &mut self.record }
//! }
//!
//! impl User {
//!     pub fn name(&self) -> Option<&str> { self.props().get_str("name") }
//!     pub fn set_name(&mut self, name: &str) -> DocumentStoreResult<()> {
//!         self.props_mut().set("name", name)
//!     }
//! }
//!
//! let mut user = User::default();
//! user.set_name("Alice")?;
//! user.create(&store).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

use crate::{
    backend::{StoreBackend, UpdateDocument},
    document::{
        CREATED_AT_FIELD, EntityId, ID_ALIAS, ID_FIELD, Props, UPDATED_AT_FIELD, validate_field,
    },
    error::{DocumentStoreError, DocumentStoreResult, Operation},
    store::DocumentStore,
};

/// Where an entity stands relative to its backing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Never persisted; no identifier.
    Transient,
    /// Backed by a stored document.
    Persisted,
    /// The backing document was deleted. The in-memory values are stale.
    Deleted,
}

/// Identifier, timestamps and properties of one entity.
///
/// Identifier and timestamps have no public setters: they change only through the
/// lifecycle operations of [`EntityExt`] and through [`Record::decode`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    id: Option<EntityId>,
    created_at: Option<i64>,
    updated_at: Option<i64>,
    deleted: bool,
    props: Props,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Creation time in milliseconds since the Unix epoch.
    pub fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    /// Last update time in milliseconds since the Unix epoch.
    pub fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut Props {
        &mut self.props
    }

    pub fn state(&self) -> LifecycleState {
        match (self.id, self.deleted) {
            (None, _) => LifecycleState::Transient,
            (Some(_), false) => LifecycleState::Persisted,
            (Some(_), true) => LifecycleState::Deleted,
        }
    }

    /// Produces the flat document sent to the store.
    ///
    /// Contains every present property plus `updatedAt` and `createdAt` when set. The
    /// identifier is never part of the encoding.
    pub fn encode(&self) -> Document {
        let mut document = self
            .props
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Document>();

        if let Some(updated_at) = self.updated_at {
            document.insert(UPDATED_AT_FIELD, updated_at);
        }
        if let Some(created_at) = self.created_at {
            document.insert(CREATED_AT_FIELD, created_at);
        }

        document
    }

    /// Merges a stored document into this record.
    ///
    /// `_id`/`id` set the identifier, `updatedAt`/`createdAt` set the timestamps and every
    /// other key is upserted into the properties. Properties missing from `document` are
    /// kept. Nothing is modified if a reserved value cannot be decoded.
    pub fn decode(&mut self, document: &Document) -> DocumentStoreResult<()> {
        let mut id = self.id;
        let mut created_at = self.created_at;
        let mut updated_at = self.updated_at;
        let mut props = Vec::with_capacity(document.len());

        for (key, value) in document {
            match key.as_str() {
                ID_FIELD | ID_ALIAS => id = Some(EntityId::try_from(value)?),
                UPDATED_AT_FIELD => updated_at = decode_timestamp(key, value)?,
                CREATED_AT_FIELD => created_at = decode_timestamp(key, value)?,
                _ => props.push((key.clone(), value.clone())),
            }
        }

        self.id = id;
        self.created_at = created_at;
        self.updated_at = updated_at;
        for (key, value) in props {
            self.props.upsert(key, value);
        }

        Ok(())
    }

    /// JSON view of the record: the properties plus `id`, `createdAt` and `updatedAt`.
    pub fn to_json(&self) -> DocumentStoreResult<Value> {
        let mut json = Map::new();

        for (key, value) in self.props.iter() {
            json.insert(key.to_string(), serde_json::to_value(value)?);
        }
        json.insert(ID_ALIAS.to_string(), self.id.map_or(Value::Null, |id| Value::String(id.to_hex())));
        json.insert(CREATED_AT_FIELD.to_string(), self.created_at.map_or(Value::Null, Value::from));
        json.insert(UPDATED_AT_FIELD.to_string(), self.updated_at.map_or(Value::Null, Value::from));

        Ok(Value::Object(json))
    }
}

fn decode_timestamp(key: &str, value: &Bson) -> DocumentStoreResult<Option<i64>> {
    match value {
        Bson::Null => Ok(None),
        Bson::Int64(ms) => Ok(Some(*ms)),
        Bson::Int32(ms) => Ok(Some(i64::from(*ms))),
        Bson::Double(ms) if ms.is_finite() => Ok(Some(*ms as i64)),
        Bson::DateTime(dt) => Ok(Some(dt.timestamp_millis())),
        other => Err(DocumentStoreError::InvalidDocument(format!(
            "expected a millisecond timestamp for {key}, found {other}"
        ))),
    }
}

fn format_timestamp(ms: Option<i64>) -> String {
    match ms {
        Some(ms) => match DateTime::<Utc>::from_timestamp_millis(ms) {
            Some(at) => format!("{ms} ({})", at.to_rfc3339()),
            None => ms.to_string(),
        },
        None => "none".to_string(),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Record {{")?;
        match self.id {
            Some(id) => writeln!(f, "    id = {id},")?,
            None => writeln!(f, "    id = none,")?,
        }
        writeln!(f, "    updatedAt = {},", format_timestamp(self.updated_at))?;
        writeln!(f, "    createdAt = {},", format_timestamp(self.created_at))?;
        writeln!(f, "    props = {{")?;

        let count = self.props.iter().count();
        for (i, (key, value)) in self.props.iter().enumerate() {
            let comma = if i + 1 == count { "" } else { "," };
            writeln!(f, "        {key} = {value}{comma}")?;
        }

        writeln!(f, "    }}")?;
        write!(f, "}}")
    }
}

/// Core trait implemented by application types stored as documents.
///
/// The type names its collection and exposes its [`Record`]. `Default` produces the blank
/// instance that query results are decoded into.
pub trait Entity: Default + Send + Sync + 'static {
    /// Returns the name of the collection this entity is stored in.
    fn collection_name() -> &'static str;

    /// Property names filters and sorts may reference.
    ///
    /// An empty slice (the default) accepts any field name.
    fn schema() -> &'static [&'static str] {
        &[]
    }

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;
}

/// Lifecycle operations and record accessors for every [`Entity`].
///
/// Each store-touching operation is one round trip. On success the matching
/// [`LifecycleObserver`](crate::observer::LifecycleObserver) hook runs; on failure the
/// error is returned and no hook runs.
#[async_trait]
pub trait EntityExt: Entity {
    fn id(&self) -> Option<EntityId>;

    fn created_at(&self) -> Option<i64>;

    fn updated_at(&self) -> Option<i64>;

    fn props(&self) -> &Props;

    fn props_mut(&mut self) -> &mut Props;

    fn state(&self) -> LifecycleState;

    /// See [`Record::encode`].
    fn encode(&self) -> Document;

    /// See [`Record::decode`].
    fn decode(&mut self, document: &Document) -> DocumentStoreResult<()>;

    /// See [`Record::to_json`].
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Decodes a stored document into a fresh instance.
    fn from_document(document: &Document) -> DocumentStoreResult<Self>;

    /// Inserts this entity and assigns the identifier generated by the store.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidState`] if the entity already has an identifier
    /// - [`DocumentStoreError::Store`] if the insert fails; timestamps are rolled back
    async fn create<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()>;

    /// Writes every current property key. Absent keys are removed from the document.
    async fn update<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()>;

    /// Writes the given property keys, or every current key when `keys` is empty.
    ///
    /// Keys whose value is absent (unset, or not in the properties at all) are removed
    /// from the stored document; the others are set. `updatedAt` is always written.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidState`] if the entity is transient or deleted
    /// - [`DocumentStoreError::InvalidDocument`] if a key is reserved or malformed
    /// - [`DocumentStoreError::NotFound`] if the document no longer exists
    /// - [`DocumentStoreError::Store`] if the write fails; `updatedAt` is rolled back
    async fn update_keys<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        keys: &[&str],
    ) -> DocumentStoreResult<()>;

    /// Writes only a fresh `updatedAt`.
    async fn touch<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()>;

    /// Removes the backing document. The in-memory values are left in place.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidState`] if the entity is transient or already deleted
    /// - [`DocumentStoreError::NotFound`] if the document no longer exists
    /// - [`DocumentStoreError::Store`] if the delete fails
    async fn delete<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()>;

    /// Loads the document addressed by `id` into this instance.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::NotFound`] if no document has this identifier
    /// - [`DocumentStoreError::Store`] if the find fails
    async fn fetch<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        id: &EntityId,
    ) -> DocumentStoreResult<()>;
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn store_failure(
    err: DocumentStoreError,
    operation: Operation,
    collection: &str,
    id: Option<&EntityId>,
) -> DocumentStoreError {
    let err = DocumentStoreError::from_backend(err, operation, collection, id);
    warn!(%operation, collection, error = %err, "store operation failed");
    err
}

/// Returns the identifier of a persisted record, or the lifecycle error for `operation`.
fn persisted_id(record: &Record, operation: Operation, collection: &str) -> DocumentStoreResult<EntityId> {
    match (record.state(), record.id) {
        (LifecycleState::Persisted, Some(id)) => Ok(id),
        (LifecycleState::Deleted, id) => Err(DocumentStoreError::InvalidState {
            operation,
            collection: collection.to_string(),
            id,
            reason: "entity has been deleted",
        }),
        (_, id) => Err(DocumentStoreError::InvalidState {
            operation,
            collection: collection.to_string(),
            id,
            reason: "entity has not been created",
        }),
    }
}

#[async_trait]
impl<E: Entity> EntityExt for E {
    fn id(&self) -> Option<EntityId> {
        self.record().id()
    }

    fn created_at(&self) -> Option<i64> {
        self.record().created_at()
    }

    fn updated_at(&self) -> Option<i64> {
        self.record().updated_at()
    }

    fn props(&self) -> &Props {
        self.record().props()
    }

    fn props_mut(&mut self) -> &mut Props {
        self.record_mut().props_mut()
    }

    fn state(&self) -> LifecycleState {
        self.record().state()
    }

    fn encode(&self) -> Document {
        self.record().encode()
    }

    fn decode(&mut self, document: &Document) -> DocumentStoreResult<()> {
        self.record_mut().decode(document)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        self.record().to_json()
    }

    fn from_document(document: &Document) -> DocumentStoreResult<Self> {
        let mut entity = Self::default();
        entity.decode(document)?;

        Ok(entity)
    }

    async fn create<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        let collection = Self::collection_name();

        if let Some(id) = self.record().id {
            return Err(DocumentStoreError::InvalidState {
                operation: Operation::Create,
                collection: collection.to_string(),
                id: Some(id),
                reason: "entity already exists",
            });
        }

        let record = self.record_mut();
        let previous = (record.created_at, record.updated_at);
        let now = now_millis();
        record.created_at = Some(now);
        record.updated_at = Some(now);
        let document = record.encode();

        let id = match store.collection(collection).insert_one(document).await {
            Ok(id) => id,
            Err(err) => {
                let record = self.record_mut();
                (record.created_at, record.updated_at) = previous;
                return Err(store_failure(err, Operation::Create, collection, None));
            }
        };

        let record = self.record_mut();
        record.id = Some(id);
        record.deleted = false;

        store.observer().did_create(collection, &id).await;

        Ok(())
    }

    async fn update<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        self.update_keys(store, &[]).await
    }

    async fn update_keys<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        keys: &[&str],
    ) -> DocumentStoreResult<()> {
        let collection = Self::collection_name();
        let id = persisted_id(self.record(), Operation::Update, collection)?;

        for key in keys {
            validate_field(key)?;
        }

        let record = self.record_mut();
        let mut targets: Vec<String> = Vec::new();
        let candidates: Vec<&str> = if keys.is_empty() {
            record.props.keys().collect()
        } else {
            keys.to_vec()
        };
        for key in candidates {
            if !targets.iter().any(|t| t == key) {
                targets.push(key.to_string());
            }
        }

        let now = now_millis();
        let mut update = UpdateDocument::new();
        for key in &targets {
            match record.props.entry(key) {
                Some(Some(value)) => {
                    update.set.insert(key.clone(), value.clone());
                }
                _ => update.unset.push(key.clone()),
            }
        }
        update.set.insert(UPDATED_AT_FIELD, now);

        let previous = record.updated_at;
        record.updated_at = Some(now);

        if let Err(err) = store.collection(collection).update_one(&id, &update).await {
            self.record_mut().updated_at = previous;
            return Err(store_failure(err, Operation::Update, collection, Some(&id)));
        }

        self.record_mut()
            .props
            .prune_absent(update.unset.iter().map(String::as_str));

        store.observer().did_update(collection, &id, &targets).await;

        Ok(())
    }

    async fn touch<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        let collection = Self::collection_name();
        let id = persisted_id(self.record(), Operation::Update, collection)?;
        let now = now_millis();
        let update = UpdateDocument { set: doc! { UPDATED_AT_FIELD: now }, unset: Vec::new() };

        let record = self.record_mut();
        let previous = record.updated_at;
        record.updated_at = Some(now);

        if let Err(err) = store.collection(collection).update_one(&id, &update).await {
            self.record_mut().updated_at = previous;
            return Err(store_failure(err, Operation::Update, collection, Some(&id)));
        }

        store.observer().did_update(collection, &id, &[]).await;

        Ok(())
    }

    async fn delete<B: StoreBackend>(&mut self, store: &DocumentStore<B>) -> DocumentStoreResult<()> {
        let collection = Self::collection_name();
        let id = persisted_id(self.record(), Operation::Delete, collection)?;

        store
            .collection(collection)
            .delete_one(&id)
            .await
            .map_err(|err| store_failure(err, Operation::Delete, collection, Some(&id)))?;

        self.record_mut().deleted = true;

        store.observer().did_delete(collection, &id).await;

        Ok(())
    }

    async fn fetch<B: StoreBackend>(
        &mut self,
        store: &DocumentStore<B>,
        id: &EntityId,
    ) -> DocumentStoreResult<()> {
        let collection = Self::collection_name();

        let document = store
            .collection(collection)
            .find(doc! { ID_FIELD: *id })
            .limit(1)
            .collect()
            .await
            .map_err(|err| store_failure(err, Operation::Fetch, collection, Some(id)))?
            .into_iter()
            .next()
            .ok_or_else(|| DocumentStoreError::NotFound {
                operation: Operation::Fetch,
                collection: collection.to_string(),
                id: *id,
            })?;

        let record = self.record_mut();
        record.decode(&document)?;
        record.id = Some(*id);
        record.deleted = false;

        Ok(())
    }
}
