use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, FindOptions as MongoFindOptions},
};
use tracing::{debug, trace};
use docmodel_core::{
    backend::{FindOptions, StoreBackend, StoreBackendBuilder, UpdateDocument},
    document::{EntityId, ID_FIELD},
    error::{DocumentStoreError, DocumentStoreResult},
};

fn backend_error(err: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(err.to_string())
}

fn document_not_found(id: &EntityId, collection: &str) -> DocumentStoreError {
    DocumentStoreError::DocumentNotFound(id.to_hex(), collection.to_string())
}

/// Converts cursor modifiers into driver find options.
fn find_options(options: &FindOptions) -> MongoFindOptions {
    let mut mongo_options = MongoFindOptions::default();

    mongo_options.limit = options.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
    mongo_options.skip = options.skip.map(|skip| skip as u64);
    mongo_options.sort = options.sort_document();

    mongo_options
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<EntityId> {
        if document.contains_key(ID_FIELD) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "inserted documents must not carry an {ID_FIELD} field"
            )));
        }

        let result = self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(backend_error)?;

        let id = result.inserted_id
            .as_object_id()
            .map(EntityId::from)
            .ok_or_else(|| DocumentStoreError::Backend(format!(
                "expected an object id for the inserted document, found {}",
                result.inserted_id
            )))?;

        trace!(collection, id = %id, "inserted document");

        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &EntityId,
        update: &UpdateDocument,
    ) -> DocumentStoreResult<()> {
        // An empty update document is rejected by the server; only check existence.
        let matched = if update.is_empty() {
            self.get_collection(collection)
                .count_documents(doc! { ID_FIELD: *id })
                .await
                .map_err(backend_error)?
        } else {
            self.get_collection(collection)
                .update_one(doc! { ID_FIELD: *id }, update.to_document())
                .await
                .map_err(backend_error)?
                .matched_count
        };

        if matched == 0 {
            return Err(document_not_found(id, collection));
        }

        trace!(collection, id = %id, "updated document");

        Ok(())
    }

    async fn delete_one(&self, collection: &str, id: &EntityId) -> DocumentStoreResult<()> {
        let result = self.get_collection(collection)
            .delete_one(doc! { ID_FIELD: *id })
            .await
            .map_err(backend_error)?;

        if result.deleted_count == 0 {
            return Err(document_not_found(id, collection));
        }

        trace!(collection, id = %id, "deleted document");

        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(filter)
            .with_options(find_options(&options))
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(filter)
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)?;
        names.sort();

        Ok(names)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shutdown().await
    }
}

/// Builder for [`MongoDbStore`], connecting from a connection string.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
        }
    }

    /// Sets the application name reported to the server.
    pub fn with_app_name(mut self, app_name: &str) -> Self {
        self.app_name = Some(app_name.to_string());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(app_name) = self.app_name {
            options.app_name = Some(app_name);
        }

        debug!(database = %self.database, hosts = ?options.hosts, "connecting to mongodb");

        Ok(MongoDbStore::new(
            Client::with_options(options)
                .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
