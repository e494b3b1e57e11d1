#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use docmodel::{bson::Document, memory::InMemoryStore, prelude::*};

#[derive(Debug, Default)]
pub struct User {
    record: Record,
}

impl Entity for User {
    fn collection_name() -> &'static str {
        "user"
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl User {
    pub fn new(name: &str, age: i64) -> Self {
        let mut user = Self::default();
        user.set_name(name);
        user.set_age(age);
        user
    }

    pub fn name(&self) -> Option<&str> {
        self.props().get_str("name")
    }

    pub fn set_name(&mut self, name: &str) {
        self.props_mut().set("name", name).unwrap();
    }

    pub fn age(&self) -> Option<i64> {
        self.props().get_i64("age")
    }

    pub fn set_age(&mut self, age: i64) {
        self.props_mut().set("age", age).unwrap();
    }
}

/// An entity restricted to a declared set of fields.
#[derive(Debug, Default)]
pub struct Product {
    record: Record,
}

impl Entity for Product {
    fn collection_name() -> &'static str {
        "product"
    }

    fn schema() -> &'static [&'static str] {
        &["sku", "price"]
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

pub fn memory_store() -> DocumentStore<InMemoryStore> {
    DocumentStore::new(InMemoryStore::new())
}

pub async fn seed_users(store: &DocumentStore<impl StoreBackend>, people: &[(&str, i64)]) -> Vec<User> {
    let mut users = Vec::with_capacity(people.len());

    for (name, age) in people {
        let mut user = User::new(name, *age);
        user.create(store).await.unwrap();
        users.push(user);
    }

    users
}

/// Remembers every lifecycle event as `"<event> <collection> <fields>"`.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl LifecycleObserver for RecordingObserver {
    async fn did_create(&self, collection: &str, _id: &EntityId) {
        self.push(format!("create {collection}"));
    }

    async fn did_update(&self, collection: &str, _id: &EntityId, fields: &[String]) {
        self.push(format!("update {collection} {}", fields.join(",")));
    }

    async fn did_delete(&self, collection: &str, _id: &EntityId) {
        self.push(format!("delete {collection}"));
    }
}

pub fn observed_store<B: StoreBackend>(backend: B) -> (DocumentStore<B>, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let store = DocumentStore::new(backend).with_observer(observer.clone());

    (store, observer)
}

/// In-memory backend whose writes and finds can be switched to fail.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: InMemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl FailingStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool) -> DocumentStoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Backend("connection reset".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl StoreBackend for FailingStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<EntityId> {
        self.check(&self.fail_writes)?;
        self.inner.insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        id: &EntityId,
        update: &UpdateDocument,
    ) -> DocumentStoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.update_one(collection, id, update).await
    }

    async fn delete_one(&self, collection: &str, id: &EntityId) -> DocumentStoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.delete_one(collection, id).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.check(&self.fail_reads)?;
        self.inner.find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: Document) -> DocumentStoreResult<u64> {
        self.check(&self.fail_reads)?;
        self.inner.count(collection, filter).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.inner.list_collections().await
    }
}
