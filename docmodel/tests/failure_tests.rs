mod common;

use std::error::Error;

use common::{FailingStore, User, observed_store};
use docmodel::prelude::*;

#[tokio::test]
async fn failed_create_leaves_entity_transient() {
    let (store, observer) = observed_store(FailingStore::default());
    store.backend().fail_writes(true);

    let mut user = User::new("Alice", 30);
    let err = user.create(&store).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::Store { operation: Operation::Create, id: None, .. }));
    assert_eq!(user.state(), LifecycleState::Transient);
    assert_eq!(user.created_at(), None);
    assert_eq!(user.updated_at(), None);
    assert!(observer.events().is_empty());

    store.backend().fail_writes(false);
    user.create(&store).await.unwrap();
    assert_eq!(observer.events(), ["create user"]);
}

#[tokio::test]
async fn failed_update_keeps_previous_state() {
    let (store, observer) = observed_store(FailingStore::default());
    let mut user = User::new("Alice", 30);
    user.props_mut().set("nickname", "Al").unwrap();
    user.create(&store).await.unwrap();
    let updated_at = user.updated_at();

    store.backend().fail_writes(true);
    user.props_mut().unset("nickname").unwrap();
    let err = user.update(&store).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::Store { operation: Operation::Update, id: Some(_), .. }));
    assert_eq!(user.updated_at(), updated_at);
    assert!(user.props().is_absent("nickname"));
    assert!(matches!(user.touch(&store).await, Err(DocumentStoreError::Store { .. })));
    assert_eq!(observer.events(), ["create user"]);
}

#[tokio::test]
async fn failed_delete_keeps_entity_persisted() {
    let (store, observer) = observed_store(FailingStore::default());
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();

    store.backend().fail_writes(true);
    let err = user.delete(&store).await.unwrap_err();

    assert!(matches!(err, DocumentStoreError::Store { operation: Operation::Delete, .. }));
    assert_eq!(user.state(), LifecycleState::Persisted);
    assert_eq!(observer.events(), ["create user"]);

    store.backend().fail_writes(false);
    user.delete(&store).await.unwrap();
    assert_eq!(observer.events(), ["create user", "delete user"]);
}

#[tokio::test]
async fn failed_finds_surface_from_queries_and_fetch() {
    let (store, _observer) = observed_store(FailingStore::default());
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();
    let id = user.id().unwrap();

    store.backend().fail_reads(true);

    let err = Query::<User>::new().get_all(&store).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Store { operation: Operation::Query, .. }));
    assert!(matches!(Query::<User>::new().count(&store).await, Err(DocumentStoreError::Store { .. })));

    let mut loaded = User::default();
    let err = loaded.fetch(&store, &id).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Store { operation: Operation::Fetch, .. }));
    assert_eq!(loaded.id(), None);
}

#[tokio::test]
async fn store_errors_name_their_context() {
    let (store, _observer) = observed_store(FailingStore::default());
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();
    let id = user.id().unwrap();

    store.backend().fail_writes(true);
    let err = user.update(&store).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("Store error during update on user (id '{id}'): Backend error: connection reset")
    );
    assert_eq!(err.source().unwrap().to_string(), "Backend error: connection reset");
}
