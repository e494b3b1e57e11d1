mod common;

use common::{User, memory_store, observed_store};
use docmodel::{bson::doc, memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Address {
    street: String,
    city: String,
}

async fn stored_document(store: &DocumentStore<InMemoryStore>, user: &User) -> docmodel::bson::Document {
    let id = user.id().unwrap();
    store
        .collection("user")
        .find(doc! { "_id": id })
        .collect()
        .await
        .unwrap()
        .remove(0)
}

#[tokio::test]
async fn create_assigns_identity_and_timestamps() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    assert_eq!(user.state(), LifecycleState::Transient);

    user.create(&store).await.unwrap();

    assert!(user.id().is_some());
    assert_eq!(user.state(), LifecycleState::Persisted);
    assert!(user.created_at().is_some());
    assert_eq!(user.created_at(), user.updated_at());

    let document = stored_document(&store, &user).await;
    assert_eq!(document.get_str("name").unwrap(), "Alice");
    assert_eq!(document.get_i64("createdAt").unwrap(), user.created_at().unwrap());
}

#[tokio::test]
async fn create_then_fetch_yields_identical_props() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.props_mut().set("tags", vec!["admin", "ops"]).unwrap();
    user.props_mut()
        .set_as("address", &Address { street: "1 Main St".into(), city: "Oslo".into() })
        .unwrap();
    user.create(&store).await.unwrap();

    let fetched = Query::<User>::get_for_id(&store, &user.id().unwrap()).await.unwrap();
    assert_eq!(fetched.props(), user.props());
    assert_eq!(fetched.created_at(), user.created_at());

    let mut loaded = User::default();
    loaded.fetch(&store, &user.id().unwrap()).await.unwrap();
    assert_eq!(loaded.id(), user.id());
    assert_eq!(loaded.name(), Some("Alice"));
    assert_eq!(
        loaded.props().get_as::<Address>("address").unwrap(),
        Some(Address { street: "1 Main St".into(), city: "Oslo".into() })
    );
}

#[tokio::test]
async fn creating_twice_is_rejected() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();

    let err = user.create(&store).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidState { operation: Operation::Create, .. }));
    assert_eq!(store.collection("user").count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn transient_entities_cannot_be_written() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);

    assert!(matches!(
        user.update(&store).await,
        Err(DocumentStoreError::InvalidState { operation: Operation::Update, id: None, .. })
    ));
    assert!(matches!(user.touch(&store).await, Err(DocumentStoreError::InvalidState { .. })));
    assert!(matches!(
        user.delete(&store).await,
        Err(DocumentStoreError::InvalidState { operation: Operation::Delete, .. })
    ));
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn partial_update_leaves_other_fields_alone() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();

    user.set_name("Bob");
    user.set_age(31);
    user.update_keys(&store, &["age"]).await.unwrap();

    let fetched = Query::<User>::get_for_id(&store, &user.id().unwrap()).await.unwrap();
    assert_eq!(fetched.name(), Some("Alice"));
    assert_eq!(fetched.age(), Some(31));
    assert_eq!(fetched.updated_at(), user.updated_at());
}

#[tokio::test]
async fn full_update_writes_every_key() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();

    user.set_name("Bob");
    user.props_mut().set("email", "bob@example.com").unwrap();
    user.update(&store).await.unwrap();

    let fetched = Query::<User>::get_for_id(&store, &user.id().unwrap()).await.unwrap();
    assert_eq!(fetched.name(), Some("Bob"));
    assert_eq!(fetched.props().get_str("email"), Some("bob@example.com"));
}

#[tokio::test]
async fn unset_fields_are_removed_from_the_document() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.props_mut().set("nickname", "Al").unwrap();
    user.create(&store).await.unwrap();

    user.props_mut().unset("nickname").unwrap();
    user.update_keys(&store, &["nickname"]).await.unwrap();

    assert!(!user.props().contains_key("nickname"));
    let document = stored_document(&store, &user).await;
    assert!(!document.contains_key("nickname"));
    assert_eq!(document.get_str("name").unwrap(), "Alice");
}

#[tokio::test]
async fn keys_missing_from_props_are_removed_too() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.props_mut().set("nickname", "Al").unwrap();
    user.create(&store).await.unwrap();

    user.props_mut().remove("nickname");
    user.update_keys(&store, &["nickname"]).await.unwrap();

    assert!(!stored_document(&store, &user).await.contains_key("nickname"));
}

#[tokio::test]
async fn reserved_keys_cannot_be_updated() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();

    for key in ["_id", "id", "createdAt", "updatedAt"] {
        assert!(matches!(
            user.update_keys(&store, &[key]).await,
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }
    assert!(matches!(user.props_mut().set("createdAt", 1), Err(DocumentStoreError::InvalidDocument(_))));
}

#[tokio::test]
async fn touch_only_bumps_updated_at() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();
    let created_at = user.created_at();

    user.set_name("Bob");
    user.touch(&store).await.unwrap();

    let document = stored_document(&store, &user).await;
    assert_eq!(document.get_str("name").unwrap(), "Alice");
    assert_eq!(document.get_i64("updatedAt").unwrap(), user.updated_at().unwrap());
    assert!(user.updated_at() >= created_at);
    assert_eq!(user.created_at(), created_at);
}

#[tokio::test]
async fn deleted_entities_are_gone() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();
    let id = user.id().unwrap();

    user.delete(&store).await.unwrap();
    assert_eq!(user.state(), LifecycleState::Deleted);
    assert_eq!(user.name(), Some("Alice"));

    let err = Query::<User>::get_for_id(&store, &id).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::NotFound { id: missing, .. } if missing == id));

    let mut reloaded = User::default();
    assert!(matches!(
        reloaded.fetch(&store, &id).await,
        Err(DocumentStoreError::NotFound { operation: Operation::Fetch, .. })
    ));

    assert!(matches!(
        user.delete(&store).await,
        Err(DocumentStoreError::InvalidState { operation: Operation::Delete, .. })
    ));
    assert!(matches!(user.update(&store).await, Err(DocumentStoreError::InvalidState { .. })));
}

#[tokio::test]
async fn writes_to_a_vanished_document_report_not_found() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();

    let mut other = Query::<User>::get_for_id(&store, &user.id().unwrap()).await.unwrap();
    other.delete(&store).await.unwrap();

    assert!(matches!(
        user.update(&store).await,
        Err(DocumentStoreError::NotFound { operation: Operation::Update, .. })
    ));
    assert!(matches!(
        user.delete(&store).await,
        Err(DocumentStoreError::NotFound { operation: Operation::Delete, .. })
    ));
}

#[tokio::test]
async fn observer_sees_each_successful_write() {
    let (store, observer) = observed_store(InMemoryStore::new());
    let mut user = User::new("Alice", 30);

    user.create(&store).await.unwrap();
    user.set_age(31);
    user.update_keys(&store, &["age"]).await.unwrap();
    user.touch(&store).await.unwrap();
    user.delete(&store).await.unwrap();

    assert_eq!(
        observer.events(),
        ["create user", "update user age", "update user ", "delete user"]
    );
}

#[tokio::test]
async fn json_view_and_display_include_identity() {
    let store = memory_store();
    let mut user = User::new("Alice", 30);
    user.create(&store).await.unwrap();
    let id = user.id().unwrap();

    let json = user.to_json().unwrap();
    assert_eq!(json["id"], id.to_hex());
    assert_eq!(json["name"], "Alice");
    assert_eq!(json["age"], 30);
    assert_eq!(json["createdAt"], user.created_at().unwrap());

    let dump = user.record().to_string();
    assert!(dump.contains(&format!("id = {id}")));
    assert!(dump.contains("name = \"Alice\""));
}
