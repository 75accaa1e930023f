//! Integration tests for the table facade.

use serde_json::json;
use strata_core::{Error, ErrorKind, Operation, Record, Value};
use strata_database::Database;
use strata_storage::MemoryBackend;

fn record(json: serde_json::Value) -> Record {
    Record::from_json(json).unwrap()
}

fn setup() -> (Database, MemoryBackend) {
    let backend = MemoryBackend::new();
    let db = Database::new("shop", backend.clone());
    db.version(1)
        .stores(&[
            ("tasks", "++id,date,description,done"),
            ("people", "email,name,&handle,address.city"),
            ("notes", ",title"),
        ])
        .unwrap()
        .declare()
        .unwrap();
    (db, backend)
}

#[tokio::test]
async fn test_put_and_get() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();

    let id = tasks.put(record(json!({"description": "write", "done": 0}))).await.unwrap();
    assert_eq!(id, Value::Int64(1));
    let stored = tasks.get(1).await.unwrap().unwrap();
    assert_eq!(stored.get("id"), Some(&Value::Int64(1)));
    assert_eq!(stored.get("description"), Some(&Value::from("write")));

    assert_eq!(tasks.get(42).await.unwrap(), None);

    let replaced = tasks
        .put(record(json!({"id": 1, "description": "rewrite", "done": 1})))
        .await
        .unwrap();
    assert_eq!(replaced, Value::Int64(1));
    assert_eq!(tasks.count().await.unwrap(), 1);
    let stored = tasks.get(1).await.unwrap().unwrap();
    assert_eq!(stored.get("description"), Some(&Value::from("rewrite")));
}

#[tokio::test]
async fn test_generated_keys_skip_explicit_ones() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    tasks.add(record(json!({"id": 10, "done": 0}))).await.unwrap();
    let next = tasks.add(record(json!({"done": 0}))).await.unwrap();
    assert_eq!(next, Value::Int64(11));
}

#[tokio::test]
async fn test_add_existing_key_is_constraint_error() {
    let (db, backend) = setup();
    let people = db.table("people").unwrap();
    people
        .add(record(json!({"email": "ada@example.com", "name": "Ada"})))
        .await
        .unwrap();

    let err = people
        .add(record(json!({"email": "ada@example.com", "name": "Ada L."})))
        .await
        .unwrap_err();
    assert_eq!(err.kind().name(), "ConstraintError");
    assert!(matches!(err, Error::Constraint { operation: Operation::Add, .. }));

    let stored = backend.records_of("shop", "people").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("name"), Some(&Value::from("Ada")));
}

#[tokio::test]
async fn test_unique_index_conflict() {
    let (db, _) = setup();
    let people = db.table("people").unwrap();
    people
        .put(record(json!({"email": "a@example.com", "handle": "ace"})))
        .await
        .unwrap();
    let err = people
        .put(record(json!({"email": "b@example.com", "handle": "ace"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);

    // Rewriting the owner of the unique value is fine.
    people
        .put(record(json!({"email": "a@example.com", "handle": "ace", "name": "A"})))
        .await
        .unwrap();
    assert_eq!(people.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_inline_key_is_constraint_error() {
    let (db, _) = setup();
    let people = db.table("people").unwrap();
    let err = people.put(record(json!({"name": "nobody"}))).await.unwrap_err();
    assert!(matches!(err, Error::Constraint { operation: Operation::Put, .. }));

    let err = people
        .put_with_key(record(json!({"email": "x@example.com"})), "other")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
}

#[tokio::test]
async fn test_update_merges_key_paths() {
    let (db, _) = setup();
    let people = db.table("people").unwrap();
    people
        .put(record(json!({
            "email": "ada@example.com",
            "name": "Ada",
            "address": {"city": "London", "street": "St James's Square"}
        })))
        .await
        .unwrap();

    people
        .update("ada@example.com", record(json!({"address.city": "Paris", "age": 36})))
        .await
        .unwrap();

    let stored = people.get("ada@example.com").await.unwrap().unwrap();
    assert_eq!(stored.get_path("address.city"), Some(&Value::from("Paris")));
    assert_eq!(stored.get_path("address.street"), Some(&Value::from("St James's Square")));
    assert_eq!(stored.get("age"), Some(&Value::Int64(36)));

    let found = people.where_("address.city").equals("Paris").count().await.unwrap();
    assert_eq!(found, 1);
}

#[tokio::test]
async fn test_update_missing_record_is_not_found() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    let err = tasks.update(7, record(json!({"done": 1}))).await.unwrap_err();
    assert_eq!(err, Error::not_found("tasks", Value::Int64(7)));
    assert_eq!(tasks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_primary_key_is_rejected() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    tasks.add(record(json!({"done": 0}))).await.unwrap();
    let err = tasks.update(1, record(json!({"id": 2}))).await.unwrap_err();
    assert!(matches!(err, Error::Constraint { operation: Operation::Update, .. }));
    assert!(tasks.get(1).await.unwrap().is_some());
    assert!(tasks.get(2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_absent_key_succeeds() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    tasks.add(record(json!({"done": 0}))).await.unwrap();
    tasks.delete(99).await.unwrap();
    assert_eq!(tasks.count().await.unwrap(), 1);
    tasks.delete(1).await.unwrap();
    assert_eq!(tasks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_bulk_operations() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    let keys = tasks
        .bulk_add(vec![
            record(json!({"description": "a", "done": 0})),
            record(json!({"description": "b", "done": 0})),
            record(json!({"description": "c", "done": 1})),
        ])
        .await
        .unwrap();
    assert_eq!(keys, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);

    let found = tasks
        .bulk_get(vec![Value::Int64(3), Value::Int64(9), Value::Int64(1)])
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(found[0].as_ref().unwrap().get("description"), Some(&Value::from("c")));
    assert!(found[1].is_none());
    assert_eq!(found[2].as_ref().unwrap().get("description"), Some(&Value::from("a")));

    tasks.bulk_delete(vec![Value::Int64(1), Value::Int64(3)]).await.unwrap();
    assert_eq!(tasks.count().await.unwrap(), 1);

    tasks.clear().await.unwrap();
    assert_eq!(tasks.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_bulk_put_invalid_record_writes_nothing() {
    let (db, backend) = setup();
    let people = db.table("people").unwrap();
    let err = people
        .bulk_put(vec![
            record(json!({"email": "a@example.com"})),
            record(json!({"email": "b@example.com"})),
            record(json!({"name": "no key"})),
            record(json!({"email": "d@example.com"})),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(err.position(), Some(2));
    assert_eq!(backend.records_of("shop", "people").unwrap().len(), 0);
}

#[tokio::test]
async fn test_bulk_add_conflict_rolls_back() {
    let (db, backend) = setup();
    let people = db.table("people").unwrap();
    people.add(record(json!({"email": "b@example.com"}))).await.unwrap();

    let err = people
        .bulk_add(vec![
            record(json!({"email": "a@example.com"})),
            record(json!({"email": "b@example.com"})),
            record(json!({"email": "c@example.com"})),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Constraint { operation: Operation::BulkAdd, .. }));
    assert_eq!(err.position(), Some(1));
    assert_eq!(backend.records_of("shop", "people").unwrap().len(), 1);
}

#[tokio::test]
async fn test_outbound_keys() {
    let (db, _) = setup();
    let notes = db.table("notes").unwrap();
    let key = notes.put_with_key(record(json!({"title": "draft"})), "n-1").await.unwrap();
    assert_eq!(key, Value::from("n-1"));
    let stored = notes.get("n-1").await.unwrap().unwrap();
    assert_eq!(stored.get("title"), Some(&Value::from("draft")));

    let err = notes.put(record(json!({"title": "keyless"}))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);

    notes.update("n-1", record(json!({"title": "final"}))).await.unwrap();
    let titles = notes.where_("title").equals("final").primary_keys().await.unwrap();
    assert_eq!(titles, vec![Value::from("n-1")]);

    let keys = notes
        .bulk_put_with_keys(
            vec![record(json!({"title": "x"})), record(json!({"title": "y"}))],
            vec![Value::from("n-2"), Value::from("n-3")],
        )
        .await
        .unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(notes.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_invalid_key_argument() {
    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    let err = tasks.get(Value::Null).await.unwrap_err();
    assert_eq!(err.kind().name(), "DataError");
    let err = tasks.delete(true).await.unwrap_err();
    assert!(matches!(err, Error::InvalidKey { operation: Operation::Delete, .. }));
}

#[tokio::test]
async fn test_unknown_table() {
    let (db, _) = setup();
    let err = db.table("orders").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTable);
}

#[tokio::test]
async fn test_typed_records() {
    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Task {
        id: i64,
        description: String,
        done: i64,
    }

    let (db, _) = setup();
    let tasks = db.table("tasks").unwrap();
    let task = Task {
        id: 5,
        description: "typed".into(),
        done: 0,
    };
    tasks.put(Record::from_serialize(&task).unwrap()).await.unwrap();
    let stored: Task = tasks.get(5).await.unwrap().unwrap().to_typed().unwrap();
    assert_eq!(stored, task);
}
