//! Integration tests for explicit transactions, failure propagation and
//! chains.

use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use strata_core::{Error, ErrorKind, Operation, Record, Value};
use strata_database::{CancellationToken, Chain, Database, Deferred, TransactionMode, TransactionState};
use strata_storage::MemoryBackend;

fn record(json: serde_json::Value) -> Record {
    Record::from_json(json).unwrap()
}

async fn setup() -> (Database, MemoryBackend) {
    let backend = MemoryBackend::new();
    let db = Database::new("bank", backend.clone());
    db.version(1)
        .stores(&[("accounts", "owner,balance"), ("audit", "++id,owner")])
        .unwrap()
        .declare()
        .unwrap();
    db.open().await.unwrap();
    db.table("accounts")
        .unwrap()
        .bulk_add(vec![
            record(json!({"owner": "ann", "balance": 100})),
            record(json!({"owner": "bob", "balance": 50})),
        ])
        .await
        .unwrap();
    (db, backend)
}

fn balance(record: &Option<Record>) -> Option<i64> {
    record.as_ref()?.get("balance")?.as_i64()
}

#[tokio::test]
async fn test_transaction_commits_all_writes() {
    let (db, backend) = setup().await;
    let moved = db
        .transaction(TransactionMode::ReadWrite, &["accounts", "audit"], |tx| async move {
            let accounts = tx.table("accounts")?;
            let audit = tx.table("audit")?;
            accounts.update("ann", record(json!({"balance": 70}))).await?;
            accounts.update("bob", record(json!({"balance": 80}))).await?;
            audit.add(record(json!({"owner": "ann", "amount": 30}))).await?;

            // Reads inside the transaction see its own writes.
            let ann = accounts.get("ann").await?;
            assert_eq!(balance(&ann), Some(70));
            Ok(30)
        })
        .await
        .unwrap();
    assert_eq!(moved, 30);

    let accounts = db.table("accounts").unwrap();
    assert_eq!(balance(&accounts.get("ann").await.unwrap()), Some(70));
    assert_eq!(balance(&accounts.get("bob").await.unwrap()), Some(80));
    assert_eq!(backend.records_of("bank", "audit").unwrap().len(), 1);
}

#[tokio::test]
async fn test_body_error_rolls_back() {
    let (db, backend) = setup().await;
    let err = db
        .transaction(TransactionMode::ReadWrite, &["accounts", "audit"], |tx| async move {
            tx.table("accounts")?.update("ann", record(json!({"balance": 0}))).await?;
            tx.table("audit")?.add(record(json!({"owner": "ann"}))).await?;
            Err::<(), _>(Error::invalid_state("insufficient funds"))
        })
        .await
        .unwrap_err();
    assert_eq!(err, Error::invalid_state("insufficient funds"));

    let accounts = db.table("accounts").unwrap();
    assert_eq!(balance(&accounts.get("ann").await.unwrap()), Some(100));
    assert!(backend.records_of("bank", "audit").unwrap().is_empty());
}

#[tokio::test]
async fn test_caller_abort() {
    let (db, _) = setup().await;
    let seen = Rc::new(RefCell::new(None));
    let observed = seen.clone();
    let err = db
        .transaction(TransactionMode::ReadWrite, &["accounts"], move |tx| async move {
            let accounts = tx.table("accounts")?;
            accounts.delete("bob").await?;
            tx.abort()?;
            assert_eq!(tx.state(), TransactionState::Aborted);
            *observed.borrow_mut() = Some(accounts.get("ann").await.unwrap_err());
            Ok(())
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind().name(), "AbortError");
    assert_eq!(seen.borrow().as_ref().map(Error::kind), Some(ErrorKind::Abort));
    assert_eq!(db.table("accounts").unwrap().count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_first_failure_aborts_and_is_reported() {
    let (db, _) = setup().await;
    let issued = Rc::new(RefCell::new(0));
    let counter = issued.clone();
    let err = db
        .transaction(TransactionMode::ReadWrite, &["accounts"], move |tx| async move {
            let accounts = tx.table("accounts")?;
            let first = accounts.put(record(json!({"owner": "cy", "balance": 5})));
            let duplicate = accounts.add(record(json!({"owner": "ann", "balance": 1})));
            let later = accounts.put(record(json!({"owner": "dee", "balance": 7})));
            *counter.borrow_mut() = tx.issued_operations();

            // The duplicate aborted the transaction before `later` was issued.
            assert_eq!(tx.state(), TransactionState::Aborted);
            assert!(first.await.is_ok());
            let cause = duplicate.await.unwrap_err();
            assert_eq!(later.await.unwrap_err(), cause);
            Err::<(), _>(cause)
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Constraint { operation: Operation::Add, .. }));
    assert_eq!(*issued.borrow(), 2);

    let accounts = db.table("accounts").unwrap();
    assert_eq!(accounts.count().await.unwrap(), 2);
    assert!(accounts.get("cy").await.unwrap().is_none());
}

#[tokio::test]
async fn test_ignored_failure_still_rejects_commit() {
    let (db, _) = setup().await;
    let err = db
        .transaction(TransactionMode::ReadWrite, &["accounts"], |tx| async move {
            let accounts = tx.table("accounts")?;
            accounts.put(record(json!({"owner": "cy", "balance": 5}))).await?;
            let _ = accounts.add(record(json!({"owner": "bob"}))).await;
            Ok(())
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert!(db.table("accounts").unwrap().get("cy").await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_only_rejects_writes() {
    let (db, _) = setup().await;
    let total = db
        .transaction(TransactionMode::ReadOnly, &["accounts"], |tx| async move {
            let accounts = tx.table("accounts")?;
            let err = accounts.delete("ann").await.unwrap_err();
            assert_eq!(err.kind().name(), "ReadOnlyError");
            assert!(tx.is_active());
            let all = accounts.to_array().await?;
            Ok(all.iter().filter_map(|a| a.get("balance").and_then(Value::as_i64)).sum::<i64>())
        })
        .await
        .unwrap();
    assert_eq!(total, 150);
    assert_eq!(db.table("accounts").unwrap().count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_table_outside_scope() {
    let (db, _) = setup().await;
    db.transaction(TransactionMode::ReadWrite, &["accounts"], |tx| async move {
        let err = tx.table("audit").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(tx.scope(), ["accounts".to_string()]);
        Ok(())
    })
    .await
    .unwrap();

    let err = db
        .transaction(TransactionMode::ReadWrite, &["ledger"], |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTable);
}

#[tokio::test]
async fn test_transaction_inactive_after_commit() {
    let (db, _) = setup().await;
    let kept = Rc::new(RefCell::new(None));
    let slot = kept.clone();
    db.transaction(TransactionMode::ReadWrite, &["accounts"], move |tx| async move {
        tx.table("accounts")?.get("ann").await?;
        *slot.borrow_mut() = Some(tx);
        Ok(())
    })
    .await
    .unwrap();

    let tx = kept.borrow_mut().take().unwrap();
    assert_eq!(tx.state(), TransactionState::Committed);
    assert_eq!(tx.mode(), TransactionMode::ReadWrite);
    let err = tx.table("accounts").unwrap().get("ann").await.unwrap_err();
    assert_eq!(err.kind().name(), "TransactionInactiveError");
    assert!(tx.abort().is_err());
}

#[tokio::test]
async fn test_operations_share_one_substrate_transaction() {
    let (db, _) = setup().await;
    let issued = db
        .transaction(TransactionMode::ReadWrite, &["accounts", "audit"], |tx| async move {
            let audit = tx.table("audit")?;
            audit.bulk_add(vec![record(json!({"owner": "ann"})), record(json!({"owner": "bob"}))]).await?;
            audit.where_("owner").equals("ann").count().await?;
            tx.table("accounts")?.get("bob").await?;
            Ok(tx.issued_operations())
        })
        .await
        .unwrap();
    assert_eq!(issued, 4);
}

#[tokio::test]
async fn test_composite_operations_take_effect_in_issue_order() {
    let (db, _) = setup().await;
    db.transaction(TransactionMode::ReadWrite, &["accounts"], |tx| async move {
        let accounts = tx.table("accounts")?;
        let update = accounts.update("ann", record(json!({"balance": 1})));
        let put = accounts.put(record(json!({"owner": "ann", "balance": 2})));
        update.await?;
        put.await?;
        assert_eq!(balance(&accounts.get("ann").await?), Some(2));

        let before = accounts.to_array();
        let positive = accounts.where_("balance").above(0).count();
        let added = accounts.put(record(json!({"owner": "cy", "balance": 9})));
        let modified = accounts.to_collection().modify(record(json!({"balance": 5})));
        let late = accounts.put(record(json!({"owner": "dee", "balance": 7})));
        assert_eq!(before.await?.len(), 2);
        assert_eq!(positive.await?, 2);
        added.await?;
        assert_eq!(modified.await?, 3);
        late.await?;
        Ok(())
    })
    .await
    .unwrap();

    let accounts = db.table("accounts").unwrap();
    assert_eq!(balance(&accounts.get("ann").await.unwrap()), Some(5));
    assert_eq!(balance(&accounts.get("cy").await.unwrap()), Some(5));
    assert_eq!(balance(&accounts.get("dee").await.unwrap()), Some(7));
}

#[tokio::test]
async fn test_deferred_combinators() {
    let (db, _) = setup().await;
    let accounts = db.table("accounts").unwrap();

    let ann = accounts.get("ann").map(|a| balance(&a)).await.unwrap();
    assert_eq!(ann, Some(100));

    let lookup = accounts.clone();
    let bob = accounts
        .put(record(json!({"owner": "bob", "balance": 60})))
        .then(move |key| lookup.get(key))
        .await
        .unwrap();
    assert_eq!(balance(&bob), Some(60));

    let recovered = accounts
        .add(record(json!({"owner": "ann"})))
        .catch(|e| {
            assert_eq!(e.kind(), ErrorKind::Constraint);
            Ok(Value::Null)
        })
        .await
        .unwrap();
    assert_eq!(recovered, Value::Null);

    let rejected: Deferred<i64> = Deferred::rejected(Error::invalid_state("nope"));
    assert!(rejected.map(|n| n + 1).await.is_err());
}

#[tokio::test]
async fn test_chain_runs_steps_in_order() {
    let (db, _) = setup().await;
    let accounts = db.table("accounts").unwrap();
    let audit = db.table("audit").unwrap();

    let token = CancellationToken::new();
    let reader = accounts.clone();
    let total = Chain::start(token, accounts.update("ann", record(json!({"balance": 120}))))
        .then(move |()| reader.get("ann"))
        .then(move |ann| audit.add(record(json!({"owner": "ann", "balance": balance(&ann)}))))
        .then(|key| async move { Ok(key.as_i64().unwrap_or(0)) })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(db.table("audit").unwrap().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_chain_forwards_first_rejection() {
    let (db, _) = setup().await;
    let accounts = db.table("accounts").unwrap();
    let ran = Rc::new(RefCell::new(false));
    let flag = ran.clone();

    let result = Chain::start(CancellationToken::new(), accounts.update("zed", Record::new()))
        .then(move |()| {
            *flag.borrow_mut() = true;
            Deferred::resolved(1)
        })
        .catch(|e| {
            assert_eq!(e.kind(), ErrorKind::NotFound);
            Ok(-1)
        })
        .await
        .unwrap();
    assert_eq!(result, -1);
    assert!(!*ran.borrow());
}

#[tokio::test]
async fn test_cancelled_chain_skips_remaining_steps() {
    let (db, backend) = setup().await;
    let audit = db.table("audit").unwrap();
    let token = CancellationToken::new();

    let cancel = token.clone();
    let later = audit.clone();
    let err = Chain::start(token.clone(), audit.add(record(json!({"owner": "ann"}))))
        .then(move |_| {
            cancel.cancel();
            Deferred::resolved(())
        })
        .then(move |()| later.add(record(json!({"owner": "bob"}))))
        .await
        .unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert!(token.is_cancelled());
    // The first step's transaction committed before the cancellation.
    assert_eq!(backend.records_of("bank", "audit").unwrap().len(), 1);

    let err = Chain::start(token, audit.add(record(json!({"owner": "cy"}))))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(backend.records_of("bank", "audit").unwrap().len(), 1);
}
