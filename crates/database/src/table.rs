//! Table facade.
//!
//! A [`Table`] is bound either to the database, in which case every call
//! runs in its own implicit transaction, or to an explicit [`Transaction`],
//! in which case calls are issued on it immediately.

use crate::collection::Collection;
use crate::database::Database;
use crate::deferred::Deferred;
use crate::transaction::Transaction;
use crate::where_clause::WhereClause;
use std::fmt;
use std::future::Future;
use strata_core::schema::TableSchema;
use strata_core::{Error, Operation, Record, Result, Value};
use strata_query::Query;
use strata_storage::{MemoryBackend, StorageAdapter, TransactionMode};

enum Scope<S: StorageAdapter> {
    Implicit(Database<S>),
    Explicit(Transaction<S>),
}

impl<S: StorageAdapter> Clone for Scope<S> {
    fn clone(&self) -> Self {
        match self {
            Scope::Implicit(db) => Scope::Implicit(db.clone()),
            Scope::Explicit(tx) => Scope::Explicit(tx.clone()),
        }
    }
}

/// A declared table.
pub struct Table<S: StorageAdapter = MemoryBackend> {
    name: String,
    scope: Scope<S>,
}

impl<S: StorageAdapter> Clone for Table<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<S: StorageAdapter> fmt::Debug for Table<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match &self.scope {
            Scope::Implicit(_) => "implicit".to_string(),
            Scope::Explicit(tx) => format!("transaction {}", tx.id()),
        };
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("scope", &scope)
            .finish()
    }
}

impl<S: StorageAdapter> Table<S> {
    pub(crate) fn implicit(name: &str, db: Database<S>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Implicit(db),
        }
    }

    pub(crate) fn explicit(name: &str, tx: Transaction<S>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Explicit(tx),
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema this table is bound to.
    pub fn schema(&self) -> Result<TableSchema> {
        match &self.scope {
            Scope::Implicit(db) => db.table_schema(&self.name),
            Scope::Explicit(tx) => tx.table_schema(&self.name),
        }
    }

    /// Runs `body` in the explicit transaction, or in a fresh transaction
    /// over this table committed when `body` resolves.
    ///
    /// In an explicit transaction `body` starts at once, so its first
    /// request is issued before the caller issues the next operation.
    pub(crate) fn run<T, F, Fut>(&self, mode: TransactionMode, body: F) -> Deferred<T>
    where
        T: 'static,
        F: FnOnce(Transaction<S>) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        match &self.scope {
            Scope::Explicit(tx) => Deferred::eager(body(tx.clone())),
            Scope::Implicit(db) => db.transaction(mode, &[self.name.as_str()], body),
        }
    }

    /// Reads a record by primary key. Resolves to `None` when absent.
    pub fn get(&self, key: impl Into<Value>) -> Deferred<Option<Record>> {
        let (name, key) = (self.name.clone(), key.into());
        self.run(TransactionMode::ReadOnly, move |tx| tx.get(&name, key))
    }

    /// Reads many records, in the order of `keys`.
    pub fn bulk_get(&self, keys: Vec<Value>) -> Deferred<Vec<Option<Record>>> {
        let name = self.name.clone();
        self.run(TransactionMode::ReadOnly, move |tx| tx.bulk_get(&name, keys))
    }

    /// Inserts or replaces a record and resolves to its primary key.
    pub fn put(&self, record: Record) -> Deferred<Value> {
        self.write(record, None, true)
    }

    /// Inserts or replaces a record stored under an out-of-line key.
    pub fn put_with_key(&self, record: Record, key: impl Into<Value>) -> Deferred<Value> {
        self.write(record, Some(key.into()), true)
    }

    /// Inserts a record. An existing key is a constraint error.
    pub fn add(&self, record: Record) -> Deferred<Value> {
        self.write(record, None, false)
    }

    /// Inserts a record under an out-of-line key.
    pub fn add_with_key(&self, record: Record, key: impl Into<Value>) -> Deferred<Value> {
        self.write(record, Some(key.into()), false)
    }

    fn write(&self, record: Record, key: Option<Value>, overwrite: bool) -> Deferred<Value> {
        let name = self.name.clone();
        self.run(TransactionMode::ReadWrite, move |tx| {
            tx.put(&name, record, key, overwrite)
        })
    }

    /// Inserts or replaces many records, resolving to their keys in order.
    /// Nothing is written unless every record is valid.
    pub fn bulk_put(&self, records: Vec<Record>) -> Deferred<Vec<Value>> {
        self.bulk_write(records, None, true)
    }

    /// Like [`Table::bulk_put`], with out-of-line keys.
    pub fn bulk_put_with_keys(&self, records: Vec<Record>, keys: Vec<Value>) -> Deferred<Vec<Value>> {
        self.bulk_write(records, Some(keys), true)
    }

    /// Inserts many records. Any existing key is a constraint error.
    pub fn bulk_add(&self, records: Vec<Record>) -> Deferred<Vec<Value>> {
        self.bulk_write(records, None, false)
    }

    fn bulk_write(&self, records: Vec<Record>, keys: Option<Vec<Value>>, overwrite: bool) -> Deferred<Vec<Value>> {
        let name = self.name.clone();
        self.run(TransactionMode::ReadWrite, move |tx| {
            tx.bulk_put(&name, records, keys, overwrite)
        })
    }

    /// Applies `changes`, keyed by key path, to an existing record.
    ///
    /// Rejects with a not-found error when no record has `key`, and with a
    /// constraint error when a change would alter the primary key.
    pub fn update(&self, key: impl Into<Value>, changes: Record) -> Deferred<()> {
        let (name, key) = (self.name.clone(), key.into());
        self.run(TransactionMode::ReadWrite, move |tx| async move {
            tx.check(&name, Operation::Update)?;
            let schema = tx.table_schema(&name)?;
            let primary_key = schema.primary_key();
            if let Some(path) = primary_key.key_path() {
                if let Some((field, _)) = changes.iter().find(|(field, _)| path.touches(field)) {
                    return Err(tx.fail(Error::constraint(
                        &name,
                        Operation::Update,
                        Some(key),
                        format!("update may not change the primary key ({})", field),
                    )));
                }
            }

            let mut record = tx
                .get(&name, key.clone())
                .await?
                .ok_or_else(|| Error::not_found(&name, key.clone()))?;
            if !record.merge(&changes) {
                return Err(tx.fail(Error::constraint(
                    &name,
                    Operation::Update,
                    Some(key),
                    "a change targets a path below a non-object value",
                )));
            }
            let explicit = primary_key.is_outbound().then_some(key);
            tx.put(&name, record, explicit, true)
                .await
                .map_err(|e| e.during(Operation::Update))?;
            Ok(())
        })
    }

    /// Deletes a record. Deleting an absent key succeeds.
    pub fn delete(&self, key: impl Into<Value>) -> Deferred<()> {
        let (name, key) = (self.name.clone(), key.into());
        self.run(TransactionMode::ReadWrite, move |tx| tx.delete(&name, key))
    }

    /// Deletes many records.
    pub fn bulk_delete(&self, keys: Vec<Value>) -> Deferred<()> {
        let name = self.name.clone();
        self.run(TransactionMode::ReadWrite, move |tx| tx.bulk_delete(&name, keys))
    }

    /// Deletes every record.
    pub fn clear(&self) -> Deferred<()> {
        let name = self.name.clone();
        self.run(TransactionMode::ReadWrite, move |tx| tx.clear(&name))
    }

    /// Returns a collection of every record in primary key order.
    pub fn to_collection(&self) -> Collection<S> {
        Collection::new(self.clone(), Query::table(self.name.as_str()))
    }

    /// Returns every record in the order of `index`.
    pub fn order_by(&self, index: &str) -> Collection<S> {
        Collection::new(self.clone(), Query::order_by(self.name.as_str(), index))
    }

    /// Starts a predicate on `column`: the primary key (by key path or
    /// `:id`), a declared index, or any other key path.
    pub fn where_(&self, column: &str) -> WhereClause<S> {
        WhereClause::new(self.clone(), column)
    }

    /// Returns the records passing `predicate`, in primary key order.
    pub fn filter(&self, predicate: impl Fn(&Record) -> bool + 'static) -> Collection<S> {
        self.to_collection().filter(predicate)
    }

    /// Returns every record in reverse primary key order.
    pub fn reverse(&self) -> Collection<S> {
        self.to_collection().reverse()
    }

    /// Returns at most `n` records.
    pub fn limit(&self, n: usize) -> Collection<S> {
        self.to_collection().limit(n)
    }

    /// Skips the first `n` records.
    pub fn offset(&self, n: usize) -> Collection<S> {
        self.to_collection().offset(n)
    }

    /// Counts every record.
    pub fn count(&self) -> Deferred<usize> {
        self.to_collection().count()
    }

    /// Reads every record in primary key order.
    pub fn to_array(&self) -> Deferred<Vec<Record>> {
        self.to_collection().to_array()
    }
}
