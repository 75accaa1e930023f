//! Transaction coordinator.
//!
//! A [`Transaction`] wraps one substrate transaction. Every operation is
//! enqueued on the substrate when it is issued and returns a [`Deferred`]
//! for its result. The first failing operation aborts the whole
//! transaction: the substrate rolls back, later operations are rejected with
//! the same cause, and so is every earlier one that had not completed yet.

use crate::deferred::Deferred;
use crate::table::Table;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use strata_core::schema::{DatabaseSchema, TableSchema};
use strata_core::{Direction, Error, KeyRange, Operation, Record, Result, SchemaDelta, Value};
use strata_storage::{Cursor, MemoryBackend, StorageAdapter, StorageRequest, TransactionMode};
use tracing::{debug, trace};

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Created, nothing issued yet.
    Pending,
    /// At least one operation issued.
    Active,
    /// Waiting for issued operations before committing.
    Committing,
    Committed,
    Aborted,
}

impl TransactionState {
    fn as_str(self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Active => "active",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        }
    }
}

type Completion = Shared<LocalBoxFuture<'static, ()>>;

struct Inner<S: StorageAdapter> {
    id: u64,
    backend: S,
    txn: S::Txn,
    mode: TransactionMode,
    scope: Vec<String>,
    schema: RefCell<DatabaseSchema>,
    state: Cell<TransactionState>,
    failure: RefCell<Option<Error>>,
    issued: Cell<usize>,
    outstanding: RefCell<Vec<Completion>>,
}

impl<S: StorageAdapter> Inner<S> {
    /// Moves the transaction to `Aborted` with `error` as the cause.
    fn fail(&self, error: &Error) {
        match self.state.get() {
            TransactionState::Aborted | TransactionState::Committed => return,
            _ => {}
        }
        self.state.set(TransactionState::Aborted);
        *self.failure.borrow_mut() = Some(error.clone());
        if let Err(e) = self.backend.abort(&self.txn) {
            debug!(txn = self.id, error = %e, "substrate abort failed");
        }
        debug!(txn = self.id, error = %error, "transaction aborted");
    }
}

/// A transaction over a fixed set of tables.
pub struct Transaction<S: StorageAdapter = MemoryBackend> {
    inner: Rc<Inner<S>>,
}

impl<S: StorageAdapter> Clone for Transaction<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: StorageAdapter> fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("scope", &self.inner.scope)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl<S: StorageAdapter> Transaction<S> {
    pub(crate) fn new(
        id: u64,
        backend: S,
        txn: S::Txn,
        mode: TransactionMode,
        scope: Vec<String>,
        schema: DatabaseSchema,
    ) -> Self {
        trace!(txn = id, ?mode, ?scope, "begin transaction");
        Self {
            inner: Rc::new(Inner {
                id,
                backend,
                txn,
                mode,
                scope,
                schema: RefCell::new(schema),
                state: Cell::new(TransactionState::Pending),
                failure: RefCell::new(None),
                issued: Cell::new(0),
                outstanding: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the access mode.
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        self.inner.state.get()
    }

    /// Returns true while operations can still be issued.
    pub fn is_active(&self) -> bool {
        matches!(self.state(), TransactionState::Pending | TransactionState::Active)
    }

    /// Returns the tables this transaction spans. Empty for a version-change
    /// transaction, which spans every table.
    pub fn scope(&self) -> &[String] {
        &self.inner.scope
    }

    /// Returns how many operations were issued on the substrate transaction.
    pub fn issued_operations(&self) -> usize {
        self.inner.issued.get()
    }

    /// Returns the error that aborted the transaction, if any.
    pub fn failure(&self) -> Option<Error> {
        self.inner.failure.borrow().clone()
    }

    /// Returns a table facade bound to this transaction.
    pub fn table(&self, name: &str) -> Result<Table<S>> {
        self.check_scope(name)?;
        self.table_schema(name)?;
        Ok(Table::explicit(name, self.clone()))
    }

    /// Aborts the transaction, rolling back every write. Unresolved and
    /// later operations reject with an abort error.
    pub fn abort(&self) -> Result<()> {
        match self.state() {
            TransactionState::Aborted => Ok(()),
            TransactionState::Committing | TransactionState::Committed => Err(self.inactive()),
            _ => {
                self.inner.fail(&Error::Abort {
                    reason: "transaction aborted by caller".into(),
                });
                Ok(())
            }
        }
    }

    /// Aborts the transaction with `error` as the cause and returns it.
    pub(crate) fn fail(&self, error: Error) -> Error {
        self.inner.fail(&error);
        error
    }

    pub(crate) fn table_schema(&self, name: &str) -> Result<TableSchema> {
        self.inner
            .schema
            .borrow()
            .table(name)
            .cloned()
            .ok_or_else(|| Error::invalid_table(name))
    }

    pub(crate) fn set_schema(&self, schema: DatabaseSchema) {
        *self.inner.schema.borrow_mut() = schema;
    }

    fn aborted(&self) -> Error {
        self.failure().unwrap_or_else(|| Error::Abort {
            reason: "transaction aborted".into(),
        })
    }

    fn inactive(&self) -> Error {
        Error::TransactionInactive {
            id: self.inner.id,
            state: self.state().as_str().into(),
        }
    }

    fn check_scope(&self, table: &str) -> Result<()> {
        if self.inner.mode != TransactionMode::VersionChange
            && !self.inner.scope.iter().any(|t| t == table)
        {
            return Err(Error::invalid_state(format!(
                "table {} is not part of transaction {}",
                table, self.inner.id
            )));
        }
        Ok(())
    }

    /// Checks that `operation` on `table` may be issued now.
    pub(crate) fn check(&self, table: &str, operation: Operation) -> Result<()> {
        match self.state() {
            TransactionState::Aborted => return Err(self.aborted()),
            TransactionState::Committing | TransactionState::Committed => {
                return Err(self.inactive())
            }
            TransactionState::Pending | TransactionState::Active => {}
        }
        self.check_scope(table)?;
        if operation.is_write() && !self.inner.mode.is_writable() {
            return Err(Error::ReadOnly {
                table: table.into(),
                operation,
            });
        }
        Ok(())
    }

    /// Enqueues one request on the substrate and tracks its completion.
    fn issue<T, F>(&self, table: &str, operation: Operation, request: F) -> Deferred<T>
    where
        T: 'static,
        F: FnOnce(&S, &S::Txn) -> StorageRequest<T>,
    {
        if let Err(e) = self.check(table, operation) {
            return Deferred::rejected(e);
        }
        let inner = &self.inner;
        inner.state.set(TransactionState::Active);
        inner.issued.set(inner.issued.get() + 1);
        trace!(txn = inner.id, table, %operation, "issue request");

        let request = request(&inner.backend, &inner.txn);
        let slot: Rc<RefCell<Option<Result<T>>>> = Rc::new(RefCell::new(None));
        let completion = complete(Rc::downgrade(inner), request, slot.clone());

        // Eager substrates complete here, so a failure aborts the transaction
        // before the next operation is issued.
        if completion.clone().now_or_never().is_none() {
            inner.outstanding.borrow_mut().push(completion.clone());
        }

        Deferred::new(async move {
            completion.await;
            let result = slot.borrow_mut().take();
            result.unwrap_or_else(|| Err(Error::invalid_state("request result already taken")))
        })
    }

    /// Waits for every issued operation and commits.
    pub(crate) async fn commit(&self) -> Result<()> {
        match self.state() {
            TransactionState::Pending | TransactionState::Active => {}
            TransactionState::Aborted => return Err(self.aborted()),
            TransactionState::Committing | TransactionState::Committed => return Err(self.inactive()),
        }
        self.inner.state.set(TransactionState::Committing);
        loop {
            let pending = std::mem::take(&mut *self.inner.outstanding.borrow_mut());
            if pending.is_empty() {
                break;
            }
            for completion in pending {
                completion.await;
            }
        }
        if let Some(failure) = self.failure() {
            return Err(failure);
        }
        match self.inner.backend.commit(&self.inner.txn).await {
            Ok(()) => {
                self.inner.state.set(TransactionState::Committed);
                debug!(txn = self.inner.id, operations = self.issued_operations(), "transaction committed");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub(crate) fn get(&self, table: &str, key: Value) -> Deferred<Option<Record>> {
        if let Err(e) = check_key(table, Operation::Get, &key) {
            return Deferred::rejected(e);
        }
        self.issue(table, Operation::Get, |backend, txn| backend.get(txn, table, &key))
    }

    pub(crate) fn bulk_get(&self, table: &str, keys: Vec<Value>) -> Deferred<Vec<Option<Record>>> {
        for key in &keys {
            if let Err(e) = check_key(table, Operation::BulkGet, key) {
                return Deferred::rejected(e);
            }
        }
        let reads: Vec<_> = keys.into_iter().map(|key| self.get(table, key)).collect();
        Deferred::new(async move {
            let mut records = Vec::with_capacity(reads.len());
            for read in reads {
                records.push(read.await?);
            }
            Ok(records)
        })
    }

    /// Writes one record. Key errors are caught before the request is issued
    /// and abort the transaction like substrate constraint errors do.
    pub(crate) fn put(
        &self,
        table: &str,
        record: Record,
        key: Option<Value>,
        overwrite: bool,
    ) -> Deferred<Value> {
        let operation = if overwrite { Operation::Put } else { Operation::Add };
        let checked = self
            .check(table, operation)
            .and_then(|_| self.table_schema(table))
            .map(|schema| schema.resolve_primary_key(&record, key.as_ref(), operation));
        match checked {
            Err(e) => Deferred::rejected(e),
            Ok(Err(e)) => Deferred::rejected(self.fail(e)),
            Ok(Ok(_)) => self.issue(table, operation, |backend, txn| {
                backend.put(txn, table, record, key, overwrite)
            }),
        }
    }

    /// Writes many records. Every record is checked before the first write;
    /// errors carry the position of the failing record.
    pub(crate) fn bulk_put(
        &self,
        table: &str,
        records: Vec<Record>,
        keys: Option<Vec<Value>>,
        overwrite: bool,
    ) -> Deferred<Vec<Value>> {
        let operation = if overwrite { Operation::BulkPut } else { Operation::BulkAdd };
        if let Err(e) = self.check(table, operation) {
            return Deferred::rejected(e);
        }
        let schema = match self.table_schema(table) {
            Ok(schema) => schema,
            Err(e) => return Deferred::rejected(e),
        };
        let keys: Vec<Option<Value>> = match keys {
            None => vec![None; records.len()],
            Some(keys) if keys.len() == records.len() => keys.into_iter().map(Some).collect(),
            Some(keys) => {
                return Deferred::rejected(Error::invalid_state(format!(
                    "{} keys supplied for {} records",
                    keys.len(),
                    records.len()
                )))
            }
        };
        for (position, (record, key)) in records.iter().zip(&keys).enumerate() {
            if let Err(e) = schema.resolve_primary_key(record, key.as_ref(), operation) {
                return Deferred::rejected(self.fail(e.at_position(position)));
            }
        }

        let writes: Vec<_> = records
            .into_iter()
            .zip(keys)
            .map(|(record, key)| {
                self.issue(table, operation, |backend, txn| {
                    backend.put(txn, table, record, key, overwrite)
                })
            })
            .collect();
        Deferred::new(async move {
            let mut keys = Vec::with_capacity(writes.len());
            for (position, write) in writes.into_iter().enumerate() {
                let key = write
                    .await
                    .map_err(|e| e.during(operation).at_position(position))?;
                keys.push(key);
            }
            Ok(keys)
        })
    }

    pub(crate) fn delete(&self, table: &str, key: Value) -> Deferred<()> {
        if let Err(e) = check_key(table, Operation::Delete, &key) {
            return Deferred::rejected(e);
        }
        self.issue(table, Operation::Delete, |backend, txn| backend.delete(txn, table, &key))
    }

    pub(crate) fn bulk_delete(&self, table: &str, keys: Vec<Value>) -> Deferred<()> {
        for key in &keys {
            if let Err(e) = check_key(table, Operation::BulkDelete, key) {
                return Deferred::rejected(e);
            }
        }
        let deletes: Vec<_> = keys
            .into_iter()
            .map(|key| {
                self.issue(table, Operation::BulkDelete, |backend, txn| {
                    backend.delete(txn, table, &key)
                })
            })
            .collect();
        Deferred::new(async move {
            for delete in deletes {
                delete.await?;
            }
            Ok(())
        })
    }

    pub(crate) fn clear(&self, table: &str) -> Deferred<()> {
        self.issue(table, Operation::Clear, |backend, txn| backend.clear(txn, table))
    }

    pub(crate) fn scan(
        &self,
        table: &str,
        index: Option<&str>,
        range: &KeyRange<Value>,
        direction: Direction,
    ) -> Deferred<Cursor> {
        self.issue(table, Operation::Scan, |backend, txn| {
            backend.scan(txn, table, index, range, direction)
        })
    }

    pub(crate) fn count(&self, table: &str, index: Option<&str>, range: &KeyRange<Value>) -> Deferred<usize> {
        self.issue(table, Operation::Count, |backend, txn| backend.count(txn, table, index, range))
    }

    pub(crate) fn apply_migration(&self, delta: &SchemaDelta) -> Deferred<()> {
        if self.inner.mode != TransactionMode::VersionChange {
            return Deferred::rejected(Error::invalid_state(
                "schema changes require a version-change transaction",
            ));
        }
        self.issue("", Operation::Migrate, |backend, txn| backend.apply_migration(txn, delta))
    }
}

/// Drives one request to completion, recording the outcome in `slot`.
fn complete<S, T>(
    inner: Weak<Inner<S>>,
    request: StorageRequest<T>,
    slot: Rc<RefCell<Option<Result<T>>>>,
) -> Completion
where
    S: StorageAdapter,
    T: 'static,
{
    async move {
        let result = request.await;
        let result = match inner.upgrade() {
            Some(inner) => match result {
                Err(e) => {
                    inner.fail(&e);
                    Err(e)
                }
                Ok(_) if inner.state.get() == TransactionState::Aborted => {
                    Err(inner.failure.borrow().clone().unwrap_or_else(|| Error::Abort {
                        reason: "transaction aborted".into(),
                    }))
                }
                ok => ok,
            },
            None => result,
        };
        *slot.borrow_mut() = Some(result);
    }
    .boxed_local()
    .shared()
}

fn check_key(table: &str, operation: Operation, key: &Value) -> Result<()> {
    if key.is_valid_key() {
        return Ok(());
    }
    Err(Error::invalid_key(
        table,
        operation,
        format!("{} is not a valid key", key),
    ))
}
