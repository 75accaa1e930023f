//! In-memory object-store substrate.
//!
//! Every request executes when it is issued and returns an already-completed
//! future, so issuance order is completion order. Writes are visible to
//! other transactions before commit (read-uncommitted); rollback restores the
//! journaled state.

use crate::adapter::{Cursor, OpenedDatabase, StorageAdapter, StorageRequest, TransactionMode};
use crate::object_store::ObjectStore;
use crate::transaction::{Transaction, TransactionId};
use futures::future::{self, FutureExt};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use strata_core::schema::DatabaseSchema;
use strata_core::{Direction, Error, KeyRange, Record, Result, SchemaDelta, Value};
use tracing::{debug, trace};

/// One named database.
#[derive(Debug)]
pub struct MemoryDatabase {
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) stores: BTreeMap<String, ObjectStore>,
    connections: usize,
}

impl MemoryDatabase {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            version: 0,
            stores: BTreeMap::new(),
            connections: 0,
        }
    }

    /// Returns the persisted version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the installed schema.
    pub fn schema(&self) -> DatabaseSchema {
        self.stores.values().map(|s| s.schema().clone()).collect()
    }

    /// Gets a store by name.
    pub fn store(&self, name: &str) -> Result<&ObjectStore> {
        self.stores.get(name).ok_or_else(|| Error::invalid_table(name))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> Result<&mut ObjectStore> {
        self.stores.get_mut(name).ok_or_else(|| Error::invalid_table(name))
    }
}

/// Connection to a [`MemoryDatabase`].
#[derive(Clone, Debug)]
pub struct MemoryHandle {
    database: Rc<RefCell<MemoryDatabase>>,
    closed: Rc<Cell<bool>>,
}

impl MemoryHandle {
    fn check_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(Error::DatabaseClosed {
                name: self.database.borrow().name.clone(),
            });
        }
        Ok(())
    }
}

/// Shared reference to a memory transaction.
#[derive(Clone)]
pub struct MemoryTxn(Rc<RefCell<Transaction>>);

impl MemoryTxn {
    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.0.borrow().id()
    }
}

impl std::fmt::Debug for MemoryTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MemoryTxn").field(&self.id()).finish()
    }
}

/// The in-memory substrate. Clones share the same databases.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    databases: Rc<RefCell<BTreeMap<String, Rc<RefCell<MemoryDatabase>>>>>,
    next_txn_id: Rc<Cell<TransactionId>>,
    fail_after_writes: Rc<Cell<Option<usize>>>,
    records_read: Rc<Cell<usize>>,
}

fn ready<T: 'static>(result: Result<T>) -> StorageRequest<T> {
    future::ready(result).boxed_local()
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the persisted version of a database, if it exists.
    pub fn version_of(&self, name: &str) -> Option<u32> {
        self.databases.borrow().get(name).map(|db| db.borrow().version)
    }

    /// Returns the installed schema of a database, if it exists.
    pub fn schema_of(&self, name: &str) -> Option<DatabaseSchema> {
        self.databases.borrow().get(name).map(|db| db.borrow().schema())
    }

    /// Returns every record of a table in primary key order.
    pub fn records_of(&self, name: &str, table: &str) -> Option<Vec<Record>> {
        let databases = self.databases.borrow();
        let db = databases.get(name)?.borrow();
        let store = db.store(table).ok()?;
        Some(store.records().cloned().collect())
    }

    /// Returns how many records cursors have read so far.
    pub fn records_read(&self) -> usize {
        self.records_read.get()
    }

    /// Makes every write after the next `n` writes fail with a storage error,
    /// simulating a substrate crash.
    pub fn fail_after_writes(&self, n: usize) {
        self.fail_after_writes.set(Some(n));
    }

    fn check_injected_failure(&self) -> Result<()> {
        match self.fail_after_writes.get() {
            Some(0) => Err(Error::storage("injected write failure")),
            Some(n) => {
                self.fail_after_writes.set(Some(n - 1));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn next_id(&self) -> TransactionId {
        let id = self.next_txn_id.get() + 1;
        self.next_txn_id.set(id);
        id
    }
}

impl StorageAdapter for MemoryBackend {
    type Handle = MemoryHandle;
    type Txn = MemoryTxn;

    fn open_database(&self, name: &str, version: u32) -> StorageRequest<OpenedDatabase<MemoryHandle>> {
        let database = self
            .databases
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| Rc::new(RefCell::new(MemoryDatabase::new(name))))
            .clone();

        let result = {
            let mut db = database.borrow_mut();
            if version < db.version {
                Err(Error::Version {
                    requested: version,
                    installed: db.version,
                })
            } else {
                db.connections += 1;
                debug!(database = name, version = db.version, "opened memory database");
                Ok(OpenedDatabase {
                    handle: MemoryHandle {
                        database: database.clone(),
                        closed: Rc::new(Cell::new(false)),
                    },
                    version: db.version,
                    schema: db.schema(),
                })
            }
        };
        ready(result)
    }

    fn close(&self, handle: &MemoryHandle) {
        if !handle.closed.replace(true) {
            let mut db = handle.database.borrow_mut();
            db.connections = db.connections.saturating_sub(1);
        }
    }

    fn delete_database(&self, name: &str) -> StorageRequest<()> {
        if let Some(db) = self.databases.borrow_mut().remove(name) {
            debug!(database = name, connections = db.borrow().connections, "deleted memory database");
        }
        ready(Ok(()))
    }

    fn begin_version_change(&self, handle: &MemoryHandle, version: u32) -> Result<MemoryTxn> {
        handle.check_open()?;
        let tx = Transaction::begin_version_change(self.next_id(), handle.database.clone(), version);
        trace!(txn = tx.id(), version, "begin version change");
        Ok(MemoryTxn(Rc::new(RefCell::new(tx))))
    }

    fn apply_migration(&self, txn: &MemoryTxn, delta: &SchemaDelta) -> StorageRequest<()> {
        ready(txn.0.borrow_mut().apply_migration(delta))
    }

    fn begin_transaction(
        &self,
        handle: &MemoryHandle,
        tables: &[String],
        mode: TransactionMode,
    ) -> Result<MemoryTxn> {
        handle.check_open()?;
        if mode == TransactionMode::VersionChange {
            return Err(Error::invalid_state(
                "version-change transactions are started by open",
            ));
        }
        {
            let db = handle.database.borrow();
            for table in tables {
                db.store(table)?;
            }
        }
        let tx = Transaction::begin(self.next_id(), handle.database.clone(), tables.to_vec(), mode);
        trace!(txn = tx.id(), ?mode, ?tables, "begin transaction");
        Ok(MemoryTxn(Rc::new(RefCell::new(tx))))
    }

    fn get(&self, txn: &MemoryTxn, table: &str, key: &Value) -> StorageRequest<Option<Record>> {
        ready(txn.0.borrow().get(table, key))
    }

    fn put(
        &self,
        txn: &MemoryTxn,
        table: &str,
        record: Record,
        key: Option<Value>,
        overwrite: bool,
    ) -> StorageRequest<Value> {
        let result = self
            .check_injected_failure()
            .and_then(|_| txn.0.borrow_mut().put(table, record, key, overwrite));
        ready(result)
    }

    fn delete(&self, txn: &MemoryTxn, table: &str, key: &Value) -> StorageRequest<()> {
        let result = self
            .check_injected_failure()
            .and_then(|_| txn.0.borrow_mut().delete(table, key));
        ready(result)
    }

    fn clear(&self, txn: &MemoryTxn, table: &str) -> StorageRequest<()> {
        let result = self
            .check_injected_failure()
            .and_then(|_| txn.0.borrow_mut().clear(table));
        ready(result)
    }

    fn scan(
        &self,
        txn: &MemoryTxn,
        table: &str,
        index: Option<&str>,
        range: &KeyRange<Value>,
        direction: Direction,
    ) -> StorageRequest<Cursor> {
        let reads = self.records_read.clone();
        let result = txn
            .0
            .borrow()
            .scan(table, index, range, direction)
            .map(|cursor| Cursor::new(cursor.inspect(move |_| reads.set(reads.get() + 1))));
        ready(result)
    }

    fn count(
        &self,
        txn: &MemoryTxn,
        table: &str,
        index: Option<&str>,
        range: &KeyRange<Value>,
    ) -> StorageRequest<usize> {
        ready(txn.0.borrow().count(table, index, range))
    }

    fn commit(&self, txn: &MemoryTxn) -> StorageRequest<()> {
        let mut tx = txn.0.borrow_mut();
        trace!(txn = tx.id(), writes = tx.journal().len(), "commit");
        ready(tx.commit())
    }

    fn abort(&self, txn: &MemoryTxn) -> Result<()> {
        let mut tx = txn.0.borrow_mut();
        trace!(txn = tx.id(), writes = tx.journal().len(), "rollback");
        tx.rollback()
    }
}
