//! The capability interface Strata consumes from an object-store substrate.
//!
//! Requests are enqueued when the method is called and complete
//! asynchronously. Within one transaction, requests take effect in the order
//! they were issued, so a read issued after a write observes that write.

use futures::future::LocalBoxFuture;
use strata_core::schema::DatabaseSchema;
use strata_core::{Direction, KeyRange, Record, Result, SchemaDelta, Value};

/// A request already enqueued on the substrate, completing asynchronously.
pub type StorageRequest<T> = LocalBoxFuture<'static, Result<T>>;

/// Transaction access mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
    /// Exclusive schema migration.
    VersionChange,
}

impl TransactionMode {
    /// Returns true if writes are allowed.
    pub fn is_writable(self) -> bool {
        !matches!(self, TransactionMode::ReadOnly)
    }
}

/// Result of opening a database.
#[derive(Clone, Debug)]
pub struct OpenedDatabase<H> {
    /// Connection handle.
    pub handle: H,
    /// Version persisted on the substrate (0 for a new database).
    pub version: u32,
    /// Schema currently installed on the substrate.
    pub schema: DatabaseSchema,
}

/// One position of a cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorEntry {
    /// Index key (equal to the primary key for primary key scans).
    pub key: Value,
    /// Primary key of the record.
    pub primary_key: Value,
    /// The record.
    pub record: Record,
}

/// A lazy sequence of cursor entries, in scan order.
pub struct Cursor {
    inner: Box<dyn Iterator<Item = CursorEntry>>,
}

impl Cursor {
    /// Wraps an iterator of entries.
    pub fn new(entries: impl Iterator<Item = CursorEntry> + 'static) -> Self {
        Self {
            inner: Box::new(entries),
        }
    }
}

impl Iterator for Cursor {
    type Item = CursorEntry;

    fn next(&mut self) -> Option<CursorEntry> {
        self.inner.next()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

/// Durable, transactional, key-ordered object stores with declared indexes.
///
/// `begin_*` and `abort` act synchronously; every other operation returns a
/// [`StorageRequest`]. Mode, scope and state violations reject the request.
pub trait StorageAdapter: Clone + 'static {
    /// Open connection.
    type Handle: Clone + 'static;
    /// Open transaction.
    type Txn: Clone + 'static;

    /// Opens (creating if needed) a database. Fails with a version error if
    /// `version` is lower than the persisted version. Does not migrate.
    fn open_database(&self, name: &str, version: u32) -> StorageRequest<OpenedDatabase<Self::Handle>>;

    /// Closes a connection.
    fn close(&self, handle: &Self::Handle);

    /// Deletes a database and all its stores.
    fn delete_database(&self, name: &str) -> StorageRequest<()>;

    /// Begins the exclusive transaction that migrates to `version`.
    fn begin_version_change(&self, handle: &Self::Handle, version: u32) -> Result<Self::Txn>;

    /// Applies one schema delta inside a version-change transaction.
    fn apply_migration(&self, txn: &Self::Txn, delta: &SchemaDelta) -> StorageRequest<()>;

    /// Begins a transaction over `tables`.
    fn begin_transaction(
        &self,
        handle: &Self::Handle,
        tables: &[String],
        mode: TransactionMode,
    ) -> Result<Self::Txn>;

    /// Reads a record by primary key.
    fn get(&self, txn: &Self::Txn, table: &str, key: &Value) -> StorageRequest<Option<Record>>;

    /// Writes a record and returns its primary key. With `overwrite` false an
    /// existing key is a constraint error.
    fn put(
        &self,
        txn: &Self::Txn,
        table: &str,
        record: Record,
        key: Option<Value>,
        overwrite: bool,
    ) -> StorageRequest<Value>;

    /// Deletes a record. Deleting an absent key succeeds.
    fn delete(&self, txn: &Self::Txn, table: &str, key: &Value) -> StorageRequest<()>;

    /// Deletes every record of a table.
    fn clear(&self, txn: &Self::Txn, table: &str) -> StorageRequest<()>;

    /// Scans the primary key (`index` None) or a secondary index.
    fn scan(
        &self,
        txn: &Self::Txn,
        table: &str,
        index: Option<&str>,
        range: &KeyRange<Value>,
        direction: Direction,
    ) -> StorageRequest<Cursor>;

    /// Counts index entries in a range without materializing records.
    fn count(
        &self,
        txn: &Self::Txn,
        table: &str,
        index: Option<&str>,
        range: &KeyRange<Value>,
    ) -> StorageRequest<usize>;

    /// Commits a transaction.
    fn commit(&self, txn: &Self::Txn) -> StorageRequest<()>;

    /// Aborts a transaction, rolling back its writes.
    fn abort(&self, txn: &Self::Txn) -> Result<()>;
}
