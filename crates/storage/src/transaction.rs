//! Transactions of the in-memory substrate.
//!
//! Writes apply to the stores immediately and are journaled; rollback undoes
//! them in reverse order. A version-change transaction snapshots the whole
//! database instead, since it may create, drop or rename stores.

use crate::adapter::{Cursor, TransactionMode};
use crate::journal::Journal;
use crate::memory::MemoryDatabase;
use crate::object_store::ObjectStore;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use strata_core::{Direction, Error, KeyRange, Operation, Record, Result, SchemaDelta, Value};

/// Substrate-assigned transaction identifier.
pub type TransactionId = u64;

/// Lifecycle of a substrate transaction. Only `Active` accepts requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    fn as_str(self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        }
    }
}

struct VersionSnapshot {
    target: u32,
    version: u32,
    stores: BTreeMap<String, ObjectStore>,
}

/// A transaction against one in-memory database.
pub struct Transaction {
    id: TransactionId,
    mode: TransactionMode,
    scope: Vec<String>,
    state: TransactionState,
    journal: Journal,
    database: Rc<RefCell<MemoryDatabase>>,
    snapshot: Option<VersionSnapshot>,
}

impl Transaction {
    /// Begins a read-only or read-write transaction over `scope`.
    pub(crate) fn begin(
        id: TransactionId,
        database: Rc<RefCell<MemoryDatabase>>,
        scope: Vec<String>,
        mode: TransactionMode,
    ) -> Self {
        Self {
            id,
            mode,
            scope,
            state: TransactionState::Active,
            journal: Journal::new(),
            database,
            snapshot: None,
        }
    }

    /// Begins a version-change transaction migrating to `target`.
    pub(crate) fn begin_version_change(
        id: TransactionId,
        database: Rc<RefCell<MemoryDatabase>>,
        target: u32,
    ) -> Self {
        let snapshot = {
            let db = database.borrow();
            VersionSnapshot {
                target,
                version: db.version,
                stores: db.stores.clone(),
            }
        };
        Self {
            id,
            mode: TransactionMode::VersionChange,
            scope: Vec::new(),
            state: TransactionState::Active,
            journal: Journal::new(),
            database,
            snapshot: Some(snapshot),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Undo log of the writes so far. Empty for version-change transactions.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::TransactionInactive {
                id: self.id,
                state: self.state.as_str().into(),
            });
        }
        Ok(())
    }

    fn check_access(&self, table: &str, operation: Operation) -> Result<()> {
        self.check_active()?;
        if self.mode != TransactionMode::VersionChange && !self.scope.iter().any(|t| t == table) {
            return Err(Error::invalid_state(format!(
                "table {} is not part of transaction {}",
                table, self.id
            )));
        }
        if operation.is_write() && !self.mode.is_writable() {
            return Err(Error::ReadOnly {
                table: table.into(),
                operation,
            });
        }
        Ok(())
    }

    /// Reads a record.
    pub fn get(&self, table: &str, key: &Value) -> Result<Option<Record>> {
        self.check_access(table, Operation::Get)?;
        let db = self.database.borrow();
        Ok(db.store(table)?.get(key).cloned())
    }

    /// Writes a record and journals the previous state.
    pub fn put(&mut self, table: &str, record: Record, key: Option<Value>, overwrite: bool) -> Result<Value> {
        let operation = if overwrite { Operation::Put } else { Operation::Add };
        self.check_access(table, operation)?;
        let outcome = self
            .database
            .borrow_mut()
            .store_mut(table)?
            .put(record, key, overwrite)?;
        self.journal
            .record_put(table, outcome.key.clone(), outcome.previous, outcome.generator);
        Ok(outcome.key)
    }

    /// Deletes a record if present.
    pub fn delete(&mut self, table: &str, key: &Value) -> Result<()> {
        self.check_access(table, Operation::Delete)?;
        let removed = self.database.borrow_mut().store_mut(table)?.delete(key);
        if let Some(record) = removed {
            self.journal.record_delete(table, key.clone(), record);
        }
        Ok(())
    }

    /// Clears a table.
    pub fn clear(&mut self, table: &str) -> Result<()> {
        self.check_access(table, Operation::Clear)?;
        let records = self.database.borrow_mut().store_mut(table)?.clear();
        self.journal.record_clear(table, records);
        Ok(())
    }

    /// Opens a cursor over a table or index. The first entry is read now,
    /// the rest one at a time as the cursor advances.
    pub fn scan(
        &self,
        table: &str,
        index: Option<&str>,
        range: &KeyRange<Value>,
        direction: Direction,
    ) -> Result<Cursor> {
        self.check_access(table, Operation::Scan)?;
        let first = self
            .database
            .borrow()
            .store(table)?
            .scan_next(index, range, direction, None)?;

        let database = self.database.clone();
        let (table, index, range) = (table.to_string(), index.map(str::to_string), range.clone());
        let mut position = first.as_ref().map(|e| (e.key.clone(), e.primary_key.clone()));
        let rest = std::iter::from_fn(move || {
            let (key, primary_key) = position.as_ref()?;
            let entry = database
                .borrow()
                .store(&table)
                .and_then(|store| store.scan_next(index.as_deref(), &range, direction, Some((key, primary_key))))
                .ok()
                .flatten();
            position = entry.as_ref().map(|e| (e.key.clone(), e.primary_key.clone()));
            entry
        });
        Ok(Cursor::new(first.into_iter().chain(rest)))
    }

    /// Counts entries in a table or index range.
    pub fn count(&self, table: &str, index: Option<&str>, range: &KeyRange<Value>) -> Result<usize> {
        self.check_access(table, Operation::Count)?;
        let db = self.database.borrow();
        db.store(table)?.count(index, range)
    }

    /// Applies a schema delta. Only valid in version-change transactions.
    pub fn apply_migration(&mut self, delta: &SchemaDelta) -> Result<()> {
        self.check_active()?;
        if self.mode != TransactionMode::VersionChange {
            return Err(Error::invalid_state(
                "schema changes require a version-change transaction",
            ));
        }
        let mut db = self.database.borrow_mut();
        match delta {
            SchemaDelta::CreateTable(schema) => {
                if db.stores.contains_key(schema.name()) {
                    return Err(Error::invalid_schema(format!(
                        "table {} already exists",
                        schema.name()
                    )));
                }
                db.stores
                    .insert(schema.name().to_string(), ObjectStore::new(schema.clone()));
            }
            SchemaDelta::DropTable { name } => {
                db.stores.remove(name).ok_or_else(|| Error::invalid_table(name))?;
            }
            SchemaDelta::CreateIndex { table, index } => {
                db.store_mut(table)?.create_index(index.clone())?;
            }
            SchemaDelta::DropIndex { table, index } => {
                db.store_mut(table)?.drop_index(index)?;
            }
            SchemaDelta::RenameTable { from, to } => {
                if db.stores.contains_key(to) {
                    return Err(Error::invalid_schema(format!("table {} already exists", to)));
                }
                let mut store = db.stores.remove(from).ok_or_else(|| Error::invalid_table(from))?;
                store.rename(to);
                db.stores.insert(to.clone(), store);
            }
        }
        Ok(())
    }

    /// Makes the writes permanent. A version change also records the new
    /// version.
    pub fn commit(&mut self) -> Result<()> {
        self.check_active()?;
        self.state = TransactionState::Committed;
        if let Some(snapshot) = self.snapshot.take() {
            self.database.borrow_mut().version = snapshot.target;
        }
        self.journal.commit();
        Ok(())
    }

    /// Undoes every write, or restores the snapshot of a version change.
    pub fn rollback(&mut self) -> Result<()> {
        self.check_active()?;
        self.state = TransactionState::RolledBack;
        let mut db = self.database.borrow_mut();
        match self.snapshot.take() {
            Some(snapshot) => {
                db.version = snapshot.version;
                db.stores = snapshot.stores;
                self.journal.commit();
            }
            None => self.journal.rollback(&mut db.stores),
        }
        Ok(())
    }
}
