//! Database - Main entry point for Strata database operations.
//!
//! This module provides the `Database` struct: schema version declaration,
//! opening with migration, and the entry points for tables and
//! transactions.

use crate::deferred::Deferred;
use crate::options::DatabaseOptions;
use crate::table::Table;
use crate::transaction::Transaction;
use futures::future::{FutureExt, LocalBoxFuture};
use futures::lock::Mutex;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use strata_core::schema::{DatabaseSchema, SchemaVersion, TableSchema};
use strata_core::{Error, MigrationPlan, Result, SchemaRegistry};
use strata_storage::{MemoryBackend, OpenedDatabase, StorageAdapter, TransactionMode};
use tracing::debug;

type Callback<S> = Rc<dyn Fn(Transaction<S>) -> LocalBoxFuture<'static, Result<()>>>;

fn callback<S, F, Fut>(f: F) -> Callback<S>
where
    S: StorageAdapter,
    F: Fn(Transaction<S>) -> Fut + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    Rc::new(move |tx| f(tx).boxed_local())
}

struct Connection<S: StorageAdapter> {
    handle: S::Handle,
    version: u32,
    schema: DatabaseSchema,
}

enum OpenState<S: StorageAdapter> {
    /// Not open. `explicit` is set after `close`, which disables auto-open.
    Closed { explicit: bool },
    Open(Connection<S>),
}

struct Inner<S: StorageAdapter> {
    name: String,
    backend: S,
    options: DatabaseOptions,
    registry: RefCell<SchemaRegistry>,
    upgrades: RefCell<BTreeMap<u32, Callback<S>>>,
    populate: RefCell<Option<Callback<S>>>,
    state: RefCell<OpenState<S>>,
    open_guard: Mutex<()>,
    next_txn_id: Cell<u64>,
}

/// A database: declared schema versions over one substrate database.
///
/// Clones share the same connection.
pub struct Database<S: StorageAdapter = MemoryBackend> {
    inner: Rc<Inner<S>>,
}

impl<S: StorageAdapter> Clone for Database<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: StorageAdapter> fmt::Debug for Database<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("open", &self.is_open())
            .field("verno", &self.verno())
            .finish()
    }
}

impl<S: StorageAdapter> Database<S> {
    /// Creates a database handle with default options. Nothing is opened
    /// until [`Database::open`] or the first operation.
    pub fn new(name: &str, backend: S) -> Self {
        Self::with_options(name, backend, DatabaseOptions::default())
    }

    /// Creates a database handle.
    pub fn with_options(name: &str, backend: S, options: DatabaseOptions) -> Self {
        Self {
            inner: Rc::new(Inner {
                name: name.into(),
                backend,
                options,
                registry: RefCell::new(SchemaRegistry::new()),
                upgrades: RefCell::new(BTreeMap::new()),
                populate: RefCell::new(None),
                state: RefCell::new(OpenState::Closed { explicit: false }),
                open_guard: Mutex::new(()),
                next_txn_id: Cell::new(0),
            }),
        }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the options.
    pub fn options(&self) -> &DatabaseOptions {
        &self.inner.options
    }

    /// Starts declaring schema version `n`.
    pub fn version(&self, n: u32) -> VersionBuilder<S> {
        VersionBuilder {
            db: self.clone(),
            version: SchemaVersion::new(n),
            upgrade: None,
        }
    }

    /// Registers a callback run once, inside the version-change
    /// transaction, when the database is created.
    pub fn on_populate<F, Fut>(&self, f: F)
    where
        F: Fn(Transaction<S>) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        *self.inner.populate.borrow_mut() = Some(callback(f));
    }

    /// Returns true if the database is open.
    pub fn is_open(&self) -> bool {
        matches!(*self.inner.state.borrow(), OpenState::Open(_))
    }

    /// Returns the version the database is open at, or 0 when closed.
    pub fn verno(&self) -> u32 {
        match &*self.inner.state.borrow() {
            OpenState::Open(connection) => connection.version,
            OpenState::Closed { .. } => 0,
        }
    }

    /// Returns the table names of the open schema, or of the latest
    /// declared version when closed.
    pub fn tables(&self) -> Vec<String> {
        self.schema()
            .map(|schema| schema.table_names().map(String::from).collect())
            .unwrap_or_default()
    }

    fn schema(&self) -> Result<DatabaseSchema> {
        match &*self.inner.state.borrow() {
            OpenState::Open(connection) => Ok(connection.schema.clone()),
            OpenState::Closed { .. } => self.inner.registry.borrow().latest_schema(),
        }
    }

    pub(crate) fn table_schema(&self, name: &str) -> Result<TableSchema> {
        self.schema()?
            .table(name)
            .cloned()
            .ok_or_else(|| Error::invalid_table(name))
    }

    /// Returns the facade of a declared table. Each call on it runs in its
    /// own transaction.
    pub fn table(&self, name: &str) -> Result<Table<S>> {
        self.table_schema(name)?;
        Ok(Table::implicit(name, self.clone()))
    }

    /// Opens the database, running pending migrations.
    ///
    /// Fails with a version error if the substrate holds a newer version
    /// than the latest declared one. Any failure leaves the database closed
    /// and the substrate unchanged.
    pub async fn open(&self) -> Result<()> {
        let _guard = self.inner.open_guard.lock().await;
        if self.is_open() {
            return Ok(());
        }
        let registry = self.inner.registry.borrow().clone();
        let target = registry
            .latest_version()
            .ok_or_else(|| Error::invalid_schema("no schema version declared"))?;

        let opened = self.inner.backend.open_database(&self.inner.name, target).await?;
        debug!(
            database = %self.inner.name,
            installed = opened.version,
            target,
            "opened database"
        );
        match self.upgrade(&registry, &opened, target).await {
            Ok(schema) => {
                *self.inner.state.borrow_mut() = OpenState::Open(Connection {
                    handle: opened.handle,
                    version: target,
                    schema,
                });
                Ok(())
            }
            Err(e) => {
                self.inner.backend.close(&opened.handle);
                debug!(database = %self.inner.name, error = %e, "open failed");
                Err(e)
            }
        }
    }

    /// Migrates from the installed version to `target` in one version-change
    /// transaction and returns the resulting schema.
    async fn upgrade(
        &self,
        registry: &SchemaRegistry,
        opened: &OpenedDatabase<S::Handle>,
        target: u32,
    ) -> Result<DatabaseSchema> {
        let plan = registry.reconcile(opened.version, target, &opened.schema)?;
        let Some(schema) = plan.final_schema().cloned() else {
            return Ok(opened.schema.clone());
        };

        let txn = self.inner.backend.begin_version_change(&opened.handle, target)?;
        let tx = Transaction::new(
            self.next_txn_id(),
            self.inner.backend.clone(),
            txn,
            TransactionMode::VersionChange,
            Vec::new(),
            opened.schema.clone(),
        );
        match self.run_plan(&tx, &plan).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(schema)
            }
            Err(e) => {
                tx.fail(e.clone());
                Err(e)
            }
        }
    }

    async fn run_plan(&self, tx: &Transaction<S>, plan: &MigrationPlan) -> Result<()> {
        for step in plan.steps() {
            debug!(
                database = %self.inner.name,
                version = step.version(),
                deltas = step.deltas().len(),
                "applying migration step"
            );
            for delta in step.deltas() {
                tx.apply_migration(delta).await?;
            }
            tx.set_schema(step.schema().clone());

            // Upgrade callbacks transform existing data; a new database has none.
            if plan.is_fresh() {
                continue;
            }
            let upgrade = self.inner.upgrades.borrow().get(&step.version()).cloned();
            if let Some(upgrade) = upgrade {
                upgrade(tx.clone()).await?;
            }
        }
        if plan.is_fresh() {
            let populate = self.inner.populate.borrow().clone();
            if let Some(populate) = populate {
                populate(tx.clone()).await?;
            }
        }
        Ok(())
    }

    /// Closes the connection. Later operations reject with a closed error
    /// until [`Database::open`] is called again.
    pub fn close(&self) {
        let previous = self
            .inner
            .state
            .replace(OpenState::Closed { explicit: true });
        if let OpenState::Open(connection) = previous {
            self.inner.backend.close(&connection.handle);
            debug!(database = %self.inner.name, "closed database");
        }
    }

    /// Closes the connection and deletes the database from the substrate.
    pub async fn delete(&self) -> Result<()> {
        let _guard = self.inner.open_guard.lock().await;
        let previous = self
            .inner
            .state
            .replace(OpenState::Closed { explicit: false });
        if let OpenState::Open(connection) = previous {
            self.inner.backend.close(&connection.handle);
        }
        self.inner.backend.delete_database(&self.inner.name).await?;
        debug!(database = %self.inner.name, "deleted database");
        Ok(())
    }

    fn next_txn_id(&self) -> u64 {
        let id = self.inner.next_txn_id.get() + 1;
        self.inner.next_txn_id.set(id);
        id
    }

    fn connection(&self) -> Option<(S::Handle, DatabaseSchema)> {
        match &*self.inner.state.borrow() {
            OpenState::Open(connection) => Some((connection.handle.clone(), connection.schema.clone())),
            OpenState::Closed { .. } => None,
        }
    }

    fn closed(&self) -> Error {
        Error::DatabaseClosed {
            name: self.inner.name.clone(),
        }
    }

    /// Returns the open connection, opening it first when allowed.
    async fn ensure_open(&self) -> Result<(S::Handle, DatabaseSchema)> {
        if let Some(connection) = self.connection() {
            return Ok(connection);
        }
        let explicitly_closed = matches!(
            *self.inner.state.borrow(),
            OpenState::Closed { explicit: true }
        );
        if explicitly_closed || !self.inner.options.auto_open {
            return Err(self.closed());
        }
        self.open().await?;
        self.connection().ok_or_else(|| self.closed())
    }

    /// Begins a transaction over `tables`.
    pub(crate) async fn begin(&self, mode: TransactionMode, tables: &[String]) -> Result<Transaction<S>> {
        let (handle, schema) = self.ensure_open().await?;
        for table in tables {
            if !schema.contains(table) {
                return Err(Error::invalid_table(table.as_str()));
            }
        }
        let txn = self.inner.backend.begin_transaction(&handle, tables, mode)?;
        Ok(Transaction::new(
            self.next_txn_id(),
            self.inner.backend.clone(),
            txn,
            mode,
            tables.to_vec(),
            schema,
        ))
    }

    /// Runs `body` in one transaction over `tables`.
    ///
    /// Every operation `body` issues joins the same substrate transaction.
    /// When `body` resolves the transaction commits; when it rejects, or any
    /// operation fails, the transaction rolls back and the returned value
    /// rejects with the cause.
    pub fn transaction<T, F, Fut>(&self, mode: TransactionMode, tables: &[&str], body: F) -> Deferred<T>
    where
        T: 'static,
        F: FnOnce(Transaction<S>) -> Fut + 'static,
        Fut: Future<Output = Result<T>> + 'static,
    {
        let db = self.clone();
        let tables: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        Deferred::new(async move {
            let tx = db.begin(mode, &tables).await?;
            match body(tx.clone()).await {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(e) => {
                    tx.fail(e.clone());
                    Err(e)
                }
            }
        })
    }
}

/// Declaration of one schema version, registered by
/// [`VersionBuilder::declare`].
#[must_use = "a version is only registered by declare()"]
pub struct VersionBuilder<S: StorageAdapter = MemoryBackend> {
    db: Database<S>,
    version: SchemaVersion,
    upgrade: Option<Callback<S>>,
}

impl<S: StorageAdapter> VersionBuilder<S> {
    /// Declares tables by column specification, e.g.
    /// `("tasks", "++id,date,description,done")`.
    pub fn stores(mut self, specs: &[(&str, &str)]) -> Result<Self> {
        self.version = self.version.stores(specs)?;
        Ok(self)
    }

    /// Declares one table.
    pub fn store(mut self, name: &str, spec: &str) -> Result<Self> {
        self.version = self.version.store(name, spec)?;
        Ok(self)
    }

    /// Drops a table in this version.
    pub fn delete_store(mut self, name: &str) -> Self {
        self.version = self.version.delete_store(name);
        self
    }

    /// Renames a table in this version, keeping its records.
    pub fn rename_store(mut self, from: &str, to: &str) -> Self {
        self.version = self.version.rename_store(from, to);
        self
    }

    /// Registers a callback run inside the version-change transaction after
    /// this version's schema changes, when upgrading an existing database.
    pub fn upgrade<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Transaction<S>) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.upgrade = Some(callback(f));
        self
    }

    /// Registers the version. Versions must be declared in increasing order
    /// and before the database is opened.
    pub fn declare(self) -> Result<()> {
        let inner = &self.db.inner;
        if self.db.is_open() {
            return Err(Error::invalid_state(
                "schema versions must be declared before the database is opened",
            ));
        }
        let n = self.version.version();
        inner.registry.borrow_mut().declare(self.version)?;
        if let Some(upgrade) = self.upgrade {
            inner.upgrades.borrow_mut().insert(n, upgrade);
        }
        Ok(())
    }
}
