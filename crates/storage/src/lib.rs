//! Strata Storage - Object-store substrate for the Strata database engine.
//!
//! This crate provides the storage layer including:
//!
//! - `StorageAdapter`: The capability interface the engine consumes
//! - `MemoryBackend`: An in-memory substrate implementing it
//! - `ObjectStore`: Key-ordered records with index maintenance
//! - `Journal`: Change tracking for rollback
//! - `Transaction`: Transaction state of the memory substrate
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use strata_core::schema::TableSchema;
//! use strata_core::{Record, SchemaDelta, Value};
//! use strata_storage::{MemoryBackend, StorageAdapter, TransactionMode};
//!
//! let backend = MemoryBackend::new();
//! let opened = block_on(backend.open_database("app", 1)).unwrap();
//!
//! let txn = backend.begin_version_change(&opened.handle, 1).unwrap();
//! let users = TableSchema::parse("users", "++id,name").unwrap();
//! block_on(backend.apply_migration(&txn, &SchemaDelta::CreateTable(users))).unwrap();
//! block_on(backend.commit(&txn)).unwrap();
//!
//! let txn = backend
//!     .begin_transaction(&opened.handle, &["users".into()], TransactionMode::ReadWrite)
//!     .unwrap();
//! let key = block_on(backend.put(&txn, "users", Record::new().with("name", "Alice"), None, true)).unwrap();
//! block_on(backend.commit(&txn)).unwrap();
//!
//! assert_eq!(key, Value::Int64(1));
//! assert_eq!(backend.records_of("app", "users").unwrap().len(), 1);
//! ```

pub mod adapter;
pub mod journal;
pub mod memory;
pub mod object_store;
pub mod transaction;

pub use adapter::{Cursor, CursorEntry, OpenedDatabase, StorageAdapter, StorageRequest, TransactionMode};
pub use journal::{Journal, JournalEntry};
pub use memory::{MemoryBackend, MemoryDatabase, MemoryHandle, MemoryTxn};
pub use object_store::{ObjectStore, PutOutcome};
pub use transaction::{Transaction, TransactionId, TransactionState};
