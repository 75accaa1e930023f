//! Strata Database - Versioned schemas, indexed queries and transactions over
//! an object-store substrate.
//!
//! This crate provides the public API of Strata:
//!
//! - `Database`: schema version declaration, open with migration, close and delete
//! - `Table`: CRUD and bulk CRUD on one declared table
//! - `WhereClause` and `Collection`: declarative queries and their terminals
//! - `Transaction`: explicit multi-table transactions with fail-fast rollback
//! - `Deferred` and `Chain`: deferred results and cancellable sequencing
//!
//! # Example
//!
//! ```rust
//! use futures::executor::block_on;
//! use serde_json::json;
//! use strata_core::Record;
//! use strata_database::Database;
//! use strata_storage::MemoryBackend;
//!
//! let db = Database::new("todo", MemoryBackend::new());
//! db.version(1)
//!     .stores(&[("tasks", "++id,date,description,done")])
//!     .unwrap()
//!     .declare()
//!     .unwrap();
//!
//! block_on(async {
//!     let tasks = db.table("tasks")?;
//!     for (description, done) in [("write", 0), ("test", 1), ("ship", 1)] {
//!         let task = Record::from_json(json!({ "date": 1, "description": description, "done": done }))?;
//!         tasks.add(task).await?;
//!     }
//!     let finished = tasks.where_("done").above(0).to_array().await?;
//!     assert_eq!(finished.len(), 2);
//!     Ok::<_, strata_core::Error>(())
//! })
//! .unwrap();
//! ```

pub mod collection;
pub mod database;
pub mod deferred;
mod executor;
pub mod options;
pub mod table;
pub mod transaction;
pub mod where_clause;

pub use collection::Collection;
pub use database::{Database, VersionBuilder};
pub use deferred::{CancellationToken, Chain, Deferred};
pub use executor::RecordFilter;
pub use options::DatabaseOptions;
pub use table::Table;
pub use transaction::{Transaction, TransactionState};
pub use where_clause::WhereClause;

pub use strata_core::{Error, ErrorKind, Operation, Record, Result, Value};
pub use strata_storage::TransactionMode;
