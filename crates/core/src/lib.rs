//! Strata Core - Core types, schema parsing and migration planning for Strata.
//!
//! This crate provides the foundational types shared by every Strata layer:
//!
//! - `Value` and `Record`: field values with a total key order, and records
//!   addressable by dotted key paths
//! - `KeyRange` and `Direction`: bounds and order of store and index scans
//! - `schema`: column specification parsing (`++id,&email,*tags,[a+b]`),
//!   table and database schemas, versioned declarations
//! - `SchemaRegistry`: strictly increasing versions and migration planning
//! - `Error`: the error taxonomy every operation rejects with
//!
//! # Example
//!
//! ```rust
//! use strata_core::{SchemaRegistry, schema::DatabaseSchema};
//!
//! let mut registry = SchemaRegistry::new();
//! registry.declare_version(1, &[("tasks", "++id,date,description,done")]).unwrap();
//! registry.declare_version(2, &[("tasks", "++id,date,description,done,&slug")]).unwrap();
//!
//! let plan = registry.reconcile(0, 2, &DatabaseSchema::new()).unwrap();
//! assert_eq!(plan.steps().len(), 2);
//! assert!(plan.final_schema().unwrap().table("tasks").unwrap().index("slug").is_some());
//! ```

#![no_std]

extern crate alloc;

mod error;
mod key_range;
pub mod migration;
mod record;
mod registry;
pub mod schema;
mod value;

pub use error::{Error, ErrorKind, Operation, Result};
pub use key_range::{Direction, KeyRange};
pub use migration::{MigrationPlan, MigrationStep, SchemaDelta};
pub use record::Record;
pub use registry::SchemaRegistry;
pub use value::Value;
