//! Strata Query - Declarative queries for the Strata database engine.
//!
//! This crate provides the query layer including:
//!
//! - `ast`: Predicates and immutable query values
//! - `planner`: Compilation of a query against a table schema into a scan plan
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::TableSchema;
//! use strata_core::Value;
//! use strata_query::{compile, Predicate, Query, ScanSource};
//!
//! let schema = TableSchema::parse("tasks", "++id,date,done").unwrap();
//! let query = Query::where_("tasks", "done", Predicate::above(Value::Int64(0)));
//! let plan = compile(&schema, &query).unwrap();
//! assert_eq!(plan.source, ScanSource::Index("done".into()));
//! assert!(plan.can_count_natively());
//! ```

#![no_std]

extern crate alloc;

pub mod ast;
pub mod planner;

pub use ast::{Predicate, Query, Selection};
pub use planner::{compile, Residual, ScanPlan, ScanSource};
