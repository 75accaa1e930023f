//! Schema module for Strata.
//!
//! This module contains key paths, index descriptors, table schemas parsed
//! from column specifications, and versioned schema declarations.

mod database;
mod index;
mod key_path;
mod table;
mod version;

pub use database::DatabaseSchema;
pub use index::{IndexDescriptor, OUTBOUND_KEY_NAME};
pub use key_path::KeyPath;
pub use table::{KeyResolution, TableSchema};
pub use version::SchemaVersion;
