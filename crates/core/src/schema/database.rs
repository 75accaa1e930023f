//! Whole-database schema.

use super::table::TableSchema;
use crate::error::{Error, Result};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;

/// The set of tables of one database version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseSchema {
    tables: BTreeMap<String, TableSchema>,
}

impl DatabaseSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if there are no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Gets a table by name.
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Returns true if the table exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterates over tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Iterates over table names in order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Adds or replaces a table.
    pub fn insert(&mut self, table: TableSchema) -> Option<TableSchema> {
        self.tables.insert(table.name().into(), table)
    }

    /// Removes a table.
    pub fn remove(&mut self, name: &str) -> Option<TableSchema> {
        self.tables.remove(name)
    }

    /// Renames a table.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if self.tables.contains_key(to) {
            return Err(Error::invalid_schema(format!(
                "cannot rename {} to {}: table already exists",
                from, to
            )));
        }
        let table = self
            .tables
            .remove(from)
            .ok_or_else(|| Error::invalid_table(from))?;
        self.tables.insert(to.into(), table.renamed(to));
        Ok(())
    }
}

impl FromIterator<TableSchema> for DatabaseSchema {
    fn from_iter<I: IntoIterator<Item = TableSchema>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(|t| (t.name().into(), t)).collect(),
        }
    }
}
