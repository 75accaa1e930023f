//! Declared schema versions.

use super::database::DatabaseSchema;
use super::table::TableSchema;
use crate::error::{Error, Result};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// One declared schema version.
///
/// Versions are cumulative: a version lists only the tables it adds or
/// changes, plus tables it deletes or renames. Tables it does not mention
/// carry over from earlier versions.
///
/// ```rust
/// use strata_core::schema::SchemaVersion;
///
/// let v2 = SchemaVersion::new(2)
///     .store("tasks", "++id,date,done")
///     .unwrap()
///     .delete_store("drafts")
///     .rename_store("people", "contacts");
/// assert_eq!(v2.version(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaVersion {
    version: u32,
    stores: BTreeMap<String, TableSchema>,
    deletions: Vec<String>,
    renames: Vec<(String, String)>,
}

impl SchemaVersion {
    /// Creates an empty version declaration.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            stores: BTreeMap::new(),
            deletions: Vec::new(),
            renames: Vec::new(),
        }
    }

    /// Declares a table with a column specification.
    pub fn store(mut self, name: &str, spec: &str) -> Result<Self> {
        let table = TableSchema::parse(name, spec)?;
        self.stores.insert(name.to_string(), table);
        Ok(self)
    }

    /// Declares several tables at once.
    pub fn stores(self, specs: &[(&str, &str)]) -> Result<Self> {
        specs
            .iter()
            .try_fold(self, |version, (name, spec)| version.store(name, spec))
    }

    /// Marks a table for deletion in this version.
    pub fn delete_store(mut self, name: &str) -> Self {
        self.deletions.push(name.to_string());
        self
    }

    /// Renames a table in this version, keeping its records.
    pub fn rename_store(mut self, from: &str, to: &str) -> Self {
        self.renames.push((from.to_string(), to.to_string()));
        self
    }

    /// Returns the version number.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the renames declared by this version.
    pub fn renames(&self) -> &[(String, String)] {
        &self.renames
    }

    /// Applies this version on top of the previous effective schema.
    ///
    /// Renames apply first, then deletions, then table declarations.
    pub fn apply_to(&self, schema: &mut DatabaseSchema) -> Result<()> {
        for (from, to) in &self.renames {
            if !schema.contains(from) {
                return Err(Error::invalid_schema(format!(
                    "version {} renames unknown table {}",
                    self.version, from
                )));
            }
            schema.rename(from, to)?;
        }
        for name in &self.deletions {
            schema.remove(name);
        }
        for table in self.stores.values() {
            schema.insert(table.clone());
        }
        Ok(())
    }
}
