//! Migration planning between schema versions.

use crate::error::{Error, Result};
use crate::schema::{DatabaseSchema, IndexDescriptor, TableSchema};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// One structural change between two schemas.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaDelta {
    /// Create a table with all its indexes.
    CreateTable(TableSchema),
    /// Drop a table and its records.
    DropTable { name: String },
    /// Create an index on an existing table.
    CreateIndex { table: String, index: IndexDescriptor },
    /// Drop an index from a table.
    DropIndex { table: String, index: String },
    /// Rename a table, keeping its records.
    RenameTable { from: String, to: String },
}

/// The deltas bringing the database to one declared version.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationStep {
    version: u32,
    deltas: Vec<SchemaDelta>,
    schema: DatabaseSchema,
}

impl MigrationStep {
    /// Returns the version this step migrates to.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns the structural changes of this step, in application order.
    pub fn deltas(&self) -> &[SchemaDelta] {
        &self.deltas
    }

    /// Returns the schema in effect after this step.
    pub fn schema(&self) -> &DatabaseSchema {
        &self.schema
    }
}

/// An ordered sequence of migration steps.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationPlan {
    from: u32,
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub(crate) fn new(from: u32, steps: Vec<MigrationStep>) -> Self {
        Self { from, steps }
    }

    /// Returns true if the plan creates the database from scratch.
    pub fn is_fresh(&self) -> bool {
        self.from == 0
    }

    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the steps in increasing version order.
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Returns the schema after the last step.
    pub fn final_schema(&self) -> Option<&DatabaseSchema> {
        self.steps.last().map(MigrationStep::schema)
    }
}

/// Builds a step from `previous` to `next`.
pub(crate) fn step(
    version: u32,
    previous: &DatabaseSchema,
    next: &DatabaseSchema,
    renames: &[(String, String)],
) -> Result<MigrationStep> {
    Ok(MigrationStep {
        version,
        deltas: diff(previous, next, renames)?,
        schema: next.clone(),
    })
}

/// Computes the deltas turning `previous` into `next`.
///
/// Renames apply first so that a renamed table keeps its records. Table
/// drops follow, then creations and index changes. Within one table, index
/// drops precede index creations so a redefined index is rebuilt.
pub fn diff(
    previous: &DatabaseSchema,
    next: &DatabaseSchema,
    renames: &[(String, String)],
) -> Result<Vec<SchemaDelta>> {
    let mut deltas = Vec::new();
    let mut working = previous.clone();

    for (from, to) in renames {
        if working.contains(from) {
            working.rename(from, to)?;
            deltas.push(SchemaDelta::RenameTable {
                from: from.clone(),
                to: to.clone(),
            });
        }
    }

    for name in working.table_names() {
        if !next.contains(name) {
            deltas.push(SchemaDelta::DropTable {
                name: name.to_string(),
            });
        }
    }

    for table in next.tables() {
        let Some(old) = working.table(table.name()) else {
            deltas.push(SchemaDelta::CreateTable(table.clone()));
            continue;
        };
        if old.primary_key() != table.primary_key() {
            return Err(Error::invalid_schema(format!(
                "cannot change primary key of table {} from '{}' to '{}'",
                table.name(),
                old.primary_key(),
                table.primary_key()
            )));
        }
        for idx in old.indexes() {
            if table.index(idx.name()) != Some(idx) {
                deltas.push(SchemaDelta::DropIndex {
                    table: table.name().to_string(),
                    index: idx.name().to_string(),
                });
            }
        }
        for idx in table.indexes() {
            if old.index(idx.name()) != Some(idx) {
                deltas.push(SchemaDelta::CreateIndex {
                    table: table.name().to_string(),
                    index: idx.clone(),
                });
            }
        }
    }

    Ok(deltas)
}
