//! Schema registry: ordered version declarations and reconciliation.

use crate::error::{Error, Result};
use crate::migration::{self, MigrationPlan};
use crate::schema::{DatabaseSchema, SchemaVersion};
use alloc::vec::Vec;

/// Holds declared schema versions in strictly increasing order.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    versions: Vec<SchemaVersion>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a version. Versions must be declared in increasing order.
    pub fn declare(&mut self, version: SchemaVersion) -> Result<()> {
        if version.version() == 0 {
            return Err(Error::invalid_schema("schema versions start at 1"));
        }
        if let Some(latest) = self.latest_version() {
            if version.version() <= latest {
                return Err(Error::SchemaOrder {
                    version: version.version(),
                    latest,
                });
            }
        }
        self.versions.push(version);
        Ok(())
    }

    /// Registers version `n` from `(table, spec)` pairs.
    pub fn declare_version(&mut self, n: u32, stores: &[(&str, &str)]) -> Result<()> {
        self.declare(SchemaVersion::new(n).stores(stores)?)
    }

    /// Returns the highest declared version.
    pub fn latest_version(&self) -> Option<u32> {
        self.versions.last().map(SchemaVersion::version)
    }

    /// Returns the declaration of version `n`.
    pub fn version(&self, n: u32) -> Option<&SchemaVersion> {
        self.versions
            .binary_search_by_key(&n, SchemaVersion::version)
            .ok()
            .map(|i| &self.versions[i])
    }

    /// Returns all declarations in order.
    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    /// Returns the effective schema of version `n`: every declaration up to
    /// and including `n` folded in order.
    pub fn schema_at(&self, n: u32) -> Result<DatabaseSchema> {
        let mut schema = DatabaseSchema::new();
        for version in self.versions.iter().take_while(|v| v.version() <= n) {
            version.apply_to(&mut schema)?;
        }
        Ok(schema)
    }

    /// Returns the effective schema of the latest declared version.
    pub fn latest_schema(&self) -> Result<DatabaseSchema> {
        match self.latest_version() {
            Some(latest) => self.schema_at(latest),
            None => Ok(DatabaseSchema::new()),
        }
    }

    /// Computes the migration plan from the persisted version to `target`.
    ///
    /// `installed` is the schema actually present on the substrate; the first
    /// step diffs against it. Every version in `(persisted, target]` must be
    /// declared. A fresh database (`persisted == 0`) starts at the first
    /// declared version.
    pub fn reconcile(
        &self,
        persisted: u32,
        target: u32,
        installed: &DatabaseSchema,
    ) -> Result<MigrationPlan> {
        if target < persisted {
            return Err(Error::Version {
                requested: target,
                installed: persisted,
            });
        }
        if target == persisted {
            return Ok(MigrationPlan::new(persisted, Vec::new()));
        }

        let first = self
            .versions
            .first()
            .map(SchemaVersion::version)
            .ok_or_else(|| Error::invalid_schema("no schema versions declared"))?;
        let start = if persisted == 0 { first.min(target) } else { persisted + 1 };

        let mut steps = Vec::new();
        let mut previous = installed.clone();
        for n in start..=target {
            let declared = self.version(n).ok_or(Error::SchemaGap {
                from: persisted,
                to: target,
                missing: n,
            })?;
            let next = self.schema_at(n)?;
            steps.push(migration::step(n, &previous, &next, declared.renames())?);
            previous = next;
        }
        Ok(MigrationPlan::new(persisted, steps))
    }
}
