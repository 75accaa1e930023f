//! Collections: queries bound to a table, with terminals that run them.

use crate::deferred::Deferred;
use crate::executor::{self, RecordFilter};
use crate::table::Table;
use crate::transaction::Transaction;
use std::fmt;
use std::rc::Rc;
use strata_core::{Error, Operation, Record, Result, Value};
use strata_query::{compile, Query, ScanPlan};
use strata_storage::{MemoryBackend, StorageAdapter, TransactionMode};

/// A query over one table. Modifiers return new collections; terminals
/// compile the query against the table's schema and run it.
pub struct Collection<S: StorageAdapter = MemoryBackend> {
    table: Table<S>,
    query: Query,
    filters: Vec<RecordFilter>,
}

impl<S: StorageAdapter> Clone for Collection<S> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            query: self.query.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<S: StorageAdapter> fmt::Debug for Collection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("query", &self.query)
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl<S: StorageAdapter> Collection<S> {
    pub(crate) fn new(table: Table<S>, query: Query) -> Self {
        Self {
            table,
            query,
            filters: Vec::new(),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Reverses the order.
    pub fn reverse(mut self) -> Self {
        self.query = self.query.reverse();
        self
    }

    /// Skips the first `n` matches.
    pub fn offset(mut self, n: usize) -> Self {
        self.query = self.query.offset(n);
        self
    }

    /// Keeps at most `n` matches.
    pub fn limit(mut self, n: usize) -> Self {
        self.query = self.query.limit(n);
        self
    }

    /// Keeps only records passing `predicate`. Offset and limit count the
    /// records that pass.
    pub fn filter(mut self, predicate: impl Fn(&Record) -> bool + 'static) -> Self {
        self.filters.push(Rc::new(predicate));
        self
    }

    fn plan(&self, tx: &Transaction<S>) -> Result<ScanPlan> {
        let schema = tx.table_schema(self.table.name())?;
        compile(&schema, &self.query)
    }

    /// Reads every match.
    pub fn to_array(&self) -> Deferred<Vec<Record>> {
        let this = self.clone();
        self.table.run(TransactionMode::ReadOnly, move |tx| async move {
            let plan = this.plan(&tx)?;
            let entries = executor::execute(&tx, &plan, &this.filters).await?;
            Ok(entries.into_iter().map(|entry| entry.record).collect())
        })
    }

    /// Reads the first match, stopping the scan there.
    pub fn first(&self) -> Deferred<Option<Record>> {
        self.clone()
            .limit(1)
            .to_array()
            .map(|records| records.into_iter().next())
    }

    /// Counts the matches.
    pub fn count(&self) -> Deferred<usize> {
        let this = self.clone();
        self.table.run(TransactionMode::ReadOnly, move |tx| async move {
            let plan = this.plan(&tx)?;
            executor::count(&tx, &plan, &this.filters).await
        })
    }

    /// Reads the primary keys of the matches.
    pub fn primary_keys(&self) -> Deferred<Vec<Value>> {
        let this = self.clone();
        self.table.run(TransactionMode::ReadOnly, move |tx| async move {
            let plan = this.plan(&tx)?;
            let entries = executor::execute(&tx, &plan, &this.filters).await?;
            Ok(entries.into_iter().map(|entry| entry.primary_key).collect())
        })
    }

    /// Merges `changes`, keyed by key path, into every match and resolves to
    /// the number of records modified.
    pub fn modify(&self, changes: Record) -> Deferred<usize> {
        let table = self.table.name().to_string();
        self.modify_by(move |record| {
            if record.merge(&changes) {
                Ok(())
            } else {
                Err(Error::constraint(
                    table.as_str(),
                    Operation::Modify,
                    None,
                    "a change targets a path below a non-object value",
                ))
            }
        })
    }

    /// Applies `f` to every match and resolves to the number of records
    /// modified.
    pub fn modify_with(&self, f: impl Fn(&mut Record) + 'static) -> Deferred<usize> {
        self.modify_by(move |record| {
            f(record);
            Ok(())
        })
    }

    fn modify_by(&self, mutate: impl Fn(&mut Record) -> Result<()> + 'static) -> Deferred<usize> {
        let this = self.clone();
        self.table.run(TransactionMode::ReadWrite, move |tx| async move {
            let name = this.table.name();
            tx.check(name, Operation::Modify)?;
            let schema = tx.table_schema(name)?;
            let plan = compile(&schema, &this.query)?;
            let entries = executor::execute(&tx, &plan, &this.filters).await?;

            let primary_key = schema.primary_key();
            let mut writes = Vec::with_capacity(entries.len());
            for entry in entries {
                let mut record = entry.record;
                mutate(&mut record).map_err(|e| tx.fail(e))?;
                let explicit = match primary_key.key_path() {
                    Some(path) => {
                        if path.extract(&record).as_ref() != Some(&entry.primary_key) {
                            return Err(tx.fail(Error::constraint(
                                name,
                                Operation::Modify,
                                Some(entry.primary_key),
                                "modify may not change the primary key",
                            )));
                        }
                        None
                    }
                    None => Some(entry.primary_key),
                };
                writes.push(tx.put(name, record, explicit, true));
            }

            let modified = writes.len();
            for write in writes {
                write.await.map_err(|e| e.during(Operation::Modify))?;
            }
            Ok(modified)
        })
    }

    /// Deletes every match and resolves to the number of records deleted.
    pub fn delete(&self) -> Deferred<usize> {
        let this = self.clone();
        self.table.run(TransactionMode::ReadWrite, move |tx| async move {
            let name = this.table.name();
            tx.check(name, Operation::Delete)?;
            let plan = this.plan(&tx)?;
            let entries = executor::execute(&tx, &plan, &this.filters).await?;
            let deletes: Vec<_> = entries
                .into_iter()
                .map(|entry| tx.delete(name, entry.primary_key))
                .collect();
            let deleted = deletes.len();
            for delete in deletes {
                delete.await?;
            }
            Ok(deleted)
        })
    }
}
