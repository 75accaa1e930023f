//! Predicate selection on one column.

use crate::collection::Collection;
use crate::table::Table;
use strata_core::Value;
use strata_query::{Predicate, Query};
use strata_storage::{MemoryBackend, StorageAdapter};

/// The result of `table.where_(column)`: pick a predicate to get a
/// [`Collection`].
pub struct WhereClause<S: StorageAdapter = MemoryBackend> {
    table: Table<S>,
    column: String,
}

impl<S: StorageAdapter> WhereClause<S> {
    pub(crate) fn new(table: Table<S>, column: &str) -> Self {
        Self {
            table,
            column: column.into(),
        }
    }

    fn matching(self, predicate: Predicate) -> Collection<S> {
        let query = Query::where_(self.table.name(), self.column, predicate);
        Collection::new(self.table, query)
    }

    pub fn equals(self, value: impl Into<Value>) -> Collection<S> {
        self.matching(Predicate::equals(value))
    }

    pub fn equals_ignore_case(self, value: impl Into<String>) -> Collection<S> {
        self.matching(Predicate::equals_ignore_case(value))
    }

    pub fn above(self, value: impl Into<Value>) -> Collection<S> {
        self.matching(Predicate::above(value))
    }

    pub fn above_or_equal(self, value: impl Into<Value>) -> Collection<S> {
        self.matching(Predicate::above_or_equal(value))
    }

    pub fn below(self, value: impl Into<Value>) -> Collection<S> {
        self.matching(Predicate::below(value))
    }

    pub fn below_or_equal(self, value: impl Into<Value>) -> Collection<S> {
        self.matching(Predicate::below_or_equal(value))
    }

    /// Values between `lower` and `upper`. An inverted pair rejects with a
    /// query error when the collection runs.
    pub fn between(
        self,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
        include_lower: bool,
        include_upper: bool,
    ) -> Collection<S> {
        self.matching(Predicate::between(lower, upper, include_lower, include_upper))
    }

    pub fn starts_with(self, prefix: impl Into<String>) -> Collection<S> {
        self.matching(Predicate::starts_with(prefix))
    }

    pub fn starts_with_ignore_case(self, prefix: impl Into<String>) -> Collection<S> {
        self.matching(Predicate::starts_with_ignore_case(prefix))
    }

    pub fn any_of<I, V>(self, values: I) -> Collection<S>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.matching(Predicate::any_of(values))
    }
}
