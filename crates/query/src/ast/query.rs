//! Immutable query values.

use crate::ast::Predicate;
use alloc::string::String;
use strata_core::Direction;

/// What a query selects from its table.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// Every record, in primary key order.
    All,
    /// Every record, in the order of an index.
    OrderedBy(String),
    /// Records whose column matches a predicate.
    Where { column: String, predicate: Predicate },
}

/// A query over one table.
///
/// Every modifier consumes the query and returns a new value; a query is
/// only compiled into a scan plan when a terminal runs.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    table: String,
    selection: Selection,
    direction: Direction,
    offset: usize,
    limit: Option<usize>,
}

impl Query {
    /// Selects every record of `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self::new(table.into(), Selection::All)
    }

    /// Selects every record of `table` in `index` order.
    pub fn order_by(table: impl Into<String>, index: impl Into<String>) -> Self {
        Self::new(table.into(), Selection::OrderedBy(index.into()))
    }

    /// Selects the records of `table` whose `column` matches `predicate`.
    pub fn where_(table: impl Into<String>, column: impl Into<String>, predicate: Predicate) -> Self {
        Self::new(
            table.into(),
            Selection::Where {
                column: column.into(),
                predicate,
            },
        )
    }

    fn new(table: String, selection: Selection) -> Self {
        Self {
            table,
            selection,
            direction: Direction::Next,
            offset: 0,
            limit: None,
        }
    }

    /// Reverses the result order.
    pub fn reverse(mut self) -> Self {
        self.direction = self.direction.reverse();
        self
    }

    /// Skips the first `n` matches, on top of any offset already set.
    pub fn offset(mut self, n: usize) -> Self {
        self.offset = self.offset.saturating_add(n);
        self.limit = self.limit.map(|limit| limit.saturating_sub(n));
        self
    }

    /// Keeps at most `n` matches.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(self.limit.map_or(n, |limit| limit.min(n)));
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn skip(&self) -> usize {
        self.offset
    }

    pub fn take(&self) -> Option<usize> {
        self.limit
    }
}
