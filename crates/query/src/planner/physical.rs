//! Physical scan plans.

use crate::ast::Predicate;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::IndexDescriptor;
use strata_core::{Direction, KeyRange, Record, Value};

/// Where a scan reads from.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanSource {
    /// The primary key of the table.
    PrimaryKey,
    /// A secondary index.
    Index(String),
    /// Every record in primary key order, filtered by a residual.
    FullTable,
}

/// A check applied to each scanned entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Residual {
    /// Evaluated against the index key of the cursor entry.
    IndexKey(Predicate),
    /// Evaluated against the keys a record holds at an unindexed column.
    Field {
        column: IndexDescriptor,
        predicate: Predicate,
    },
}

impl Residual {
    /// Returns true if the entry passes.
    pub fn matches(&self, key: &Value, record: &Record) -> bool {
        match self {
            Residual::IndexKey(predicate) => predicate.matches(key),
            Residual::Field { column, predicate } => column
                .extract_keys(record)
                .iter()
                .any(|k| predicate.matches(k)),
        }
    }
}

/// A compiled query: one or more key range scans over one source.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanPlan {
    /// Table to scan.
    pub table: String,
    /// Primary key, index, or the whole table.
    pub source: ScanSource,
    /// Ranges in ascending key order. Empty means no record can match.
    pub ranges: Vec<KeyRange<Value>>,
    /// Check for false positives of the ranges.
    pub residual: Option<Residual>,
    /// Whether the same record may be reached twice.
    pub dedupe: bool,
    pub direction: Direction,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ScanPlan {
    /// Returns the index name to pass to the substrate.
    pub fn index_name(&self) -> Option<&str> {
        match &self.source {
            ScanSource::Index(name) => Some(name),
            ScanSource::PrimaryKey | ScanSource::FullTable => None,
        }
    }

    /// Returns the ranges in the order they should be scanned.
    pub fn ordered_ranges(&self) -> impl Iterator<Item = &KeyRange<Value>> {
        let ranges: Vec<&KeyRange<Value>> = match self.direction {
            Direction::Next => self.ranges.iter().collect(),
            Direction::Prev => self.ranges.iter().rev().collect(),
        };
        ranges.into_iter()
    }

    /// Returns true if the substrate's range count equals the match count.
    pub fn can_count_natively(&self) -> bool {
        self.residual.is_none() && !self.dedupe && self.ranges.len() <= 1
    }

    /// Returns true if no record can match.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() || self.limit == Some(0)
    }
}
