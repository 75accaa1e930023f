//! Compilation of queries into scan plans.

use crate::ast::{case_variants, Predicate, Query, Selection};
use crate::planner::{Residual, ScanPlan, ScanSource};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use strata_core::schema::{IndexDescriptor, KeyPath, TableSchema};
use strata_core::{Error, KeyRange, Result, Value};

/// Compiles `query` against the schema of its table.
///
/// A predicate on the primary key or a declared index becomes one or more
/// key range scans. A predicate on any other column becomes a full-table
/// scan with the predicate evaluated per record.
pub fn compile(schema: &TableSchema, query: &Query) -> Result<ScanPlan> {
    let mut plan = ScanPlan {
        table: schema.name().to_string(),
        source: ScanSource::PrimaryKey,
        ranges: vec![KeyRange::all()],
        residual: None,
        dedupe: false,
        direction: query.direction(),
        offset: query.skip(),
        limit: query.take(),
    };

    match query.selection() {
        Selection::All => {}
        Selection::OrderedBy(column) => {
            let (source, multi_entry) = resolve_index(schema, column).ok_or_else(|| {
                Error::query(schema.name(), column.as_str(), "orderBy requires an indexed column")
            })?;
            plan.source = source;
            plan.dedupe = multi_entry;
        }
        Selection::Where { column, predicate } => {
            let (ranges, key_residual) = key_ranges(schema.name(), column, predicate)?;
            match resolve_index(schema, column) {
                Some((source, multi_entry)) => {
                    plan.source = source;
                    plan.dedupe = multi_entry || ranges.len() > 1;
                    plan.ranges = ranges;
                    plan.residual = key_residual;
                }
                None => {
                    let key_path = KeyPath::parse(column).map_err(|_| {
                        Error::query(schema.name(), column.as_str(), "not a valid key path")
                    })?;
                    plan.source = ScanSource::FullTable;
                    if ranges.is_empty() {
                        plan.ranges = ranges;
                    }
                    plan.residual = Some(Residual::Field {
                        column: IndexDescriptor::new(key_path),
                        predicate: predicate.clone(),
                    });
                }
            }
        }
    }
    Ok(plan)
}

/// Finds the scan source for a column name and whether it is multi-entry.
fn resolve_index(schema: &TableSchema, column: &str) -> Option<(ScanSource, bool)> {
    if schema.is_primary_key(column) {
        return Some((ScanSource::PrimaryKey, false));
    }
    schema
        .index(column)
        .map(|index| (ScanSource::Index(index.name().to_string()), index.is_multi_entry()))
}

fn check_key(table: &str, column: &str, predicate: &Predicate, value: &Value) -> Result<()> {
    if value.is_valid_key() {
        return Ok(());
    }
    Err(Error::query(
        table,
        column,
        alloc::format!("{} argument {} is not a valid key", predicate.name(), value),
    ))
}

/// Translates a predicate into ascending, disjoint key ranges plus a check
/// for the candidates those ranges over-approximate.
fn key_ranges(
    table: &str,
    column: &str,
    predicate: &Predicate,
) -> Result<(Vec<KeyRange<Value>>, Option<Residual>)> {
    match predicate {
        Predicate::Equals(value) => {
            check_key(table, column, predicate, value)?;
            Ok((vec![KeyRange::only(value.clone())], None))
        }
        Predicate::Range(range) => {
            let (lower, upper) = range.bounds();
            for bound in [lower, upper] {
                if let core::ops::Bound::Included(v) | core::ops::Bound::Excluded(v) = bound {
                    check_key(table, column, predicate, v)?;
                }
            }
            if range.is_inverted() {
                return Err(Error::query(table, column, "lower bound is greater than upper bound"));
            }
            if range.is_empty() {
                return Ok((Vec::new(), None));
            }
            Ok((vec![range.clone()], None))
        }
        Predicate::AnyOf(values) => {
            for value in values {
                check_key(table, column, predicate, value)?;
            }
            let mut keys = values.clone();
            keys.sort();
            keys.dedup();
            Ok((keys.into_iter().map(KeyRange::only).collect(), None))
        }
        Predicate::StartsWith(prefix) => Ok((vec![prefix_range(prefix)], None)),
        Predicate::StartsWithIgnoreCase(prefix) if prefix.is_empty() => {
            Ok((vec![prefix_range(prefix)], None))
        }
        Predicate::StartsWithIgnoreCase(prefix) => {
            let upper = successor(&case_variant(prefix, true));
            let range = KeyRange::bound(
                Value::String(case_variant(prefix, false)),
                upper,
                false,
                true,
            );
            Ok((vec![range], Some(Residual::IndexKey(predicate.clone()))))
        }
        Predicate::EqualsIgnoreCase(text) => {
            let range = KeyRange::bound(
                Value::String(case_variant(text, false)),
                Value::String(case_variant(text, true)),
                false,
                false,
            );
            Ok((vec![range], Some(Residual::IndexKey(predicate.clone()))))
        }
    }
}

/// Range of every string starting with `prefix`.
fn prefix_range(prefix: &str) -> KeyRange<Value> {
    KeyRange::bound(Value::String(prefix.to_string()), successor(prefix), false, true)
}

/// Smallest key greater than every string starting with `prefix`.
///
/// Increments the last code point that has a successor, dropping the ones
/// after it. With no such code point (including the empty prefix) the bound
/// is the smallest key of the next type, which lies above all strings.
fn successor(prefix: &str) -> Value {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = next_char(last) {
            chars.push(next);
            return Value::String(chars.into_iter().collect());
        }
    }
    Value::Bytes(Vec::new())
}

fn next_char(c: char) -> Option<char> {
    match c as u32 {
        0xD7FF => Some('\u{E000}'),
        code => char::from_u32(code + 1),
    }
}

/// Per character, the lowest (or highest) of its case variants.
fn case_variant(text: &str, highest: bool) -> String {
    text.chars()
        .map(|c| {
            let pick = if highest {
                case_variants(c).max()
            } else {
                case_variants(c).min()
            };
            pick.unwrap_or(c)
        })
        .collect()
}
