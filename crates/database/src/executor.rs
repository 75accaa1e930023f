//! Scan plan execution.

use crate::transaction::Transaction;
use hashbrown::HashSet;
use std::rc::Rc;
use strata_core::{Record, Result, Value};
use strata_query::{ScanPlan, ScanSource};
use strata_storage::{CursorEntry, StorageAdapter};
use tracing::debug;

/// A caller-supplied record filter, evaluated after the scan.
pub type RecordFilter = Rc<dyn Fn(&Record) -> bool>;

/// Runs `plan` and returns the matching entries in scan order.
///
/// Scanning stops as soon as the limit is reached.
pub(crate) async fn execute<S: StorageAdapter>(
    tx: &Transaction<S>,
    plan: &ScanPlan,
    filters: &[RecordFilter],
) -> Result<Vec<CursorEntry>> {
    let mut entries = Vec::new();
    if plan.is_empty() {
        return Ok(entries);
    }
    if plan.source == ScanSource::FullTable {
        debug!(table = %plan.table, "no index covers the predicate, scanning the full table");
    }

    let mut seen: HashSet<Value> = HashSet::new();
    let mut skipped = 0;
    for range in plan.ordered_ranges() {
        let cursor = tx
            .scan(&plan.table, plan.index_name(), range, plan.direction)
            .await?;
        for entry in cursor {
            if let Some(residual) = &plan.residual {
                if !residual.matches(&entry.key, &entry.record) {
                    continue;
                }
            }
            if plan.dedupe && !seen.insert(entry.primary_key.clone()) {
                continue;
            }
            if !filters.iter().all(|filter| filter(&entry.record)) {
                continue;
            }
            if skipped < plan.offset {
                skipped += 1;
                continue;
            }
            entries.push(entry);
            if plan.limit.is_some_and(|limit| entries.len() >= limit) {
                return Ok(entries);
            }
        }
    }
    Ok(entries)
}

/// Counts the matches of `plan`, asking the substrate directly when its
/// range count is exact.
pub(crate) async fn count<S: StorageAdapter>(
    tx: &Transaction<S>,
    plan: &ScanPlan,
    filters: &[RecordFilter],
) -> Result<usize> {
    if !(plan.can_count_natively() && filters.is_empty()) {
        return Ok(execute(tx, plan, filters).await?.len());
    }
    let Some(range) = plan.ranges.first() else {
        return Ok(0);
    };
    let total = tx.count(&plan.table, plan.index_name(), range).await?;
    let remaining = total.saturating_sub(plan.offset);
    Ok(plan.limit.map_or(remaining, |limit| remaining.min(limit)))
}
