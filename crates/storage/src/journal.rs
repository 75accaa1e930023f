//! Journal for rolling back the writes of a transaction.

use crate::object_store::ObjectStore;
use std::collections::BTreeMap;
use strata_core::{Record, Value};

/// One undoable write, holding what rollback needs to restore.
#[derive(Clone, Debug)]
pub enum JournalEntry {
    /// A record was written.
    Put {
        table: String,
        key: Value,
        previous: Option<Record>,
        generator: i64,
    },
    /// A record was deleted.
    Delete {
        table: String,
        key: Value,
        record: Record,
    },
    /// A table was cleared.
    Clear {
        table: String,
        records: BTreeMap<Value, Record>,
    },
}

impl JournalEntry {
    pub fn table(&self) -> &str {
        match self {
            JournalEntry::Put { table, .. } => table,
            JournalEntry::Delete { table, .. } => table,
            JournalEntry::Clear { table, .. } => table,
        }
    }
}

/// Ordered change log of one transaction.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write.
    pub fn record_put(&mut self, table: &str, key: Value, previous: Option<Record>, generator: i64) {
        self.entries.push(JournalEntry::Put {
            table: table.into(),
            key,
            previous,
            generator,
        });
    }

    /// Records a deletion.
    pub fn record_delete(&mut self, table: &str, key: Value, record: Record) {
        self.entries.push(JournalEntry::Delete {
            table: table.into(),
            key,
            record,
        });
    }

    /// Records a clear.
    pub fn record_clear(&mut self, table: &str, records: BTreeMap<Value, Record>) {
        self.entries.push(JournalEntry::Clear {
            table: table.into(),
            records,
        });
    }

    /// Returns the entries in the order they were recorded.
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commits the journal, returning its entries.
    pub fn commit(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Undoes every entry in reverse order.
    pub fn rollback(&mut self, stores: &mut BTreeMap<String, ObjectStore>) {
        for entry in self.entries.drain(..).rev() {
            let Some(store) = stores.get_mut(entry.table()) else {
                continue;
            };
            match entry {
                JournalEntry::Put {
                    key,
                    previous,
                    generator,
                    ..
                } => {
                    store.restore(&key, previous);
                    store.set_key_generator(generator);
                }
                JournalEntry::Delete { key, record, .. } => store.restore(&key, Some(record)),
                JournalEntry::Clear { records, .. } => store.restore_all(records),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::schema::TableSchema;

    fn stores() -> BTreeMap<String, ObjectStore> {
        let mut stores = BTreeMap::new();
        stores.insert(
            "t".to_string(),
            ObjectStore::new(TableSchema::parse("t", "++id,name").unwrap()),
        );
        stores
    }

    fn record(name: &str) -> Record {
        Record::from_json(json!({ "name": name })).unwrap()
    }

    #[test]
    fn test_rollback_in_reverse() {
        let mut stores = stores();
        let mut journal = Journal::new();
        let store = stores.get_mut("t").unwrap();

        let first = store.put(record("a"), None, true).unwrap();
        journal.record_put("t", first.key.clone(), first.previous, first.generator);

        let mut updated = store.get(&first.key).unwrap().clone();
        updated.insert("name", "b");
        let second = store.put(updated, None, true).unwrap();
        journal.record_put("t", second.key.clone(), second.previous, second.generator);

        let removed = store.delete(&first.key).unwrap();
        journal.record_delete("t", first.key.clone(), removed);
        assert_eq!(journal.len(), 3);

        journal.rollback(&mut stores);
        let store = &stores["t"];
        assert!(store.is_empty());
        assert_eq!(store.key_generator(), 1);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_rollback_clear() {
        let mut stores = stores();
        let mut journal = Journal::new();
        let store = stores.get_mut("t").unwrap();
        store.put(record("a"), None, true).unwrap();
        store.put(record("b"), None, true).unwrap();

        let records = store.clear();
        journal.record_clear("t", records);
        journal.rollback(&mut stores);
        assert_eq!(stores["t"].len(), 2);
    }

    #[test]
    fn test_commit_takes_entries() {
        let mut journal = Journal::new();
        journal.record_delete("t", Value::Int64(1), record("a"));
        let entries = journal.commit();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].table(), "t");
        assert!(journal.is_empty());
    }
}
