//! Object store with index maintenance.
//!
//! Records are kept in primary key order. Each secondary index maps an index
//! key to the set of primary keys carrying it, so that scans return entries
//! in (index key, primary key) order.

use crate::adapter::CursorEntry;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use strata_core::schema::{IndexDescriptor, KeyResolution, TableSchema};
use strata_core::{Direction, Error, KeyRange, Operation, Record, Result, Value};

/// Outcome of a successful write.
#[derive(Clone, Debug)]
pub struct PutOutcome {
    /// Primary key written.
    pub key: Value,
    /// Record previously stored under the key.
    pub previous: Option<Record>,
    /// Key generator value before the write.
    pub generator: i64,
}

/// Secondary index storage.
#[derive(Clone, Debug)]
struct IndexStore {
    descriptor: IndexDescriptor,
    entries: BTreeMap<Value, BTreeSet<Value>>,
}

impl IndexStore {
    fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            entries: BTreeMap::new(),
        }
    }

    fn add(&mut self, key: Value, primary_key: Value) {
        self.entries.entry(key).or_default().insert(primary_key);
    }

    fn remove(&mut self, key: &Value, primary_key: &Value) {
        if let Some(keys) = self.entries.get_mut(key) {
            keys.remove(primary_key);
            if keys.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Returns true if a unique index already maps `key` to another record.
    fn conflicts(&self, key: &Value, primary_key: &Value) -> bool {
        self.descriptor.is_unique()
            && self
                .entries
                .get(key)
                .is_some_and(|keys| keys.iter().any(|k| k != primary_key))
    }

    fn count(&self, range: &KeyRange<Value>) -> usize {
        self.entries.range(range.bounds()).map(|(_, keys)| keys.len()).sum()
    }

    /// Returns the (index key, primary key) pair following `after`.
    fn next_position(
        &self,
        range: &KeyRange<Value>,
        direction: Direction,
        after: Option<(&Value, &Value)>,
    ) -> Option<(Value, Value)> {
        if let Some((key, primary_key)) = after {
            if let Some(primary_keys) = self.entries.get(key) {
                let rest = match direction {
                    Direction::Next => (Bound::Excluded(primary_key), Bound::Unbounded),
                    Direction::Prev => (Bound::Unbounded, Bound::Excluded(primary_key)),
                };
                if let Some(next) = step(primary_keys.range::<Value, _>(rest), direction) {
                    return Some((key.clone(), next.clone()));
                }
            }
        }
        let bounds = resume(range.bounds(), direction, after.map(|(key, _)| key));
        let (key, primary_keys) = step(self.entries.range::<Value, _>(bounds), direction)?;
        let primary_key = step(primary_keys.iter(), direction)?;
        Some((key.clone(), primary_key.clone()))
    }
}

/// Storage for a single table.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    schema: TableSchema,
    records: BTreeMap<Value, Record>,
    indexes: BTreeMap<String, IndexStore>,
    next_key: i64,
}

impl ObjectStore {
    /// Creates an empty store for the given table schema.
    pub fn new(schema: TableSchema) -> Self {
        let indexes = schema
            .indexes()
            .iter()
            .map(|idx| (idx.name().to_string(), IndexStore::new(idx.clone())))
            .collect();
        Self {
            schema,
            records: BTreeMap::new(),
            indexes,
            next_key: 1,
        }
    }

    /// Returns the table schema.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the next generated key.
    pub fn key_generator(&self) -> i64 {
        self.next_key
    }

    pub(crate) fn set_key_generator(&mut self, next: i64) {
        self.next_key = next;
    }

    /// Gets a record by primary key.
    pub fn get(&self, key: &Value) -> Option<&Record> {
        self.records.get(key)
    }

    /// Writes a record.
    ///
    /// All checks run before anything changes, so a failed write leaves the
    /// store untouched.
    pub fn put(&mut self, mut record: Record, explicit: Option<Value>, overwrite: bool) -> Result<PutOutcome> {
        let operation = if overwrite { Operation::Put } else { Operation::Add };
        let generator = self.next_key;

        let resolution = self
            .schema
            .resolve_primary_key(&record, explicit.as_ref(), operation)?;
        let generated = resolution == KeyResolution::Generate;
        let key = match resolution {
            KeyResolution::Explicit(key) | KeyResolution::Inline(key) => key,
            KeyResolution::Generate => {
                let key = Value::Int64(self.next_key);
                self.schema
                    .inject_primary_key(&mut record, key.clone())
                    .map_err(|e| e.during(operation))?;
                key
            }
        };

        if !overwrite && self.records.contains_key(&key) {
            return Err(Error::constraint(
                self.schema.name(),
                operation,
                Some(key),
                "key already exists in the object store",
            ));
        }

        for (name, index) in &self.indexes {
            for index_key in index.descriptor.extract_keys(&record) {
                if index.conflicts(&index_key, &key) {
                    return Err(Error::constraint(
                        self.schema.name(),
                        operation,
                        Some(key),
                        format!("unique index {} already contains {}", name, index_key),
                    ));
                }
            }
        }

        if generated {
            self.next_key += 1;
        } else if self.schema.primary_key().is_auto_increment() {
            self.advance_generator(&key);
        }

        let previous = self.remove_entry(&key);
        self.insert_entry(key.clone(), record);
        Ok(PutOutcome {
            key,
            previous,
            generator,
        })
    }

    /// Explicit numeric keys push the generator past themselves.
    fn advance_generator(&mut self, key: &Value) {
        let Some(n) = key.as_f64() else {
            return;
        };
        if n >= self.next_key as f64 {
            self.next_key = if n >= i64::MAX as f64 {
                i64::MAX
            } else {
                n.floor() as i64 + 1
            };
        }
    }

    /// Deletes a record, returning it if it existed.
    pub fn delete(&mut self, key: &Value) -> Option<Record> {
        self.remove_entry(key)
    }

    /// Removes every record, returning them.
    pub fn clear(&mut self) -> BTreeMap<Value, Record> {
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
        std::mem::take(&mut self.records)
    }

    /// Puts back the state of `key` without constraint checks.
    pub(crate) fn restore(&mut self, key: &Value, previous: Option<Record>) {
        self.remove_entry(key);
        if let Some(record) = previous {
            self.insert_entry(key.clone(), record);
        }
    }

    /// Puts back records removed by [`ObjectStore::clear`].
    pub(crate) fn restore_all(&mut self, records: BTreeMap<Value, Record>) {
        for (key, record) in records {
            self.restore(&key, Some(record));
        }
    }

    fn insert_entry(&mut self, key: Value, record: Record) {
        for index in self.indexes.values_mut() {
            for index_key in index.descriptor.extract_keys(&record) {
                index.add(index_key, key.clone());
            }
        }
        self.records.insert(key, record);
    }

    fn remove_entry(&mut self, key: &Value) -> Option<Record> {
        let record = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            for index_key in index.descriptor.extract_keys(&record) {
                index.remove(&index_key, key);
            }
        }
        Some(record)
    }

    /// Records in primary key order.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.records.values()
    }

    /// Returns the scan entry following `after`, an (index key, primary key)
    /// position, over the primary key or a secondary index. `None` when the
    /// range is exhausted.
    ///
    /// Each step resumes from the position, so writes made between two steps
    /// are seen by the next one.
    pub fn scan_next(
        &self,
        index: Option<&str>,
        range: &KeyRange<Value>,
        direction: Direction,
        after: Option<(&Value, &Value)>,
    ) -> Result<Option<CursorEntry>> {
        let index = index.map(|name| self.index(name)).transpose()?;
        if range.is_empty() {
            return Ok(None);
        }
        let position = match index {
            None => {
                let bounds = resume(range.bounds(), direction, after.map(|(_, pk)| pk));
                step(self.records.range::<Value, _>(bounds), direction)
                    .map(|(key, _)| (key.clone(), key.clone()))
            }
            Some(index) => index.next_position(range, direction, after),
        };
        Ok(position.and_then(|(key, primary_key)| {
            let record = self.records.get(&primary_key)?.clone();
            Some(CursorEntry {
                key,
                primary_key,
                record,
            })
        }))
    }

    /// Counts entries in a range of the primary key or a secondary index.
    pub fn count(&self, index: Option<&str>, range: &KeyRange<Value>) -> Result<usize> {
        if range.is_empty() {
            return Ok(0);
        }
        match index {
            None => Ok(self.records.range(range.bounds()).count()),
            Some(name) => Ok(self.index(name)?.count(range)),
        }
    }

    fn index(&self, name: &str) -> Result<&IndexStore> {
        self.indexes.get(name).ok_or_else(|| Error::IndexNotFound {
            table: self.schema.name().to_string(),
            index: name.to_string(),
        })
    }

    /// Builds a new index over the existing records.
    pub fn create_index(&mut self, descriptor: IndexDescriptor) -> Result<()> {
        let schema = self.schema.clone().with_index(descriptor.clone())?;
        let mut index = IndexStore::new(descriptor);
        for (key, record) in &self.records {
            for index_key in index.descriptor.extract_keys(record) {
                if index.conflicts(&index_key, key) {
                    return Err(Error::constraint(
                        self.schema.name(),
                        Operation::Migrate,
                        Some(key.clone()),
                        format!(
                            "cannot create unique index {}: duplicate value {}",
                            index.descriptor.name(),
                            index_key
                        ),
                    ));
                }
                index.add(index_key, key.clone());
            }
        }
        self.indexes.insert(index.descriptor.name().to_string(), index);
        self.schema = schema;
        Ok(())
    }

    /// Drops an index.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        self.indexes.remove(name).ok_or_else(|| Error::IndexNotFound {
            table: self.schema.name().to_string(),
            index: name.to_string(),
        })?;
        self.schema = self.schema.clone().without_index(name);
        Ok(())
    }

    /// Renames the table.
    pub fn rename(&mut self, name: &str) {
        self.schema = self.schema.clone().renamed(name);
    }
}

fn step<I: DoubleEndedIterator>(mut iter: I, direction: Direction) -> Option<I::Item> {
    match direction {
        Direction::Next => iter.next(),
        Direction::Prev => iter.next_back(),
    }
}

/// Narrows `bounds` to the part of a scan that follows `after`.
fn resume<'a>(
    bounds: (Bound<&'a Value>, Bound<&'a Value>),
    direction: Direction,
    after: Option<&'a Value>,
) -> (Bound<&'a Value>, Bound<&'a Value>) {
    match (after, direction) {
        (None, _) => bounds,
        (Some(key), Direction::Next) => (Bound::Excluded(key), bounds.1),
        (Some(key), Direction::Prev) => (bounds.0, Bound::Excluded(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(json: serde_json::Value) -> Record {
        Record::from_json(json).unwrap()
    }

    fn store(spec: &str) -> ObjectStore {
        ObjectStore::new(TableSchema::parse("t", spec).unwrap())
    }

    fn scan(store: &ObjectStore, index: Option<&str>, range: &KeyRange<Value>, direction: Direction) -> Vec<CursorEntry> {
        let mut entries: Vec<CursorEntry> = Vec::new();
        loop {
            let after = entries.last().map(|e| (&e.key, &e.primary_key));
            match store.scan_next(index, range, direction, after).unwrap() {
                Some(entry) => entries.push(entry),
                None => return entries,
            }
        }
    }

    #[test]
    fn test_put_generates_keys() {
        let mut store = store("++id,name");
        let a = store.put(record(json!({"name": "a"})), None, true).unwrap();
        let b = store.put(record(json!({"name": "b"})), None, true).unwrap();
        assert_eq!(a.key, Value::Int64(1));
        assert_eq!(b.key, Value::Int64(2));
        assert_eq!(store.get(&Value::Int64(2)).unwrap().get("id"), Some(&Value::Int64(2)));
    }

    #[test]
    fn test_generator_follows_explicit_keys() {
        let mut store = store("++id");
        store.put(record(json!({"id": 10})), None, true).unwrap();
        let next = store.put(record(json!({})), None, true).unwrap();
        assert_eq!(next.key, Value::Int64(11));
        store.put(record(json!({"id": 3})), None, true).unwrap();
        assert_eq!(store.key_generator(), 12);
    }

    #[test]
    fn test_add_rejects_existing_key() {
        let mut store = store("id");
        store.put(record(json!({"id": 1})), None, false).unwrap();
        let err = store.put(record(json!({"id": 1})), None, false).unwrap_err();
        assert!(matches!(err, Error::Constraint { operation: Operation::Add, .. }));
        assert!(store.put(record(json!({"id": 1, "x": 2})), None, true).is_ok());
    }

    #[test]
    fn test_unique_index() {
        let mut store = store("++id,&email");
        store.put(record(json!({"email": "a@x"})), None, true).unwrap();
        let err = store.put(record(json!({"email": "a@x"})), None, true).unwrap_err();
        assert!(matches!(err, Error::Constraint { .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.key_generator(), 2);

        // Rewriting the same record keeps its own entry.
        store.put(record(json!({"id": 1, "email": "a@x", "n": 1})), None, true).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_index_scan_order() {
        let mut store = store("++id,done");
        for done in [1, 0, 1, 0] {
            store.put(record(json!({ "done": done })), None, true).unwrap();
        }
        let range = KeyRange::lower_bound(Value::Int64(0), true);
        let keys: Vec<Value> = scan(&store, Some("done"), &range, Direction::Next)
            .into_iter()
            .map(|e| e.primary_key)
            .collect();
        assert_eq!(keys, vec![Value::Int64(1), Value::Int64(3)]);

        let reversed: Vec<Value> = scan(&store, Some("done"), &KeyRange::all(), Direction::Prev)
            .into_iter()
            .map(|e| e.primary_key)
            .collect();
        assert_eq!(
            reversed,
            vec![Value::Int64(3), Value::Int64(1), Value::Int64(4), Value::Int64(2)]
        );
        assert_eq!(store.count(Some("done"), &range).unwrap(), 2);
    }

    #[test]
    fn test_scan_resumes_after_writes() {
        let mut store = store("++id,n");
        for n in [1, 2, 3, 4] {
            store.put(record(json!({ "n": n })), None, true).unwrap();
        }
        let range = KeyRange::all();
        let first = store.scan_next(Some("n"), &range, Direction::Next, None).unwrap().unwrap();
        assert_eq!(first.primary_key, Value::Int64(1));

        store.delete(&Value::Int64(2));
        store.put(record(json!({"id": 3, "n": 30})), None, true).unwrap();
        let after = Some((&first.key, &first.primary_key));
        let next = store.scan_next(Some("n"), &range, Direction::Next, after).unwrap().unwrap();
        assert_eq!(next.primary_key, Value::Int64(4));

        let last = store.scan_next(None, &range, Direction::Prev, None).unwrap().unwrap();
        let after = Some((&last.key, &last.primary_key));
        let before = store.scan_next(None, &range, Direction::Prev, after).unwrap().unwrap();
        assert_eq!(before.record.get("n"), Some(&Value::Int64(30)));

        let err = store.scan_next(Some("missing"), &range, Direction::Next, None).unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
    }

    #[test]
    fn test_multi_entry_scan() {
        let mut store = store("++id,*tags");
        store.put(record(json!({"tags": ["a", "b"]})), None, true).unwrap();
        store.put(record(json!({"tags": ["b"]})), None, true).unwrap();
        let hits = scan(&store, Some("tags"), &KeyRange::only(Value::from("b")), Direction::Next);
        assert_eq!(hits.len(), 2);
        assert_eq!(store.count(Some("tags"), &KeyRange::all()).unwrap(), 3);
    }

    #[test]
    fn test_empty_range_does_not_panic() {
        let mut store = store("++id,n");
        store.put(record(json!({"n": 1})), None, true).unwrap();
        let range = KeyRange::bound(Value::Int64(5), Value::Int64(1), false, false);
        assert!(scan(&store, Some("n"), &range, Direction::Next).is_empty());
        assert_eq!(store.count(None, &range).unwrap(), 0);
    }

    #[test]
    fn test_create_index_populates_and_checks() {
        let mut store = store("++id");
        store.put(record(json!({"email": "a"})), None, true).unwrap();
        store.put(record(json!({"email": "a"})), None, true).unwrap();

        let plain = IndexDescriptor::new(strata_core::schema::KeyPath::parse("email").unwrap());
        store.create_index(plain.clone()).unwrap();
        assert_eq!(store.count(Some("email"), &KeyRange::all()).unwrap(), 2);
        assert!(store.schema().index("email").is_some());

        store.drop_index("email").unwrap();
        assert!(store.create_index(plain.unique(true)).is_err());
        assert!(store.schema().index("email").is_none());
    }

    #[test]
    fn test_restore() {
        let mut store = store("++id,name");
        let out = store.put(record(json!({"name": "a"})), None, true).unwrap();
        store.restore(&out.key, out.previous);
        assert!(store.is_empty());
        assert!(scan(&store, Some("name"), &KeyRange::all(), Direction::Next).is_empty());
    }
}
