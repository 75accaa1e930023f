//! Index descriptors for Strata table schemas.

use super::key_path::KeyPath;
use crate::record::Record;
use crate::value::Value;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// Name used for the primary key of tables with out-of-line keys.
pub const OUTBOUND_KEY_NAME: &str = ":id";

/// An index (or primary key) declared on a table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexDescriptor {
    /// Index name. For secondary indexes this is the key path text.
    name: String,
    /// Key path, or None for an out-of-line primary key.
    key_path: Option<KeyPath>,
    /// Whether this index enforces uniqueness.
    unique: bool,
    /// Whether array values produce one index entry per element.
    multi_entry: bool,
    /// Whether keys are generated (only valid for the primary key).
    auto_increment: bool,
}

impl IndexDescriptor {
    /// Creates a secondary index over `key_path`.
    pub fn new(key_path: KeyPath) -> Self {
        Self {
            name: key_path.to_string(),
            key_path: Some(key_path),
            unique: false,
            multi_entry: false,
            auto_increment: false,
        }
    }

    /// Creates a primary key descriptor. `None` means out-of-line keys.
    pub fn primary(key_path: Option<KeyPath>, auto_increment: bool) -> Self {
        let name = match &key_path {
            Some(path) => path.to_string(),
            None => OUTBOUND_KEY_NAME.to_string(),
        };
        Self {
            name,
            key_path,
            unique: true,
            multi_entry: false,
            auto_increment,
        }
    }

    /// Sets whether this index is unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets whether this index is multi-entry.
    pub fn multi_entry(mut self, multi_entry: bool) -> Self {
        self.multi_entry = multi_entry;
        self
    }

    /// Returns the index name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key path.
    #[inline]
    pub fn key_path(&self) -> Option<&KeyPath> {
        self.key_path.as_ref()
    }

    /// Returns whether this index is unique.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns whether this index is multi-entry.
    #[inline]
    pub fn is_multi_entry(&self) -> bool {
        self.multi_entry
    }

    /// Returns whether keys are generated.
    #[inline]
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Returns whether keys are stored outside the record.
    #[inline]
    pub fn is_outbound(&self) -> bool {
        self.key_path.is_none()
    }

    /// Computes the index keys a record contributes.
    ///
    /// A record missing the key path, or holding a value that is not a valid
    /// key, contributes nothing. Multi-entry indexes contribute each distinct
    /// valid element of an array value.
    pub fn extract_keys(&self, record: &Record) -> Vec<Value> {
        let Some(path) = &self.key_path else {
            return Vec::new();
        };
        match path {
            KeyPath::Single(p) if self.multi_entry => match record.get_path(p) {
                Some(Value::Array(items)) => {
                    let mut keys: Vec<Value> =
                        items.iter().filter(|v| v.is_valid_key()).cloned().collect();
                    keys.sort();
                    keys.dedup();
                    keys
                }
                Some(v) if v.is_valid_key() => alloc::vec![v.clone()],
                _ => Vec::new(),
            },
            _ => path.extract(record).into_iter().collect(),
        }
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.auto_increment {
            f.write_str("++")?;
        } else if self.unique && self.name != OUTBOUND_KEY_NAME {
            f.write_str("&")?;
        }
        if self.multi_entry {
            f.write_str("*")?;
        }
        if self.key_path.is_some() {
            f.write_str(&self.name)?;
        }
        Ok(())
    }
}
