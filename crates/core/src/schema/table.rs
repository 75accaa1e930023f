//! Table schemas and the column specification parser.
//!
//! A column specification is a comma-separated list. The first entry is the
//! primary key, the rest are secondary indexes:
//!
//! | Entry | Meaning |
//! |---|---|
//! | `++id` | inbound primary key `id`, generated when absent |
//! | `++` | out-of-line generated primary key |
//! | (empty) | out-of-line primary key supplied by the caller |
//! | `&email` | unique index |
//! | `*tags` | multi-entry index |
//! | `[first+last]` | compound index |

use super::index::{IndexDescriptor, OUTBOUND_KEY_NAME};
use super::key_path::{check_naming_rules, KeyPath};
use crate::error::{Error, Operation, Result};
use crate::record::Record;
use crate::value::Value;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// How the primary key of a record being written is obtained.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyResolution {
    /// Supplied by the caller for an out-of-line table.
    Explicit(Value),
    /// Read from the record's key path.
    Inline(Value),
    /// To be generated by the store's key generator.
    Generate,
}

/// Schema of one table.
///
/// Equality ignores the declaration order of secondary indexes.
#[derive(Clone, Debug)]
pub struct TableSchema {
    name: String,
    primary_key: IndexDescriptor,
    indexes: Vec<IndexDescriptor>,
}

impl TableSchema {
    /// Creates a table schema from parts.
    pub fn new(
        name: impl Into<String>,
        primary_key: IndexDescriptor,
        indexes: Vec<IndexDescriptor>,
    ) -> Result<Self> {
        let name = name.into();
        check_naming_rules(&name)?;
        let mut seen: Vec<&str> = alloc::vec![primary_key.name()];
        for idx in &indexes {
            if seen.contains(&idx.name()) {
                return Err(Error::invalid_schema(format!(
                    "duplicate index {} on table {}",
                    idx.name(),
                    name
                )));
            }
            seen.push(idx.name());
        }
        Ok(Self {
            name,
            primary_key,
            indexes,
        })
    }

    /// Parses a column specification such as `++id,&email,*tags`.
    pub fn parse(name: impl Into<String>, spec: &str) -> Result<Self> {
        let name = name.into();
        let mut entries = spec.split(',').map(str::trim);
        let primary_key = parse_primary(&name, entries.next().unwrap_or(""))?;
        let indexes = entries
            .map(|entry| parse_index(&name, entry))
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, primary_key, indexes)
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the primary key descriptor.
    #[inline]
    pub fn primary_key(&self) -> &IndexDescriptor {
        &self.primary_key
    }

    /// Returns the secondary indexes in declaration order.
    #[inline]
    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    /// Gets a secondary index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|idx| idx.name() == name)
    }

    /// Returns true if `column` names the primary key, by key path or `:id`.
    pub fn is_primary_key(&self, column: &str) -> bool {
        column == OUTBOUND_KEY_NAME || column == self.primary_key.name()
    }

    /// Returns a copy of this schema under another table name.
    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Adds a secondary index.
    pub fn with_index(mut self, index: IndexDescriptor) -> Result<Self> {
        if self.is_primary_key(index.name()) || self.index(index.name()).is_some() {
            return Err(Error::invalid_schema(format!(
                "index {} already exists on table {}",
                index.name(),
                self.name
            )));
        }
        self.indexes.push(index);
        Ok(self)
    }

    /// Removes a secondary index.
    pub fn without_index(mut self, name: &str) -> Self {
        self.indexes.retain(|idx| idx.name() != name);
        self
    }

    /// Renders the schema back to column specification syntax.
    pub fn to_spec(&self) -> String {
        let pk = &self.primary_key;
        let mut parts = Vec::with_capacity(self.indexes.len() + 1);
        parts.push(match (pk.is_auto_increment(), pk.key_path()) {
            (true, Some(_)) => format!("++{}", pk.name()),
            (true, None) => "++".to_string(),
            (false, Some(_)) => pk.name().to_string(),
            (false, None) => String::new(),
        });
        parts.extend(self.indexes.iter().map(|idx| idx.to_string()));
        parts.join(",")
    }

    /// Decides how the primary key of `record` is obtained.
    pub fn resolve_primary_key(
        &self,
        record: &Record,
        explicit: Option<&Value>,
        operation: Operation,
    ) -> Result<KeyResolution> {
        let pk = &self.primary_key;
        let fail = |key: Option<Value>, message: String| {
            Err(Error::constraint(&self.name, operation, key, message))
        };

        match pk.key_path() {
            Some(path) => {
                if let Some(key) = explicit {
                    return fail(
                        Some(key.clone()),
                        format!("table uses inline keys ({}); an explicit key cannot be supplied", path),
                    );
                }
                if let Some(key) = path.extract(record) {
                    return Ok(KeyResolution::Inline(key));
                }
                let present = path
                    .paths()
                    .iter()
                    .any(|p| record.get_path(p).is_some_and(|v| !v.is_null()));
                if present {
                    fail(None, format!("value at key path {} is not a valid key", path))
                } else if pk.is_auto_increment() {
                    Ok(KeyResolution::Generate)
                } else {
                    fail(None, format!("record has no value at key path {}", path))
                }
            }
            None => match explicit {
                Some(key) if key.is_valid_key() => Ok(KeyResolution::Explicit(key.clone())),
                Some(key) => fail(Some(key.clone()), "supplied key is not a valid key".to_string()),
                None if pk.is_auto_increment() => Ok(KeyResolution::Generate),
                None => fail(
                    None,
                    "table uses out-of-line keys and no key was supplied".to_string(),
                ),
            },
        }
    }

    /// Writes a generated key into an inline key path.
    pub fn inject_primary_key(&self, record: &mut Record, key: Value) -> Result<()> {
        match self.primary_key.key_path() {
            Some(KeyPath::Single(path)) => {
                if record.set_path(path, key.clone()) {
                    Ok(())
                } else {
                    Err(Error::constraint(
                        &self.name,
                        Operation::Put,
                        Some(key),
                        format!("cannot assign generated key at key path {}", path),
                    ))
                }
            }
            _ => Ok(()),
        }
    }
}

impl PartialEq for TableSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.primary_key == other.primary_key
            && self.indexes.len() == other.indexes.len()
            && self
                .indexes
                .iter()
                .all(|idx| other.index(idx.name()) == Some(idx))
    }
}

impl Eq for TableSchema {}

fn parse_primary(table: &str, entry: &str) -> Result<IndexDescriptor> {
    let (auto_increment, rest) = match entry.strip_prefix("++") {
        Some(rest) => (true, rest.trim()),
        None => (false, entry),
    };
    let rest = rest.strip_prefix('&').unwrap_or(rest);
    if rest.starts_with('*') {
        return Err(Error::invalid_schema(format!(
            "primary key of table {} cannot be multi-entry",
            table
        )));
    }
    if rest.is_empty() {
        return Ok(IndexDescriptor::primary(None, auto_increment));
    }
    let key_path = KeyPath::parse(rest)?;
    if auto_increment && key_path.is_compound() {
        return Err(Error::invalid_schema(format!(
            "compound primary key of table {} cannot be auto-incremented",
            table
        )));
    }
    Ok(IndexDescriptor::primary(Some(key_path), auto_increment))
}

fn parse_index(table: &str, entry: &str) -> Result<IndexDescriptor> {
    if entry.starts_with("++") {
        return Err(Error::invalid_schema(format!(
            "only the primary key of table {} can be auto-incremented: {}",
            table, entry
        )));
    }
    let mut unique = false;
    let mut multi_entry = false;
    let mut rest = entry;
    loop {
        if let Some(r) = rest.strip_prefix('&').filter(|_| !unique) {
            unique = true;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('*').filter(|_| !multi_entry) {
            multi_entry = true;
            rest = r;
        } else {
            break;
        }
    }
    if rest.is_empty() {
        return Err(Error::invalid_schema(format!(
            "empty index entry on table {}",
            table
        )));
    }
    let key_path = KeyPath::parse(rest)?;
    if multi_entry && key_path.is_compound() {
        return Err(Error::invalid_schema(format!(
            "compound index {} on table {} cannot be multi-entry",
            key_path, table
        )));
    }
    Ok(IndexDescriptor::new(key_path)
        .unique(unique)
        .multi_entry(multi_entry))
}
