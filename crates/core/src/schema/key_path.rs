//! Key paths locating key values inside records.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::Value;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

/// A key path: one dotted path, or an ordered list of them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyPath {
    /// A single dotted path such as `address.city`.
    Single(String),
    /// A compound path such as `[first+last]`. The key is an array.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Parses `path` or `[a+b]` notation.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(inner) = text.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(|| {
                Error::invalid_schema(format!("unterminated compound key path: {}", text))
            })?;
            let parts: Vec<String> = inner.split('+').map(|p| p.trim().to_string()).collect();
            for part in &parts {
                check_path(part)?;
            }
            return Ok(KeyPath::Compound(parts));
        }
        check_path(text)?;
        Ok(KeyPath::Single(text.to_string()))
    }

    /// Returns true for compound paths.
    pub fn is_compound(&self) -> bool {
        matches!(self, KeyPath::Compound(_))
    }

    /// Extracts the key at this path. Returns None unless every component is
    /// present and a valid key.
    pub fn extract(&self, record: &Record) -> Option<Value> {
        match self {
            KeyPath::Single(path) => record.get_path(path).filter(|v| v.is_valid_key()).cloned(),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|p| record.get_path(p).filter(|v| v.is_valid_key()).cloned())
                .collect::<Option<Vec<Value>>>()
                .map(Value::Array),
        }
    }

    /// Returns the top-level paths this key path reads.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            KeyPath::Single(path) => alloc::vec![path.as_str()],
            KeyPath::Compound(paths) => paths.iter().map(String::as_str).collect(),
        }
    }

    /// Returns true if writing `path` would change this key path's value.
    pub fn touches(&self, path: &str) -> bool {
        self.paths().iter().any(|own| overlaps(own, path))
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    let prefix = |short: &str, long: &str| {
        long == short || (long.starts_with(short) && long[short.len()..].starts_with('.'))
    };
    prefix(a, b) || prefix(b, a)
}

/// Validates a dotted path: non-empty identifier segments.
fn check_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::invalid_schema("key path cannot be empty"));
    }
    for segment in path.split('.') {
        check_naming_rules(segment)
            .map_err(|_| Error::invalid_schema(format!("invalid key path: {}", path)))?;
    }
    Ok(())
}

/// Validates a name follows naming rules.
pub(crate) fn check_naming_rules(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = chars
        .next()
        .ok_or_else(|| Error::invalid_schema("name cannot be empty"))?;
    if !first.is_alphabetic() && first != '_' && first != '$' {
        return Err(Error::invalid_schema(format!(
            "name must start with a letter, underscore or dollar sign: {}",
            name
        )));
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return Err(Error::invalid_schema(format!(
            "name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => f.write_str(path),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join("+")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse() {
        assert_eq!(KeyPath::parse("id").unwrap(), KeyPath::Single("id".into()));
        assert_eq!(
            KeyPath::parse("[first + last]").unwrap(),
            KeyPath::Compound(alloc::vec!["first".into(), "last".into()])
        );
        assert!(KeyPath::parse("[a+b").is_err());
        assert!(KeyPath::parse("a..b").is_err());
        assert!(KeyPath::parse("a b").is_err());
    }

    #[test]
    fn test_extract_compound() {
        let record = Record::from_json(json!({"first": "Ada", "last": "Lovelace", "flag": true})).unwrap();
        let path = KeyPath::parse("[first+last]").unwrap();
        assert_eq!(
            path.extract(&record),
            Some(Value::Array(alloc::vec!["Ada".into(), "Lovelace".into()]))
        );
        assert_eq!(KeyPath::parse("[first+age]").unwrap().extract(&record), None);
        assert_eq!(KeyPath::parse("flag").unwrap().extract(&record), None);
    }

    #[test]
    fn test_touches() {
        let path = KeyPath::parse("address.city").unwrap();
        assert!(path.touches("address"));
        assert!(path.touches("address.city"));
        assert!(!path.touches("address.zip"));
        assert!(!path.touches("addressee"));
    }
}
