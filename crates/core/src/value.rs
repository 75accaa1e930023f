//! Value type definitions for Strata.
//!
//! This module defines the `Value` enum which represents any field value a
//! record can carry, and the total order keys are sorted by.

use crate::record::Record;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A value stored in a record field.
///
/// Keys are the subset of values accepted by [`Value::is_valid_key`]:
/// numbers (except NaN), dates, strings, bytes, and arrays of valid keys.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    /// Binary data
    Bytes(Vec<u8>),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Nested record
    Object(Record),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value can be used as a primary or index key.
    pub fn is_valid_key(&self) -> bool {
        match self {
            Value::Int64(_) | Value::DateTime(_) | Value::String(_) | Value::Bytes(_) => true,
            Value::Float64(f) => !f.is_nan(),
            Value::Array(items) => items.iter().all(Value::is_valid_key),
            Value::Null | Value::Boolean(_) | Value::Object(_) => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the numeric value of an Int64 or Float64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the elements if this is an Array, None otherwise.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Returns the nested record if this is an Object, None otherwise.
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a mutable nested record if this is an Object, None otherwise.
    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a short name for the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int64(_) | Value::Float64(_) => "number",
            Value::String(_) => "string",
            Value::DateTime(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Rank of the value's type in key order. Numbers share one rank so
    /// that Int64 and Float64 compare numerically; non-key types sort first.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int64(_) | Value::Float64(_) => 2,
            Value::DateTime(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::Array(_) => 6,
            Value::Object(_) => 7,
        }
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts above every other number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Compares an integer with a float by exact value.
fn compare_int_f64(a: i64, b: f64) -> Ordering {
    // 2^63, the first float above every i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if b.is_nan() || b >= LIMIT {
        return Ordering::Less;
    }
    if b < -LIMIT {
        return Ordering::Greater;
    }
    // In range, the cast truncates toward zero without loss.
    let whole = b as i64;
    a.cmp(&whole).then_with(|| compare_f64(whole as f64, b))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            // Integers and floats share one number line.
            (Value::Int64(a), Value::Float64(b)) => compare_int_f64(*a, *b),
            (Value::Float64(a), Value::Int64(b)) => compare_int_f64(*b, *a).reverse(),
            (Value::Float64(a), Value::Float64(b)) => compare_f64(*a, *b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            // Different types: order by type rank
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Int64(i) => hash_number(*i as f64, state),
            Value::Float64(f) => hash_number(*f, state),
            Value::String(s) => s.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Object(record) => record.hash(state),
        }
    }
}

fn hash_number<H: Hasher>(f: f64, state: &mut H) {
    // Equal numbers must hash alike: fold -0.0 and every NaN payload
    let normalized = if f == 0.0 {
        0.0
    } else if f.is_nan() {
        f64::NAN
    } else {
        f
    };
    normalized.to_bits().hash(state);
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(ms) => write!(f, "Date({})", ms),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Object(record) => write!(f, "{}", record),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::String(s) => serializer.serialize_str(s),
            Value::DateTime(ms) => serializer.serialize_i64(*ms),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => items.serialize(serializer),
            Value::Object(record) => record.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int64(i),
                None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(Record::from_json_map(map)),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Int64(i) | Value::DateTime(i) => serde_json::Value::Number(i.into()),
            Value::Float64(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::Bytes(b) => serde_json::Value::Array(
                b.into_iter()
                    .map(|byte| serde_json::Value::Number(byte.into()))
                    .collect(),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(record) => serde_json::Value::from(record),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Object(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeSet;
    use alloc::vec;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Int64(100).as_i64(), Some(100));
        assert_eq!(Value::Int64(2).as_f64(), Some(2.0));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::DateTime(1234567890).as_datetime(), Some(1234567890));
        assert_eq!(Value::Bytes(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_key_type_order() {
        let ordered = vec![
            Value::Null,
            Value::Boolean(true),
            Value::Int64(-5),
            Value::Float64(1.5),
            Value::Int64(2),
            Value::DateTime(0),
            Value::String("".into()),
            Value::String("a".into()),
            Value::Bytes(vec![]),
            Value::Array(vec![Value::Int64(1)]),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_numeric_equality_across_types() {
        assert_eq!(Value::Int64(3), Value::Float64(3.0));
        assert!(Value::Int64(3) < Value::Float64(3.5));

        let mut set = BTreeSet::new();
        set.insert(Value::Int64(3));
        assert!(set.contains(&Value::Float64(3.0)));
    }

    #[test]
    fn test_large_integers_compare_exactly_with_floats() {
        let two_53 = 1i64 << 53;
        let (a, f, b) = (Value::Int64(two_53), Value::Float64(two_53 as f64), Value::Int64(two_53 + 1));
        assert_eq!(a, f);
        assert!(f < b);
        assert!(a < b);

        assert!(Value::Int64(i64::MAX) < Value::Float64(9.3e18));
        assert!(Value::Int64(i64::MIN) == Value::Float64(-9_223_372_036_854_775_808.0));
        assert!(Value::Int64(i64::MIN) > Value::Float64(f64::NEG_INFINITY));
        assert!(Value::Int64(-1) < Value::Float64(-0.5));
        assert!(Value::Int64(0) > Value::Float64(-0.5));
        assert!(Value::Float64(2.5) > Value::Int64(2));
        assert!(Value::Int64(i64::MAX) < Value::Float64(f64::NAN));

        let set: BTreeSet<Value> = [b.clone(), f, a, Value::Float64(two_53 as f64 + 2.0)].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().nth(1), Some(&b));
    }

    #[test]
    fn test_nan_handling() {
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
        assert!(Value::Float64(f64::NAN) > Value::Float64(f64::INFINITY));
        assert!(!Value::Float64(f64::NAN).is_valid_key());
    }

    #[test]
    fn test_valid_keys() {
        assert!(Value::Int64(1).is_valid_key());
        assert!(Value::String("x".into()).is_valid_key());
        assert!(Value::Array(vec![Value::Int64(1), Value::String("a".into())]).is_valid_key());
        assert!(!Value::Null.is_valid_key());
        assert!(!Value::Boolean(true).is_valid_key());
        assert!(!Value::Array(vec![Value::Boolean(false)]).is_valid_key());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"id": 1, "tags": ["a", "b"], "score": 2.5, "done": null});
        let value = Value::from(json.clone());
        let record = value.as_record().unwrap();
        assert_eq!(record.get("id"), Some(&Value::Int64(1)));
        assert_eq!(record.get("score"), Some(&Value::Float64(2.5)));
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn test_value_from_impls() {
        let v: Value = 42i32.into();
        assert_eq!(v.as_i64(), Some(42));

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());
    }
}
