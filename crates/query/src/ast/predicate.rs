//! Predicate definitions for query filtering.

use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{KeyRange, Value};

/// A predicate over the key values of one column.
///
/// Only valid keys can match: a record whose column holds `null`, a boolean
/// or an object never matches, the same way such a record is absent from an
/// index over that column.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Key equals the value.
    Equals(Value),
    /// String key equals the value, ignoring case.
    EqualsIgnoreCase(String),
    /// Key lies inside the range.
    Range(KeyRange<Value>),
    /// String key starts with the prefix.
    StartsWith(String),
    /// String key starts with the prefix, ignoring case.
    StartsWithIgnoreCase(String),
    /// Key equals one of the values.
    AnyOf(Vec<Value>),
}

impl Predicate {
    pub fn equals(value: impl Into<Value>) -> Self {
        Predicate::Equals(value.into())
    }

    pub fn equals_ignore_case(value: impl Into<String>) -> Self {
        Predicate::EqualsIgnoreCase(value.into())
    }

    pub fn above(value: impl Into<Value>) -> Self {
        Predicate::Range(KeyRange::lower_bound(value.into(), true))
    }

    pub fn above_or_equal(value: impl Into<Value>) -> Self {
        Predicate::Range(KeyRange::lower_bound(value.into(), false))
    }

    pub fn below(value: impl Into<Value>) -> Self {
        Predicate::Range(KeyRange::upper_bound(value.into(), true))
    }

    pub fn below_or_equal(value: impl Into<Value>) -> Self {
        Predicate::Range(KeyRange::upper_bound(value.into(), false))
    }

    /// Keys between `lower` and `upper`, each bound included when its flag
    /// is set.
    pub fn between(
        lower: impl Into<Value>,
        upper: impl Into<Value>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        Predicate::Range(KeyRange::bound(
            lower.into(),
            upper.into(),
            !include_lower,
            !include_upper,
        ))
    }

    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Predicate::StartsWith(prefix.into())
    }

    pub fn starts_with_ignore_case(prefix: impl Into<String>) -> Self {
        Predicate::StartsWithIgnoreCase(prefix.into())
    }

    pub fn any_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::AnyOf(values.into_iter().map(Into::into).collect())
    }

    /// Returns the name of the predicate as written in a query chain.
    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Equals(_) => "equals",
            Predicate::EqualsIgnoreCase(_) => "equalsIgnoreCase",
            Predicate::Range(KeyRange::LowerBound { exclusive: true, .. }) => "above",
            Predicate::Range(KeyRange::LowerBound { .. }) => "aboveOrEqual",
            Predicate::Range(KeyRange::UpperBound { exclusive: true, .. }) => "below",
            Predicate::Range(KeyRange::UpperBound { .. }) => "belowOrEqual",
            Predicate::Range(_) => "between",
            Predicate::StartsWith(_) => "startsWith",
            Predicate::StartsWithIgnoreCase(_) => "startsWithIgnoreCase",
            Predicate::AnyOf(_) => "anyOf",
        }
    }

    /// Evaluates the predicate against one key value.
    pub fn matches(&self, value: &Value) -> bool {
        if !value.is_valid_key() {
            return false;
        }
        match self {
            Predicate::Equals(expected) => value == expected,
            Predicate::Range(range) => range.contains(value),
            Predicate::AnyOf(values) => values.contains(value),
            Predicate::StartsWith(prefix) => value.as_str().is_some_and(|s| s.starts_with(prefix.as_str())),
            Predicate::EqualsIgnoreCase(expected) => value.as_str().is_some_and(|s| {
                s.chars().count() == expected.chars().count() && folds_into(s, expected)
            }),
            Predicate::StartsWithIgnoreCase(prefix) => {
                value.as_str().is_some_and(|s| folds_into(s, prefix))
            }
        }
    }
}

/// The characters that match `c` when case is ignored: `c` itself and its
/// lowercase and uppercase mappings, where those are a single character.
///
/// Index ranges for the ignore-case predicates are bounded by the lowest and
/// highest of these, so matching must not accept anything else.
pub(crate) fn case_variants(c: char) -> impl Iterator<Item = char> {
    [Some(c), single(c.to_lowercase()), single(c.to_uppercase())]
        .into_iter()
        .flatten()
}

fn single(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    match (mapped.next(), mapped.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Returns true if `s` starts with `pattern`, comparing one character at a
/// time by [`case_variants`].
fn folds_into(s: &str, pattern: &str) -> bool {
    let mut chars = s.chars();
    pattern.chars().all(|p| {
        chars
            .next()
            .is_some_and(|c| case_variants(p).any(|variant| variant == c))
    })
}
