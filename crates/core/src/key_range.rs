//! Key ranges and scan direction.

use core::ops::{Bound, RangeBounds};

/// Scan direction over a key-ordered store or index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Descending key order.
    Prev,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Next => Direction::Prev,
            Direction::Prev => Direction::Next,
        }
    }
}

/// The keys a store or index scan visits.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyRange<K> {
    All,
    Only(K),
    /// Keys above `value`.
    LowerBound { value: K, exclusive: bool },
    /// Keys below `value`.
    UpperBound { value: K, exclusive: bool },
    Bound {
        lower: K,
        upper: K,
        lower_exclusive: bool,
        upper_exclusive: bool,
    },
}

impl<K: Clone + Ord> KeyRange<K> {
    pub fn all() -> Self {
        KeyRange::All
    }

    pub fn only(key: K) -> Self {
        KeyRange::Only(key)
    }

    pub fn lower_bound(value: K, exclusive: bool) -> Self {
        KeyRange::LowerBound { value, exclusive }
    }

    pub fn upper_bound(value: K, exclusive: bool) -> Self {
        KeyRange::UpperBound { value, exclusive }
    }

    /// A range bounded on both sides. Inverted bounds yield an empty range;
    /// see [`KeyRange::is_inverted`].
    pub fn bound(lower: K, upper: K, lower_exclusive: bool, upper_exclusive: bool) -> Self {
        KeyRange::Bound {
            lower,
            upper,
            lower_exclusive,
            upper_exclusive,
        }
    }

    /// Returns true if the lower bound lies above the upper bound.
    pub fn is_inverted(&self) -> bool {
        matches!(self, KeyRange::Bound { lower, upper, .. } if lower > upper)
    }

    /// Returns true if no key can fall inside this range.
    pub fn is_empty(&self) -> bool {
        match self {
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => lower > upper || (lower == upper && (*lower_exclusive || *upper_exclusive)),
            _ => false,
        }
    }

    /// Returns the range as a pair of standard bounds, for `BTreeMap::range`.
    ///
    /// Callers must check [`KeyRange::is_empty`] first: an empty range
    /// produces bounds that `BTreeMap::range` rejects.
    pub fn bounds(&self) -> (Bound<&K>, Bound<&K>) {
        fn edge<K>(value: &K, exclusive: bool) -> Bound<&K> {
            if exclusive {
                Bound::Excluded(value)
            } else {
                Bound::Included(value)
            }
        }

        match self {
            KeyRange::All => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Only(k) => (Bound::Included(k), Bound::Included(k)),
            KeyRange::LowerBound { value, exclusive } => (edge(value, *exclusive), Bound::Unbounded),
            KeyRange::UpperBound { value, exclusive } => (Bound::Unbounded, edge(value, *exclusive)),
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => (edge(lower, *lower_exclusive), edge(upper, *upper_exclusive)),
        }
    }

    /// Returns true if `key` falls inside this range.
    pub fn contains(&self, key: &K) -> bool {
        <(Bound<&K>, Bound<&K>) as RangeBounds<K>>::contains(&self.bounds(), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;

    #[test]
    fn test_key_range_only() {
        let range = KeyRange::only(5);
        assert!(!range.contains(&4));
        assert!(range.contains(&5));
        assert!(!range.contains(&6));
    }

    #[test]
    fn test_key_range_lower_bound() {
        let range = KeyRange::lower_bound(5, false);
        assert!(!range.contains(&4));
        assert!(range.contains(&5));

        let range_ex = KeyRange::lower_bound(5, true);
        assert!(!range_ex.contains(&5));
        assert!(range_ex.contains(&6));
    }

    #[test]
    fn test_key_range_bound() {
        let range = KeyRange::bound(3, 7, false, false);
        assert!(!range.contains(&2));
        assert!(range.contains(&3));
        assert!(range.contains(&7));
        assert!(!range.contains(&8));

        let range_ex = KeyRange::bound(3, 7, true, true);
        assert!(!range_ex.contains(&3));
        assert!(range_ex.contains(&5));
        assert!(!range_ex.contains(&7));
    }

    #[test]
    fn test_empty_ranges() {
        assert!(KeyRange::bound(7, 3, false, false).is_empty());
        assert!(KeyRange::bound(7, 3, false, false).is_inverted());
        assert!(KeyRange::bound(3, 3, false, true).is_empty());
        assert!(!KeyRange::bound(3, 3, false, false).is_empty());
        assert!(!KeyRange::bound(3, 3, true, true).is_inverted());
        assert!(!KeyRange::<i32>::all().is_empty());
    }

    #[test]
    fn test_bounds_match_contains() {
        let map: BTreeMap<i32, ()> = (0..10).map(|i| (i, ())).collect();
        let ranges = [
            KeyRange::all(),
            KeyRange::only(4),
            KeyRange::lower_bound(6, true),
            KeyRange::upper_bound(2, false),
            KeyRange::bound(2, 5, true, false),
        ];
        for range in &ranges {
            let via_bounds: Vec<i32> = map.range(range.bounds()).map(|(k, _)| *k).collect();
            let via_contains: Vec<i32> = map.keys().copied().filter(|k| range.contains(k)).collect();
            assert_eq!(via_bounds, via_contains);
        }
    }

    #[test]
    fn test_direction_reverse() {
        assert_eq!(Direction::Next.reverse(), Direction::Prev);
        assert_eq!(Direction::default(), Direction::Next);
    }
}
