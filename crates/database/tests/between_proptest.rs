//! Property tests: an indexed range query and the same predicate answered by
//! a full-table scan select the same records.

use futures::executor::block_on;
use proptest::prelude::*;
use strata_core::{Record, Value};
use strata_database::Database;
use strata_storage::MemoryBackend;

fn load(scores: &[i64], names: &[String]) -> Database {
    let db = Database::new("scores", MemoryBackend::new());
    db.version(1)
        .stores(&[("players", "++id,score,name")])
        .unwrap()
        .declare()
        .unwrap();
    let players: Vec<Record> = scores
        .iter()
        .zip(names)
        .map(|(score, name)| {
            Record::new()
                .with("score", *score)
                .with("copy", *score)
                .with("name", name.as_str())
                .with("alias", name.as_str())
        })
        .collect();
    block_on(db.table("players").unwrap().bulk_add(players)).unwrap();
    db
}

fn keys(db: &Database, column: &str, lower: i64, upper: i64, lo: bool, hi: bool) -> Vec<Value> {
    let collection = db
        .table("players")
        .unwrap()
        .where_(column)
        .between(lower, upper, lo, hi);
    let mut keys = block_on(collection.primary_keys()).unwrap();
    keys.sort();
    keys
}

proptest! {
    #[test]
    fn prop_between_indexed_matches_scan(
        scores in prop::collection::vec(-20i64..20, 0..40),
        a in -25i64..25,
        b in -25i64..25,
        include_lower: bool,
        include_upper: bool,
    ) {
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        let names: Vec<String> = scores.iter().map(|s| s.to_string()).collect();
        let db = load(&scores, &names);

        let indexed = keys(&db, "score", lower, upper, include_lower, include_upper);
        let scanned = keys(&db, "copy", lower, upper, include_lower, include_upper);
        prop_assert_eq!(&indexed, &scanned);

        let expected = scores
            .iter()
            .filter(|&&s| {
                (if include_lower { s >= lower } else { s > lower })
                    && (if include_upper { s <= upper } else { s < upper })
            })
            .count();
        prop_assert_eq!(indexed.len(), expected);
    }

    #[test]
    fn prop_starts_with_ignore_case_matches_scan(
        names in prop::collection::vec("[aAbB]{0,4}", 0..30),
        prefix in "[aAbB]{0,3}",
    ) {
        let scores: Vec<i64> = (0..names.len() as i64).collect();
        let db = load(&scores, &names);
        let table = db.table("players").unwrap();

        let mut indexed = block_on(table.where_("name").starts_with_ignore_case(prefix.as_str()).primary_keys()).unwrap();
        let mut scanned = block_on(table.where_("alias").starts_with_ignore_case(prefix.as_str()).primary_keys()).unwrap();
        indexed.sort();
        scanned.sort();
        prop_assert_eq!(&indexed, &scanned);

        let needle = prefix.to_lowercase();
        let expected = names.iter().filter(|n| n.to_lowercase().starts_with(&needle)).count();
        prop_assert_eq!(indexed.len(), expected);
    }

    #[test]
    fn prop_ignore_case_non_ascii_matches_scan(
        names in prop::collection::vec("[kK\u{212A}iIİıßSsé]{0,4}", 0..30),
        text in "[kK\u{212A}iIİıßSsé]{0,3}",
    ) {
        let scores: Vec<i64> = (0..names.len() as i64).collect();
        let db = load(&scores, &names);
        let table = db.table("players").unwrap();

        let mut indexed = block_on(table.where_("name").starts_with_ignore_case(text.as_str()).primary_keys()).unwrap();
        let mut scanned = block_on(table.where_("alias").starts_with_ignore_case(text.as_str()).primary_keys()).unwrap();
        indexed.sort();
        scanned.sort();
        prop_assert_eq!(&indexed, &scanned);

        let mut indexed = block_on(table.where_("name").equals_ignore_case(text.as_str()).primary_keys()).unwrap();
        let mut scanned = block_on(table.where_("alias").equals_ignore_case(text.as_str()).primary_keys()).unwrap();
        indexed.sort();
        scanned.sort();
        prop_assert_eq!(&indexed, &scanned);
    }
}
