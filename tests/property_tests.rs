//! Property-based tests for Swing
//!
//! Uses proptest to check the ledger and scoping invariants over large
//! input spaces.

use proptest::prelude::*;
use std::collections::BTreeMap;
use swing_files::{Ledger, LedgerRecord};

/// One key segment: no separators, no leading whitespace, never `.`/`..`
fn segment() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_][A-Za-z0-9_. -]{0,11}".prop_filter("relative segment", |s| s != "." && s != "..")
}

fn key() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 1..4).prop_map(|segments| segments.join("/"))
}

fn field() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.-]{1,16}"
}

fn record() -> impl Strategy<Value = LedgerRecord> {
    (key(), field(), field(), "[0-9a-f]{32}", field()).prop_map(
        |(path, region, bucket, md5, version_id)| LedgerRecord {
            path,
            region,
            bucket,
            md5,
            version_id,
        },
    )
}

fn ledger() -> impl Strategy<Value = Ledger> {
    prop::collection::vec(record(), 0..24).prop_map(Ledger::from_iter)
}

// ============================================================================
// Ledger Codec Properties
// ============================================================================

mod ledger_properties {
    use super::*;

    proptest! {
        /// Reading back a written ledger gives the same records
        #[test]
        fn write_then_read(ledger in ledger()) {
            let text = ledger.render().unwrap();
            prop_assert_eq!(Ledger::parse(&text).unwrap(), ledger);
        }

        /// Writing twice gives byte-identical output
        #[test]
        fn write_is_idempotent(ledger in ledger()) {
            let first = ledger.render().unwrap();
            let second = Ledger::parse(&first).unwrap().render().unwrap();
            prop_assert_eq!(first, second);
        }

        /// Rows come out in ascending path order, one per path
        #[test]
        fn rows_are_sorted(ledger in ledger()) {
            let text = ledger.render().unwrap();
            let paths: Vec<&str> = text
                .lines()
                .skip(1)
                .map(|line| line.split(';').next().unwrap())
                .collect();

            let mut sorted = paths.clone();
            sorted.sort_unstable();
            sorted.dedup();
            prop_assert_eq!(paths, sorted);
        }

        /// The post-merge ledger is the old ledger minus replaced paths plus the updates
        #[test]
        fn merge_new_wins(base in ledger(), updates in prop::collection::vec(record(), 0..12)) {
            let mut expected: BTreeMap<String, LedgerRecord> = base
                .iter()
                .map(|r| (r.path.clone(), r.clone()))
                .collect();
            for update in &updates {
                expected.insert(update.path.clone(), update.clone());
            }

            let mut merged = base.clone();
            merged.merge(updates.iter().cloned());

            let merged: Vec<&LedgerRecord> = merged.iter().collect();
            let expected: Vec<&LedgerRecord> = expected.values().collect();
            prop_assert_eq!(merged, expected);
        }

        /// Leading whitespace in fields is ignored on read
        #[test]
        fn leading_whitespace_ignored(ledger in ledger(), pad in "[ \t]{1,3}") {
            let text = ledger.render().unwrap();
            let padded: String = text
                .lines()
                .map(|line| {
                    let fields: Vec<String> =
                        line.split(';').map(|f| format!("{pad}{f}")).collect();
                    fields.join(";") + "\n"
                })
                .collect();
            prop_assert_eq!(Ledger::parse(&padded).unwrap(), ledger);
        }

        /// The parser never panics, whatever the input
        #[test]
        fn parse_arbitrary_text(text in ".{0,256}") {
            let _ = Ledger::parse(&text);
        }
    }
}

// ============================================================================
// Scope Properties
// ============================================================================

mod scope_properties {
    use super::*;
    use std::path::{Path, PathBuf};
    use swing_files::Scope;
    use swing_files::scope::validate_key;

    fn scope() -> Scope {
        Scope::for_ledger("/repo/swing.csv").unwrap()
    }

    proptest! {
        /// Every accepted input maps back to a path under the ledger directory
        #[test]
        fn accepted_keys_stay_inside(segments in prop::collection::vec(
            prop_oneof![segment(), Just("..".to_string()), Just(".".to_string())],
            1..6,
        )) {
            let scope = scope();
            let mut input = PathBuf::from("/repo");
            for segment in &segments {
                input.push(segment);
            }

            if let Ok(key) = scope.key_for(&input) {
                let local = scope.local_path(&key).unwrap();
                prop_assert!(local.starts_with(scope.root()));
                prop_assert!(validate_key(&key).is_ok());
            }
        }

        /// Key and local path convert into each other
        #[test]
        fn key_local_path_inverse(key in key()) {
            let scope = scope();
            let local = scope.local_path(&key).unwrap();
            prop_assert_eq!(scope.key_for(&local).unwrap(), key);
        }

        /// Files under a sibling directory sharing a name prefix are rejected
        #[test]
        fn sibling_prefix_rejected(suffix in "[a-z0-9]{1,8}", name in segment()) {
            let scope = scope();
            let sibling = Path::new("/").join(format!("repo{suffix}")).join(name);
            prop_assert!(scope.key_for(&sibling).is_err());
        }

        /// Keys that climb out of the directory are never valid
        #[test]
        fn escaping_keys_invalid(prefix in prop::collection::vec(segment(), 0..3)) {
            let mut segments = prefix;
            segments.push("..".to_string());
            segments.push("escape.txt".to_string());
            prop_assert!(validate_key(&segments.join("/")).is_err());
        }
    }
}
