//! Fuzz target for ledger key normalisation
//!
//! Any path the scoper accepts must map to a valid key that resolves back
//! under the ledger directory.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::path::PathBuf;
use swing_files::Scope;
use swing_files::scope::validate_key;

#[derive(Debug, Arbitrary)]
struct ScopeInput {
    segments: Vec<String>,
    key: String,
}

fuzz_target!(|input: ScopeInput| {
    let scope = Scope::for_ledger("/repo/swing.csv").expect("absolute ledger path");

    let mut path = PathBuf::from("/repo");
    for segment in &input.segments {
        path.push(segment);
    }

    if let Ok(key) = scope.key_for(&path) {
        assert!(validate_key(&key).is_ok(), "accepted key {key:?} is invalid");
        let local = scope.local_path(&key).expect("accepted key resolves");
        assert!(local.starts_with(scope.root()), "{key:?} escapes the root");
    }

    // Arbitrary keys read from a ledger must never resolve outside the root
    if let Ok(local) = scope.local_path(&input.key) {
        assert!(local.starts_with(scope.root()), "{:?} escapes the root", input.key);
    }
});
