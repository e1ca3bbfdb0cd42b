//! Fuzz target for the ledger parser
//!
//! Whatever the input, parsing must not panic, and anything that parses and
//! can be written must read back unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use swing_files::Ledger;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(ledger) = Ledger::parse(text) else {
        return;
    };

    // Fields with separators or leading whitespace are refused on write
    if let Ok(rendered) = ledger.render() {
        let reparsed = Ledger::parse(&rendered).expect("rendered ledger must parse");
        assert_eq!(reparsed, ledger, "ledger changed across a write/read cycle");
        assert_eq!(
            reparsed.render().expect("re-render"),
            rendered,
            "write is not idempotent"
        );
    }
});
