//! Fuzz target: `truncate_close_reason`
//!
//! The result must fit a control frame and be a prefix of the input
//! (plus the truncation marker) for any UTF-8 string.
//!
//! cargo fuzz run fuzz_close_reason

#![no_main]

use libfuzzer_sys::fuzz_target;
use testbridge::connection::{MAX_CLOSE_REASON, truncate_close_reason};

fuzz_target!(|reason: &str| {
    let out = truncate_close_reason(reason);
    assert!(out.len() <= MAX_CLOSE_REASON);
    if reason.len() <= MAX_CLOSE_REASON {
        assert_eq!(out.as_str(), reason);
    } else {
        let kept = out.strip_suffix("...").expect("truncated reasons carry the marker");
        assert!(reason.starts_with(kept));
    }
});
