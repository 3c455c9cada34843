#![no_main]

//! Fuzz target for subscription URL validation.
//!
//! The validator must never panic, and anything it accepts must be free of
//! malformed percent escapes.

use libfuzzer_sys::fuzz_target;
use spvwallet_notify::validation::validate_url;

fuzz_target!(|data: &[u8]| {
    let Ok(url) = std::str::from_utf8(data) else {
        return;
    };

    if validate_url(url).is_ok() {
        let bytes = url.as_bytes();
        for (i, _) in bytes.iter().enumerate().filter(|(_, &b)| b == b'%') {
            assert!(
                bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                    && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit),
                "accepted url with stray percent: {url:?}"
            );
        }
    }
});
