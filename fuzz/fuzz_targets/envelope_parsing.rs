#![no_main]

//! Fuzz target for envelope decoding.
//!
//! Feeds arbitrary bytes through the same path a subscriber-side decoder
//! takes: a JSON array of envelopes, each unwrapped as every known variant.
//! Decoding may fail but must never panic, and a successful unwrap must
//! re-wrap to an envelope with the same type name.

use libfuzzer_sys::fuzz_target;
use spvwallet_core::{name_of, RawEvent, StringEvent, TransactionEvent};

fuzz_target!(|data: &[u8]| {
    let Ok(batch) = serde_json::from_slice::<Vec<RawEvent>>(data) else {
        return;
    };

    for raw in &batch {
        if let Ok(event) = raw.unwrap::<StringEvent>() {
            assert_eq!(raw.event_type, name_of::<StringEvent>());
            let rewrapped = RawEvent::wrap(&event).expect("decoded event re-encodes");
            assert_eq!(rewrapped.event_type, raw.event_type);
        }

        if let Ok(event) = raw.unwrap::<TransactionEvent>() {
            assert_eq!(raw.event_type, name_of::<TransactionEvent>());
            let rewrapped = RawEvent::wrap(&event).expect("decoded event re-encodes");
            assert_eq!(rewrapped.event_type, raw.event_type);
        }
    }
});
