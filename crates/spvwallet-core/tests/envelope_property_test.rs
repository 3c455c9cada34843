//! Property-based tests for the event envelope laws.
//!
//! Wrapping then unwrapping with the same variant is the identity, and a
//! variant never unwraps as another one.

use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use spvwallet_core::{
    name_of, DomainEvent, EnvelopeError, RawEvent, StringEvent, TransactionEvent,
};

fn proptest_config() -> ProptestConfig {
    ProptestConfig { cases: 64, failure_persistence: None, ..ProptestConfig::default() }
}

fn transaction_strategy() -> impl Strategy<Value = TransactionEvent> {
    (
        "[a-zA-Z0-9_-]{1,40}",
        "[0-9a-f]{64}",
        prop::option::of(prop::sample::select(vec![
            "QUEUED".to_string(),
            "SEEN_ON_NETWORK".to_string(),
            "MINED".to_string(),
            "REJECTED".to_string(),
        ])),
    )
        .prop_map(|(user_id, transaction_id, status)| TransactionEvent {
            user_id,
            transaction_id,
            status,
        })
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn string_event_round_trips(value in any::<String>()) {
        let event = StringEvent { value };
        let raw = RawEvent::wrap(&event).unwrap();

        prop_assert_eq!(raw.event_type.as_str(), name_of::<StringEvent>());
        prop_assert_eq!(raw.unwrap::<StringEvent>().unwrap(), event);
    }

    #[test]
    fn transaction_event_round_trips_through_json(event in transaction_strategy()) {
        let raw = RawEvent::wrap(&event).unwrap();
        let wire = serde_json::to_string(&raw).unwrap();
        let parsed: RawEvent = serde_json::from_str(&wire).unwrap();

        prop_assert_eq!(&parsed, &raw);
        prop_assert_eq!(parsed.unwrap::<TransactionEvent>().unwrap(), event.clone());
        prop_assert_eq!(DomainEvent::try_from(&parsed).unwrap(), DomainEvent::Transaction(event));
    }

    #[test]
    fn variants_never_cross_unwrap(event in transaction_strategy()) {
        let raw = RawEvent::wrap(&event).unwrap();

        let is_mismatch = matches!(
            raw.unwrap::<StringEvent>(),
            Err(EnvelopeError::TypeMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }
}

#[test]
fn batch_body_is_a_json_array_of_envelopes() {
    let batch = vec![
        RawEvent::wrap(&StringEvent { value: "first".into() }).unwrap(),
        RawEvent::wrap(&TransactionEvent {
            user_id: "u".into(),
            transaction_id: "t".into(),
            status: None,
        })
        .unwrap(),
    ];

    let body = serde_json::to_value(&batch).unwrap();

    assert_eq!(
        body,
        serde_json::json!([
            { "type": "StringEvent", "content": { "value": "first" } },
            { "type": "TransactionEvent", "content": { "userId": "u", "transactionId": "t" } }
        ])
    );
}
