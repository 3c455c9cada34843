//! Self-tests for the recording subscriber and the notification env.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use spvwallet_core::RawEvent;
use spvwallet_testing::{string_event, string_values, NotificationEnv, WebhookRecorder};

async fn post(url: &str, events: &[RawEvent]) -> reqwest::StatusCode {
    reqwest::Client::new().post(url).json(events).send().await.unwrap().status()
}

#[tokio::test]
async fn recorder_separates_failed_attempts() {
    let recorder = WebhookRecorder::failing_first(503, 2).await;
    let batch = vec![RawEvent::wrap(&string_event("a")).unwrap()];

    assert_eq!(post(&recorder.url(), &batch).await, 503);
    assert_eq!(post(&recorder.url(), &batch).await, 503);
    assert_eq!(post(&recorder.url(), &batch).await, 200);

    assert_eq!(recorder.request_count().await, 3);
    assert_eq!(recorder.accepted_batches().await.unwrap().len(), 1);
    let events = recorder.wait_for_events(1, Duration::from_secs(1)).await.unwrap();
    assert_eq!(string_values(&events).unwrap(), vec!["a"]);
}

#[tokio::test]
async fn waiting_for_missing_events_times_out() {
    let recorder = WebhookRecorder::start().await;

    let err = recorder.wait_for_events(1, Duration::from_millis(50)).await.unwrap_err();
    assert!(err.to_string().contains("expected 1 events"));
}

#[tokio::test]
async fn env_delivers_to_recorder() {
    let env = NotificationEnv::builder().max_batch_size(2).build().unwrap();
    let recorder = WebhookRecorder::start().await;
    env.subscribe(&recorder.url(), "X-Auth", "secret").await.unwrap();

    let sent = env.notify_strings(5).await.unwrap();
    let received = recorder.wait_for_events(5, Duration::from_secs(5)).await.unwrap();

    assert_eq!(string_values(&received).unwrap(), sent);
    assert!(recorder.batches().await.unwrap().iter().all(|batch| batch.len() <= 2));
    env.shutdown().await.unwrap();
}
