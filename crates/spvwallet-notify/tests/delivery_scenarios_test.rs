//! End-to-end delivery scenarios through bus, manager and notifiers.
//!
//! Every test runs the real engine against wiremock subscribers; only the
//! registry (in memory) and the clock (virtual) are substituted.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use spvwallet_core::{RawEvent, StringEvent};
use spvwallet_testing::{string_values, transaction_event, NotificationEnv, WebhookRecorder};

const WAIT: Duration = Duration::from_secs(10);

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn slow_subscriber_receives_batches() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::with_delay(Duration::from_millis(100)).await;
    env.subscribe(&subscriber.url(), "", "").await.unwrap();

    let sent = env.notify_strings(50).await.unwrap();

    let received = subscriber.wait_for_events(50, WAIT).await.unwrap();
    assert_eq!(string_values(&received).unwrap(), sent);

    let batches = subscriber.accepted_batches().await.unwrap();
    assert!(batches.iter().any(|batch| batch.len() > 1), "expected at least one multi-event batch");
    assert!(batches.iter().all(|batch| batch.len() <= env.config.max_batch_size));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn hanging_subscriber_does_not_starve_others() {
    let env = NotificationEnv::new().unwrap();
    let hanging = WebhookRecorder::hanging().await;
    let fast = WebhookRecorder::start().await;
    env.subscribe(&hanging.url(), "", "").await.unwrap();
    env.subscribe(&fast.url(), "", "").await.unwrap();

    let sent = env.notify_strings(50).await.unwrap();

    let received = fast.wait_for_events(50, WAIT).await.unwrap();
    assert_eq!(string_values(&received).unwrap(), sent);

    let stuck: usize = hanging.batches().await.unwrap().iter().map(Vec::len).sum();
    assert!(hanging.request_count().await <= 1);
    assert!(stuck <= env.config.egress_capacity);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn batch_is_retried_after_request_timeout_status() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::failing_first(408, 1).await;
    env.subscribe(&subscriber.url(), "", "").await.unwrap();

    env.notify_strings(1).await.unwrap();

    let received = subscriber.wait_for_events(1, WAIT).await.unwrap();
    assert_eq!(string_values(&received).unwrap(), vec!["event-0"]);

    let all = subscriber.batches().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0], all[1], "retry must resend the same batch");
    assert_eq!(subscriber.accepted_batches().await.unwrap().len(), 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn failing_subscriber_is_banned() {
    let env = NotificationEnv::builder().max_retries(3).build().unwrap();
    let subscriber = WebhookRecorder::always_failing(500).await;
    let url = subscriber.url();
    env.subscribe(&url, "", "").await.unwrap();

    env.notify_strings(1).await.unwrap();
    subscriber.wait_for_requests(env.config.max_retries as usize, WAIT).await.unwrap();

    let manager = env.manager.clone();
    wait_until(|| {
        let manager = manager.clone();
        async move { manager.list().await.unwrap().iter().any(|status| status.banned) }
    })
    .await;

    env.notify_strings(5).await.unwrap();
    let manager = env.manager.clone();
    let banned_url = url.clone();
    wait_until(|| {
        let manager = manager.clone();
        let url = banned_url.clone();
        async move { manager.status().await.subscribers[&url].events_discarded >= 6 }
    })
    .await;

    assert_eq!(subscriber.request_count().await, env.config.max_retries as usize);
    let stats = env.manager.status().await.subscribers[&url];
    assert_eq!(stats.events_discarded, 6);
    assert!(stats.banned);
    assert_eq!(stats.bans, 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn ban_expires_and_is_cleared_after_next_delivery() {
    let env = NotificationEnv::builder().max_retries(3).build().unwrap();
    let subscriber = WebhookRecorder::failing_first(503, 3).await;
    let url = subscriber.url();
    env.subscribe(&url, "", "").await.unwrap();

    env.notify_strings(1).await.unwrap();
    let repository = env.repository.clone();
    let banned_url = url.clone();
    wait_until(|| {
        let repository = repository.clone();
        let url = banned_url.clone();
        async move { repository.find(&url).await.is_some_and(|row| row.banned_until.is_some()) }
    })
    .await;

    env.advance_time(env.config.ban_duration + Duration::from_secs(1));
    env.notify(&StringEvent { value: "after-ban".into() }).await.unwrap();

    let received = subscriber.wait_for_events(1, WAIT).await.unwrap();
    assert_eq!(string_values(&received).unwrap(), vec!["after-ban"]);

    let repository = env.repository.clone();
    let cleared_url = url.clone();
    wait_until(|| {
        let repository = repository.clone();
        let url = cleared_url.clone();
        async move { repository.find(&url).await.is_some_and(|row| row.banned_until.is_none()) }
    })
    .await;
    assert!(env.manager.list().await.unwrap().iter().all(|status| !status.banned));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn token_header_is_forwarded() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::start().await;
    env.subscribe(&subscriber.url(), "X-Auth", "secret").await.unwrap();

    env.notify_strings(3).await.unwrap();
    subscriber.wait_for_events(3, WAIT).await.unwrap();

    let headers = subscriber.header_values("X-Auth").await;
    assert!(!headers.is_empty());
    assert!(headers.iter().all(|value| value.as_deref() == Some("secret")));

    let content_types = subscriber.header_values("content-type").await;
    assert!(content_types.iter().all(|value| value.as_deref() == Some("application/json")));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn resubscribe_rotates_token() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::start().await;
    env.subscribe(&subscriber.url(), "X-Auth", "old").await.unwrap();
    env.notify_strings(1).await.unwrap();
    subscriber.wait_for_events(1, WAIT).await.unwrap();

    env.subscribe(&subscriber.url(), "X-Auth", "new").await.unwrap();
    env.notify(&StringEvent { value: "rotated".into() }).await.unwrap();
    subscriber.wait_for_events(2, WAIT).await.unwrap();

    let headers = subscriber.header_values("X-Auth").await;
    assert_eq!(headers, vec![Some("old".to_string()), Some("new".to_string())]);
    assert_eq!(env.manager.list().await.unwrap().len(), 1);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn every_subscriber_receives_every_event_in_order() {
    let env = NotificationEnv::new().unwrap();
    let first = WebhookRecorder::start().await;
    let second = WebhookRecorder::start().await;
    env.subscribe(&first.url(), "", "").await.unwrap();
    env.subscribe(&second.url(), "", "").await.unwrap();

    let sent = env.notify_strings(20).await.unwrap();

    for subscriber in [&first, &second] {
        let received = subscriber.wait_for_events(20, WAIT).await.unwrap();
        assert_eq!(string_values(&received).unwrap(), sent);
    }

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn unsubscribed_url_receives_nothing_new() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::start().await;
    env.subscribe(&subscriber.url(), "", "").await.unwrap();

    env.notify_strings(1).await.unwrap();
    subscriber.wait_for_events(1, WAIT).await.unwrap();

    env.unsubscribe(&subscriber.url()).await.unwrap();
    env.notify_strings(3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(subscriber.request_count().await, 1);
    assert_eq!(env.manager.status().await.notifiers, 0);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn subscription_converges_on_reconcile_tick() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::start().await;

    env.manager.subscribe(&subscriber.url(), "", "").await.unwrap();
    let bus = env.bus.clone();
    wait_until(|| {
        let bus = bus.clone();
        async move { bus.subscriber_count().await == 1 }
    })
    .await;

    env.notify_strings(2).await.unwrap();
    subscriber.wait_for_events(2, WAIT).await.unwrap();

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn transaction_events_keep_wire_shape() {
    let env = NotificationEnv::new().unwrap();
    let subscriber = WebhookRecorder::start().await;
    env.subscribe(&subscriber.url(), "", "").await.unwrap();

    env.notify(&transaction_event("user-1", "tx-1")).await.unwrap();
    subscriber.wait_for_requests(1, WAIT).await.unwrap();

    let request = &subscriber.requests().await[0];
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!([{
            "type": "TransactionEvent",
            "content": {"userId": "user-1", "transactionId": "tx-1"}
        }])
    );

    let envelopes: Vec<RawEvent> = serde_json::from_value(body).unwrap();
    assert_eq!(envelopes[0].event_type, "TransactionEvent");

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn notify_after_shutdown_is_rejected() {
    let env = NotificationEnv::new().unwrap();
    let bus = env.bus.clone();
    env.shutdown().await.unwrap();

    let err = bus.notify_event(&StringEvent { value: "late".into() }).await.unwrap_err();
    assert!(matches!(err, spvwallet_notify::NotifyError::BusClosed));
}
