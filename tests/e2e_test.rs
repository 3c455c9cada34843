//! End-to-end tests for the admin API and webhook delivery.
//!
//! Serves the real router on a loopback socket, manages subscriptions over
//! HTTP, and checks what wiremock subscribers receive after events are
//! published on the bus.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use serde_json::{json, Value};
use spvwallet_api::{create_router, AppState};
use spvwallet_testing::{string_values, NotificationEnv, WebhookRecorder};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(10);
const ADMIN_KEY: &str = "e2e-admin-key";

struct Server {
    addr: SocketAddr,
    client: reqwest::Client,
    shutdown: CancellationToken,
}

impl Server {
    async fn start(env: &NotificationEnv) -> Result<Self> {
        let state = AppState::new(env.clock.shared())
            .with_notifications(env.manager.clone())
            .with_admin_key(ADMIN_KEY);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state))
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        Ok(Self { addr, client: reqwest::Client::new(), shutdown })
    }

    fn webhooks_url(&self) -> String {
        format!("http://{}/admin/webhooks", self.addr)
    }

    async fn admin(&self, method: reqwest::Method, body: Option<Value>) -> Result<(u16, Value)> {
        let mut request =
            self.client.request(method, self.webhooks_url()).bearer_auth(ADMIN_KEY);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text)? };
        Ok((status, body))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn subscribe_over_http_and_receive_events() -> Result<()> {
    let env = NotificationEnv::new()?;
    let server = Server::start(&env).await?;
    let subscriber = WebhookRecorder::start().await;

    let (status, _) = server
        .admin(
            reqwest::Method::POST,
            Some(json!({"url": subscriber.url(), "tokenHeader": "X-Auth", "tokenValue": "secret"})),
        )
        .await?;
    assert_eq!(status, 200);
    env.manager.reconcile().await?;

    let sent = env.notify_strings(10).await?;
    let received = subscriber.wait_for_events(10, WAIT).await?;
    assert_eq!(string_values(&received)?, sent);
    assert!(subscriber
        .header_values("X-Auth")
        .await
        .iter()
        .all(|value| value.as_deref() == Some("secret")));

    let (status, body) = server.admin(reqwest::Method::GET, None).await?;
    assert_eq!(status, 200);
    assert_eq!(body, json!([{"url": subscriber.url(), "banned": false}]));

    env.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unsubscribe_over_http_stops_delivery() -> Result<()> {
    let env = NotificationEnv::new()?;
    let server = Server::start(&env).await?;
    let subscriber = WebhookRecorder::start().await;

    server
        .admin(
            reqwest::Method::POST,
            Some(json!({"url": subscriber.url(), "tokenHeader": "X-Auth", "tokenValue": "secret"})),
        )
        .await?;
    env.manager.reconcile().await?;
    env.notify_strings(1).await?;
    subscriber.wait_for_events(1, WAIT).await?;

    let (status, _) =
        server.admin(reqwest::Method::DELETE, Some(json!({"url": subscriber.url()}))).await?;
    assert_eq!(status, 200);
    env.manager.reconcile().await?;

    env.notify_strings(5).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(subscriber.request_count().await, 1);

    let (status, body) =
        server.admin(reqwest::Method::DELETE, Some(json!({"url": subscriber.url()}))).await?;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "webhook-subscription-not-found");

    env.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn banned_subscriber_is_listed_as_banned() -> Result<()> {
    let env = NotificationEnv::builder().max_retries(2).build()?;
    let server = Server::start(&env).await?;
    let subscriber = WebhookRecorder::always_failing(500).await;

    server
        .admin(
            reqwest::Method::POST,
            Some(json!({"url": subscriber.url(), "tokenHeader": "X-Auth", "tokenValue": "secret"})),
        )
        .await?;
    env.manager.reconcile().await?;
    env.notify_strings(1).await?;
    subscriber.wait_for_requests(2, WAIT).await?;

    let banned = tokio::time::timeout(WAIT, async {
        loop {
            let (_, body) = server.admin(reqwest::Method::GET, None).await?;
            if body[0]["banned"] == json!(true) {
                return Ok::<_, anyhow::Error>(body);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await??;
    assert_eq!(banned, json!([{"url": subscriber.url(), "banned": true}]));

    env.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_key() -> Result<()> {
    let env = NotificationEnv::new()?;
    let server = Server::start(&env).await?;

    let response = server.client.get(server.webhooks_url()).send().await?;
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "unauthorized");

    env.shutdown().await?;
    Ok(())
}
