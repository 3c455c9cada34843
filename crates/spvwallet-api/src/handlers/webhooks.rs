//! Admin handlers for webhook subscriptions.
//!
//! All three handlers answer 404 `notifications-disabled` before looking at
//! the request when the notification engine is not running.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use spvwallet_notify::WebhookManager;
use tracing::{info, instrument, warn};

use crate::{error::ApiError, AppState};

/// Body of `POST /admin/webhooks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Subscriber URL
    #[serde(default)]
    pub url: Option<String>,
    /// Header name carrying the token
    #[serde(default)]
    pub token_header: Option<String>,
    /// Token sent in `token_header`
    #[serde(default)]
    pub token_value: Option<String>,
}

/// Body of `DELETE /admin/webhooks`.
#[derive(Debug, Default, Deserialize)]
pub struct UnsubscribeRequest {
    /// Subscriber URL
    #[serde(default)]
    pub url: Option<String>,
}

fn manager(state: &AppState) -> Result<&Arc<WebhookManager>, ApiError> {
    state.notifications.as_ref().ok_or(ApiError::NotificationsDisabled)
}

fn bind<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::CannotBindRequest(e.to_string()))
}

fn required(field: Option<&str>, missing: ApiError) -> Result<&str, ApiError> {
    field.filter(|value| !value.is_empty()).ok_or(missing)
}

/// `GET /admin/webhooks`: lists subscriptions as `[{url, banned}]`.
#[instrument(name = "list_webhooks", skip(state))]
pub async fn list_webhooks(State(state): State<AppState>) -> Result<Response, ApiError> {
    let manager = manager(&state)?;

    let webhooks = manager.list().await.map_err(|e| {
        warn!(error = %e, "listing webhooks failed");
        ApiError::GetAllFailed
    })?;

    Ok((StatusCode::OK, Json(webhooks)).into_response())
}

/// `POST /admin/webhooks`: subscribes a URL with its token.
#[instrument(name = "subscribe_webhook", skip(state, body))]
pub async fn subscribe_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let manager = manager(&state)?;
    let request: SubscribeRequest = bind(&body)?;

    let url = required(request.url.as_deref(), ApiError::UrlRequired)?;
    let token_header = required(request.token_header.as_deref(), ApiError::TokenHeaderRequired)?;
    let token_value = required(request.token_value.as_deref(), ApiError::TokenValueRequired)?;

    manager
        .subscribe(url, token_header, token_value)
        .await
        .map_err(|e| ApiError::from_notify(e, ApiError::SubscriptionFailed))?;

    info!(url = %url, "webhook subscription accepted");
    Ok(StatusCode::OK.into_response())
}

/// `DELETE /admin/webhooks`: removes a subscription.
#[instrument(name = "unsubscribe_webhook", skip(state, body))]
pub async fn unsubscribe_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let manager = manager(&state)?;
    let request: UnsubscribeRequest = bind(&body)?;

    let url = required(request.url.as_deref(), ApiError::UrlRequired)?;

    manager
        .unsubscribe(url)
        .await
        .map_err(|e| ApiError::from_notify(e, ApiError::UnsubscriptionFailed))?;

    info!(url = %url, "webhook subscription removed");
    Ok(StatusCode::OK.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_body_uses_camel_case() {
        let request: SubscribeRequest =
            bind(br#"{"url":"http://a","tokenHeader":"X-Auth","tokenValue":"s"}"#).unwrap();
        assert_eq!(request.token_header.as_deref(), Some("X-Auth"));
        assert_eq!(request.token_value.as_deref(), Some("s"));
    }

    #[test]
    fn malformed_body_cannot_bind() {
        let err = bind::<UnsubscribeRequest>(b"{not json").unwrap_err();
        assert_eq!(err.code(), "cannot-bind-request");

        let err = bind::<UnsubscribeRequest>(br#"{"url": 42}"#).unwrap_err();
        assert_eq!(err.code(), "cannot-bind-request");
    }

    #[test]
    fn empty_fields_count_as_missing() {
        assert_eq!(required(Some(""), ApiError::UrlRequired), Err(ApiError::UrlRequired));
        assert_eq!(required(None, ApiError::TokenValueRequired), Err(ApiError::TokenValueRequired));
        assert_eq!(required(Some("x"), ApiError::UrlRequired), Ok("x"));
    }
}
