//! Error payloads returned by the admin surface.
//!
//! Every failure serializes as `{"code": "<stable-kebab-code>", "message": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use spvwallet_notify::NotifyError;
use thiserror::Error;

/// Admin API failure with a stable machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Body is not valid JSON of the expected shape.
    #[error("cannot bind request: {0}")]
    CannotBindRequest(String),

    /// `url` missing or empty.
    #[error("url is required")]
    UrlRequired,

    /// `tokenHeader` missing or empty.
    #[error("tokenHeader is required")]
    TokenHeaderRequired,

    /// `tokenValue` missing or empty.
    #[error("tokenValue is required")]
    TokenValueRequired,

    /// `tokenHeader` is not a valid HTTP header name.
    #[error("invalid tokenHeader: {0}")]
    InvalidTokenHeader(String),

    /// `tokenValue` cannot be sent as an HTTP header value.
    #[error("invalid tokenValue: {0}")]
    InvalidTokenValue(String),

    /// `url` is not an absolute http(s) URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Notifications feature is switched off.
    #[error("notifications are disabled")]
    NotificationsDisabled,

    /// No subscription exists for the URL.
    #[error("webhook subscription not found")]
    SubscriptionNotFound,

    /// Registry write failed while subscribing.
    #[error("failed to subscribe webhook")]
    SubscriptionFailed,

    /// Registry delete failed while unsubscribing.
    #[error("failed to unsubscribe webhook")]
    UnsubscriptionFailed,

    /// Registry read failed while listing.
    #[error("failed to get webhooks")]
    GetAllFailed,

    /// Missing or wrong admin credentials.
    #[error("missing or invalid admin key")]
    Unauthorized,
}

impl ApiError {
    /// Stable code carried in the error payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CannotBindRequest(_) => "cannot-bind-request",
            Self::UrlRequired => "webhook-url-required",
            Self::TokenHeaderRequired => "webhook-token-header-required",
            Self::TokenValueRequired => "webhook-token-value-required",
            Self::InvalidTokenHeader(_) => "webhook-token-header-invalid",
            Self::InvalidTokenValue(_) => "webhook-token-value-invalid",
            Self::InvalidUrl(_) => "webhook-url-invalid",
            Self::NotificationsDisabled => "notifications-disabled",
            Self::SubscriptionNotFound => "webhook-subscription-not-found",
            Self::SubscriptionFailed => "webhook-subscription-failed",
            Self::UnsubscriptionFailed => "webhook-unsubscription-failed",
            Self::GetAllFailed => "webhook-get-all",
            Self::Unauthorized => "unauthorized",
        }
    }

    /// HTTP status for the error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::CannotBindRequest(_)
            | Self::UrlRequired
            | Self::TokenHeaderRequired
            | Self::TokenValueRequired
            | Self::InvalidTokenHeader(_)
            | Self::InvalidTokenValue(_)
            | Self::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Self::NotificationsDisabled | Self::SubscriptionNotFound => StatusCode::NOT_FOUND,
            Self::SubscriptionFailed | Self::UnsubscriptionFailed | Self::GetAllFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    /// Maps a manager error, using `storage_failure` for everything that is
    /// not an input or lookup problem.
    pub fn from_notify(error: NotifyError, storage_failure: Self) -> Self {
        match error {
            NotifyError::UrlRequired => Self::UrlRequired,
            NotifyError::TokenHeaderRequired => Self::TokenHeaderRequired,
            NotifyError::TokenValueRequired => Self::TokenValueRequired,
            NotifyError::InvalidTokenHeader { reason, .. } => Self::InvalidTokenHeader(reason),
            NotifyError::InvalidTokenValue { reason } => Self::InvalidTokenValue(reason),
            NotifyError::InvalidUrl { reason, .. } => Self::InvalidUrl(reason),
            NotifyError::SubscriptionNotFound { .. } => Self::SubscriptionNotFound,
            _ => storage_failure,
        }
    }
}

/// Wire form of an [`ApiError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable kebab-case code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(error: &ApiError) -> Self {
        Self { code: error.code().to_string(), message: error.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::from(&self))).into_response()
    }
}
