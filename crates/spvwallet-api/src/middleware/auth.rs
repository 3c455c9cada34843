//! Admin key authentication.
//!
//! Compares the SHA-256 of the Bearer token with the hash of the configured
//! admin key. Without a configured key the admin group is open.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::{error::ApiError, AppState};

/// Hex SHA-256 of an admin key, as stored in [`AppState`].
pub fn hash_admin_key(key: &str) -> String {
    sha256::digest(key.as_bytes())
}

/// Extracts the key from an `Authorization: Bearer <key>` header.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|key| !key.is_empty())
}

/// Axum middleware guarding the admin routes.
pub async fn admin_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_key_hash.as_deref() else {
        return Ok(next.run(req).await);
    };

    let api_key = extract_api_key(req.headers()).ok_or(ApiError::Unauthorized)?;
    if hash_admin_key(api_key) != expected {
        warn!(path = %req.uri().path(), "rejected admin request with invalid key");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}
