//! Input checks for subscription requests.

use reqwest::{
    header::{HeaderName, HeaderValue},
    Url,
};
use spvwallet_core::NewWebhook;

use crate::error::{NotifyError, Result};

/// Checks that `url` is an absolute http(s) URL.
///
/// Percent signs must introduce a two-digit hex escape; the URL parser
/// tolerates stray `%` but subscribers would never see the same URL back.
///
/// # Errors
///
/// `UrlRequired` for an empty string, `InvalidUrl` otherwise.
pub fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(NotifyError::UrlRequired);
    }

    if let Some(position) = malformed_escape(url) {
        return Err(NotifyError::invalid_url(
            url,
            format!("invalid percent-encoding at byte {position}"),
        ));
    }

    let parsed = Url::parse(url).map_err(|e| NotifyError::invalid_url(url, e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(NotifyError::invalid_url(
            url,
            format!("unsupported scheme {:?}", parsed.scheme()),
        ));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(NotifyError::invalid_url(url, "missing host"));
    }

    Ok(())
}

/// Builds a subscription from raw request fields.
///
/// Header and value travel together: both empty means no token, one
/// without the other is rejected.
///
/// # Errors
///
/// URL errors from [`validate_url`], `TokenHeaderRequired` or
/// `TokenValueRequired` when only half of the token is supplied, and
/// `InvalidTokenHeader` or `InvalidTokenValue` when the pair cannot be sent
/// as an HTTP header.
pub fn validate_subscription(url: &str, token_header: &str, token_value: &str) -> Result<NewWebhook> {
    validate_url(url)?;

    match (token_header.is_empty(), token_value.is_empty()) {
        (true, true) => Ok(NewWebhook { url: url.to_string(), token_header: None, token_value: None }),
        (true, false) => Err(NotifyError::TokenHeaderRequired),
        (false, true) => Err(NotifyError::TokenValueRequired),
        (false, false) => {
            validate_token(token_header, token_value)?;
            Ok(NewWebhook::with_token(url, token_header, token_value))
        },
    }
}

/// Checks that the token pair is a well-formed HTTP header.
///
/// # Errors
///
/// `InvalidTokenHeader` for a name that is not an HTTP token,
/// `InvalidTokenValue` for a value with control characters such as CR/LF.
pub fn validate_token(token_header: &str, token_value: &str) -> Result<()> {
    HeaderName::from_bytes(token_header.as_bytes()).map_err(|e| {
        NotifyError::InvalidTokenHeader { header: token_header.to_string(), reason: e.to_string() }
    })?;
    HeaderValue::from_str(token_value)
        .map_err(|e| NotifyError::InvalidTokenValue { reason: e.to_string() })?;
    Ok(())
}

fn malformed_escape(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();
    bytes.iter().enumerate().find_map(|(i, &b)| {
        let valid = b != b'%'
            || (bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit));
        (!valid).then_some(i)
    })
}
