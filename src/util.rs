//! Shared utility functions.

use axum::http::HeaderMap;

use crate::error::{AppError, Result};

const SECONDS_PER_DAY: i64 = 86400;

/// Expiry timestamp `days` after `base_time`, if any. Rejects day counts
/// that overflow a Unix timestamp.
pub fn expires_after_days(days: Option<i64>, base_time: i64) -> Result<Option<i64>> {
    let Some(days) = days else {
        return Ok(None);
    };
    days.checked_mul(SECONDS_PER_DAY)
        .and_then(|secs| base_time.checked_add(secs))
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("expires_in_days out of range: {}", days)))
}

/// Extract client IP address and user-agent from request headers.
///
/// Takes the first hop of `x-forwarded-for` (the original client), falling
/// back to `x-real-ip`.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
