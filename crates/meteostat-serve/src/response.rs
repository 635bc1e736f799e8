//! JSON responses with Cache-Control derived from a freshness window.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::ApiError;

/// Cache-Control for responses that must not be stored.
pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Common freshness windows, in seconds.
pub mod ttl {
    /// Never cached.
    pub const NONE: u64 = 0;

    /// Recent observations that change within the hour.
    pub const HOUR: u64 = 60 * 60;

    /// Historical series and station metadata.
    pub const DAY: u64 = 60 * 60 * 24;
}

/// Clamp a signed freshness (seconds) to a valid window; negatives become 0.
pub fn freshness_from_secs(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}

/// Cache-Control header value for a freshness window.
pub fn cache_control(freshness: u64) -> String {
    if freshness == 0 {
        NO_CACHE.to_string()
    } else {
        format!("public, must-revalidate, max-age={freshness}")
    }
}

/// Serialize `payload` as a JSON response cacheable for `freshness` seconds.
///
/// A zero freshness marks the response as uncacheable, including the legacy
/// `Pragma: no-cache` for HTTP/1.0 intermediaries.
pub fn json_response<T: Serialize>(payload: &T, freshness: u64) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(payload)?;

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(&cache_control(freshness)) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if freshness == 0 {
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    }

    Ok(response)
}
