//! Shared-secret header authentication.
//!
//! Enforcement is opt-in: a request is only checked when both `secret.name`
//! and `secret.value` are configured and `secret.disable` is not true. The
//! root and health endpoints are always open.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::config::ConfigSnapshot;
use crate::error::ApiError;
use crate::state::AppState;

/// Paths that never require the secret header.
pub const EXEMPT_PATHS: [&str; 2] = ["/", "/health"];

/// Outcome of the secret check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Exempt path.
    Exempt,
    /// Checking turned off via `secret.disable`.
    Disabled,
    /// Secret name or value not configured.
    Unconfigured,
    /// Header present and equal to the configured value.
    Accepted,
    /// Header missing or different.
    Rejected,
}

impl AuthDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Decide whether a request may proceed.
pub fn evaluate(path: &str, headers: &HeaderMap, config: &ConfigSnapshot) -> AuthDecision {
    if EXEMPT_PATHS.contains(&path) {
        return AuthDecision::Exempt;
    }

    if config.get_bool("secret", "disable").unwrap_or(false) {
        return AuthDecision::Disabled;
    }

    let (Some(name), Some(expected)) = (
        config.get_non_empty("secret", "name"),
        config.get_non_empty("secret", "value"),
    ) else {
        return AuthDecision::Unconfigured;
    };

    // An illegal header name can never be sent, so nothing matches it.
    let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
        tracing::warn!(header = %name, "configured secret header name is invalid");
        return AuthDecision::Rejected;
    };

    match headers.get(&header) {
        Some(value) if bool::from(value.as_bytes().ct_eq(expected.as_bytes())) => {
            AuthDecision::Accepted
        }
        _ => AuthDecision::Rejected,
    }
}

/// Middleware enforcing the secret header on every non-exempt path.
pub async fn require_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let decision = evaluate(request.uri().path(), request.headers(), &state.config);

    if !decision.is_allowed() {
        tracing::debug!(path = %request.uri().path(), "missing or invalid secret header");
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
