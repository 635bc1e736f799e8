//! API error types and response formatting.
//!
//! Every error renders as `{"error": <code>, "message": <text>}`. Client
//! errors name what was wrong. Server-side details are logged and replaced
//! by a generic message, except for a query referencing an undeclared
//! parameter, which is a handler bug and is reported by name.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::database::DbError;
use crate::params::ParamError;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Secret header missing or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// No route for the path.
    #[error("not found: {0}")]
    NotFound(String),

    /// A query parameter did not coerce to its declared kind.
    #[error("bad request: {0}")]
    InvalidParameter(#[from] ParamError),

    /// Database unreachable, query failure or handler/query mismatch.
    #[error("database error: {0}")]
    Database(#[from] DbError),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::Database(err) if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Database(DbError::MissingParameter(_)) => "undeclared_parameter",
            Self::Database(DbError::UnsupportedBackend(_)) => "database_misconfigured",
            Self::Database(err) if err.is_unavailable() => "database_unavailable",
            Self::Database(_) => "database_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Text safe to show the client.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized => "missing or invalid secret header".to_string(),
            Self::NotFound(path) => format!("no endpoint at {path}"),
            Self::InvalidParameter(err) => err.to_string(),
            Self::Database(DbError::MissingParameter(name)) => {
                format!("query references undeclared parameter ':{name}'")
            }
            Self::Database(err) if err.is_unavailable() => {
                "the weather database is unavailable".to_string()
            }
            Self::Database(_) => "the weather database query failed".to_string(),
            Self::Serialization(_) | Self::Internal(_) => "an internal error occurred".to_string(),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamKind;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401() {
        let (status, body) = body_json(ApiError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn param_error_names_the_parameter() {
        let err: ApiError = ParamError::Invalid {
            name: "lat".into(),
            kind: ParamKind::Float,
            raw: "north".into(),
        }
        .into();

        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_parameter");
        assert_eq!(
            body["message"],
            "invalid value for 'lat': expected float, got 'north'"
        );
    }

    #[tokio::test]
    async fn undeclared_query_parameter_is_reported_by_name() {
        let err = ApiError::from(DbError::MissingParameter("station".into()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "undeclared_parameter");
        assert_eq!(
            body["message"],
            "query references undeclared parameter ':station'"
        );
    }

    #[tokio::test]
    async fn unreachable_database_is_503() {
        let err = ApiError::from(DbError::Query(sqlx::Error::PoolTimedOut));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "database_unavailable");
    }

    #[tokio::test]
    async fn query_failure_hides_details() {
        let err = ApiError::from(DbError::Query(sqlx::Error::Protocol(
            "secret table layout".into(),
        )));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "database_error");
        assert!(!body["message"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn unsupported_backend_is_a_configuration_error() {
        let err = ApiError::from(DbError::UnsupportedBackend("oracle://db".into()));
        assert_eq!(err.code(), "database_misconfigured");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_display_not_found() {
        let err = ApiError::NotFound("/stations/x".to_string());
        assert_eq!(err.to_string(), "not found: /stations/x");
    }
}
