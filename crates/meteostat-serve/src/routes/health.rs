//! Root, health check and ping endpoints.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::params::{self, ParamKind, ParamSpec, ParamValue, RawParams};
use crate::response::{json_response, ttl};
use crate::state::AppState;

/// Root response identifying the service.
#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    app: &'static str,
    version: &'static str,
}

/// `GET /`
pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        app: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Public health check endpoint.
///
/// Returns basic service health without authentication.
/// Use this for load balancer health probes.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Authenticated ping response.
#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

const PING_PARAMS: &[ParamSpec] = &[ParamSpec::new(
    "db",
    ParamKind::Bool,
    ParamValue::Bool(false),
)];

/// `GET /ping[?db=1]`
///
/// Confirms the secret header is accepted. With `db` set, also runs a
/// trivial query to confirm the database is reachable.
pub async fn authenticated_ping(
    State(state): State<AppState>,
    Query(raw): Query<RawParams>,
) -> Result<Response, ApiError> {
    let args = params::decode(PING_PARAMS, &raw)?;

    let database = match args.get("db").and_then(ParamValue::as_bool) {
        Some(true) => {
            state.engine.query("SELECT 1 AS ok", &HashMap::new()).await?;
            Some("ok")
        }
        _ => None,
    };

    json_response(
        &PingResponse {
            message: "pong",
            database,
        },
        ttl::NONE,
    )
}
