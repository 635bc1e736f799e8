//! API route definitions.

mod health;

use axum::extract::State;
use axum::http::{HeaderValue, Uri};
use axum::middleware;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use crate::auth::require_secret;
use crate::error::ApiError;
use crate::state::AppState;

/// Header naming the server instance on every response.
pub const SERVER_HEADER: &str = "x-meteostat-server";

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Public (no auth)
/// - `GET /` - Service name and version
/// - `GET /health` - Health check
///
/// ## Protected (secret header, when configured)
/// - `GET /ping` - Credential check, `?db=1` also checks the database
///
/// Data endpoints are mounted by the caller via [`Router::merge`] before the
/// result is served; everything except `/` and `/health` passes the secret
/// check, including unknown paths.
pub fn router(state: AppState) -> Router {
    with_endpoints(Router::new(), state)
}

/// Wrap `endpoints` with the built-in routes, the secret check and the
/// server-name header.
pub fn with_endpoints(endpoints: Router<AppState>, state: AppState) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health_check))
        .route("/ping", get(health::authenticated_ping))
        .merge(endpoints)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_secret))
        .layer(middleware::map_response_with_state(
            state.clone(),
            add_server_header,
        ))
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

/// Add `X-Meteostat-Server` to every response, errors included.
async fn add_server_header(State(state): State<AppState>, mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(state.config.server_name()) {
        response.headers_mut().insert(SERVER_HEADER, value);
    }
    response
}
