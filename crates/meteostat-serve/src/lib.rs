//! Meteostat Serve - JSON API gateway for Meteostat weather data
//!
//! This crate provides the request gateway in front of the weather data
//! endpoints: layered configuration, an optional shared-secret check, typed
//! query parameters, a lazily-connected SQL engine and cache-aware JSON
//! responses. An offline janitor prunes the on-disk data cache.
//!
//! # Authentication
//!
//! When `secret.name` and `secret.value` are both configured, every request
//! except `/` and `/health` must carry that header with that value. Without
//! them, requests are let through.
//!
//! # Architecture
//!
//! - **Config**: INI file at `~/.meteostat-server/config.ini`, overridden by environment variables
//! - **AppState**: Shared application state (config snapshot, database engine)
//! - **Auth**: Secret header middleware for request authentication
//! - **Params / Response**: Typed parameter decoding and Cache-Control handling
//! - **Routes**: Built-in endpoints and the middleware stack

pub mod auth;
pub mod config;
pub mod database;
mod error;
pub mod janitor;
pub mod params;
pub mod response;
mod routes;
mod state;

pub use self::config::{ConfigResolver, ConfigSnapshot};
pub use self::database::{ConnectionDescriptor, DbError, Engine};
pub use self::error::ApiError;
pub use self::routes::{router, with_endpoints, SERVER_HEADER};
pub use self::state::AppState;
