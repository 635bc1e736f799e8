//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::config::ConfigSnapshot;
use crate::database::Engine;

/// Shared application state available to all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Configuration resolved at startup.
    pub config: Arc<ConfigSnapshot>,

    /// Lazily-connected database engine.
    pub engine: Arc<Engine>,
}

impl AppState {
    /// Create a new application state from a configuration snapshot.
    pub fn new(config: ConfigSnapshot) -> Self {
        let engine = Engine::from_snapshot(&config);

        tracing::info!(
            server_name = %config.server_name(),
            database = %engine.descriptor(),
            secret_header = config.get_non_empty("secret", "name").unwrap_or("<none>"),
            "application state initialized"
        );

        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}
