use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rr_domain::config::Config;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::relay::Broker;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub broker: Arc<Broker>,
    /// One permit per open WebSocket, streamer or client.
    connections: Arc<Semaphore>,
}

impl AppState {
    /// Build the state for a relay guarding the streamer with `password`.
    pub fn new(config: Arc<Config>, password: impl Into<String>) -> Self {
        let broker = Broker::new(
            password,
            config.relay.api_version.clone(),
            config.relay.request_timeout(),
        );
        let connections = Arc::new(Semaphore::new(config.server.max_connections));
        Self {
            config,
            broker: Arc::new(broker),
            connections,
        }
    }

    /// Reserve a connection slot for the lifetime of one WebSocket.
    /// `None` once `server.max_connections` sockets are open.
    pub fn try_acquire_connection(&self) -> Option<OwnedSemaphorePermit> {
        match self.connections.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(
                    max_connections = self.config.server.max_connections,
                    "rejecting WebSocket upgrade, connection limit reached"
                );
                None
            }
        }
    }

    pub fn open_connections(&self) -> usize {
        self.config.server.max_connections - self.connections.available_permits()
    }
}

/// Response for an upgrade refused by the connection limit.
pub fn too_many_connections() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response()
}
