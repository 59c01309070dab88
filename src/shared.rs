use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::config::ServerConfig;
use crate::room::registry::RoomRegistry;
use crate::session::{InMemorySessionSet, SessionSetProvider};
use crate::status::StatusReporter;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub session_set: Arc<InMemorySessionSet>,
    pub status_reporter: Arc<StatusReporter>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let session_set = Arc::new(InMemorySessionSet::new());
        let sessions: Arc<dyn SessionSetProvider> = session_set.clone();
        let status_reporter = Arc::new(StatusReporter::new(registry.clone(), sessions));

        Self {
            registry,
            session_set,
            status_reporter,
            config: Arc::new(config),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Already bound: {0}")]
    AlreadyBound(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidToken(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::AlreadyBound(msg) => (StatusCode::CONFLICT, msg),
            AppError::TransportError(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("Transport error: {}", msg),
            ),
            AppError::ProtocolError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

/// Runs one connection's work in its own task so a panic there is logged
/// and contained instead of reaching sibling connections.
pub async fn isolate<F>(label: &'static str, work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(work).await {
        error!(connection = label, error = %e, "Connection task failed");
    }
}
