use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::room::{get_room, list_rooms, registration_handler};
use crate::shared::AppState;
use crate::websockets::{hardware_handler, remote_handler, status_handler};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Haptic bridge relay" }))
        // WebSocket channels
        .route("/room", get(registration_handler))
        .route("/room/:token", get(hardware_handler))
        .route("/remote/:token", get(remote_handler))
        .route("/status", get(status_handler))
        // Read-only room views
        .route("/rooms", get(list_rooms))
        .route("/rooms/:token", get(get_room))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
