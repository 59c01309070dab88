use async_trait::async_trait;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
    Json,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::models::RoomStatus;
use crate::shared::{isolate, AppError, AppState};
use crate::websockets::{Connection, KeepAlive, MessageHandler, OutboundFrame, SocketWrapper};

/// Registration channel
///
/// GET /room
/// Allocates a room for the connecting peer and keeps it alive for as long
/// as this connection stays open
pub async fn registration_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| isolate("registration", run_registration(Box::new(socket), state)))
}

/// Drives one registration connection from allocation to teardown
pub async fn run_registration(mut socket: Box<dyn SocketWrapper>, state: AppState) {
    let (outbound, outbound_receiver) = mpsc::unbounded_channel();

    let room = match state.registry.allocate(outbound.clone()).await {
        Ok(room) => room,
        Err(e) => {
            error!(error = %e, "Failed to allocate room");
            let _ = socket.send_frame(OutboundFrame::Close).await;
            return;
        }
    };
    let room_id = room.id().to_string();

    let keepalive = KeepAlive::start(outbound.clone(), state.config.keepalive_interval);
    room.announce();
    drop(outbound);

    let connection = Connection::new(
        format!("registration-{}", room_id),
        socket,
        outbound_receiver,
        Arc::new(RegistrationMessageHandler {
            room_id: room_id.clone(),
        }),
    );

    match connection.run().await {
        Ok(()) => info!(room_id = %room_id, "Registration connection closed"),
        Err(e) => warn!(room_id = %room_id, error = %e, "Registration connection error"),
    }

    room.teardown(&state.registry).await;
    keepalive.stop();
}

/// The registration peer has nothing to say after connecting
struct RegistrationMessageHandler {
    room_id: String,
}

#[async_trait]
impl MessageHandler for RegistrationMessageHandler {
    async fn handle_message(&self, message: String) {
        debug!(
            room_id = %self.room_id,
            message = %message,
            "Ignoring message on registration channel"
        );
    }
}

/// List rooms
///
/// GET /rooms
#[instrument(skip(state))]
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomStatus>> {
    let mut statuses = Vec::new();
    for room in state.registry.rooms().await {
        statuses.push(room.status().await);
    }
    Json(statuses)
}

/// Get one room
///
/// GET /rooms/{token}
#[instrument(skip(state))]
pub async fn get_room(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RoomStatus>, AppError> {
    let room = state
        .registry
        .lookup(&token)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", token)))?;
    Ok(Json(room.status().await))
}
