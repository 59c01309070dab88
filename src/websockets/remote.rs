use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::handlers::reject;
use super::messages::{BuzzPayload, MessageType, WebSocketMessage};
use super::socket::{Connection, MessageHandler, OutboundFrame, SocketWrapper};
use crate::room::{RemoteIdentity, RemoteLease, Room};
use crate::session::Participant;
use crate::shared::{isolate, AppError, AppState};

/// Query parameters for the remote-control connection
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteQuery {
    pub session_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Remote-control channel for a peer inside a remote session
///
/// GET /remote/{token}?session_id=X&user_id=Y&display_name=Z
pub async fn remote_handler(
    ws: WebSocketUpgrade,
    Path(token): Path<String>,
    Query(query): Query<RemoteQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| isolate("remote", run_remote(Box::new(socket), token, query, state)))
}

/// Binds the remote identity to the room for the lifetime of the connection
pub async fn run_remote(
    socket: Box<dyn SocketWrapper>,
    token: String,
    query: RemoteQuery,
    state: AppState,
) {
    let identity = RemoteIdentity::new(query.user_id.clone());

    let (room, lease) = match bind(&state, &token, &identity).await {
        Ok(bound) => bound,
        Err(e) => {
            info!(room_id = %token, remote = %identity, error = %e, "Rejecting remote connection");
            reject(socket).await;
            return;
        }
    };

    state
        .session_set
        .join(
            &query.session_id,
            Participant {
                id: query.user_id.clone(),
                display_name: query.display_name.clone().unwrap_or_else(|| query.user_id.clone()),
            },
        )
        .await;

    let (outbound, outbound_receiver) = mpsc::unbounded_channel();
    let _ = outbound.send(OutboundFrame::Text(WebSocketMessage::bound(&token).to_json()));

    let room_closed = {
        let room = room.clone();
        let outbound = outbound.clone();
        tokio::spawn(async move {
            room.closed().await;
            debug!(room_id = %room.id(), "Room closed, closing remote connection");
            let _ = outbound.send(OutboundFrame::Close);
        })
    };

    let handler = Arc::new(RemoteCommandHandler {
        room: room.clone(),
        outbound,
        buzz_duration: state.config.buzz_duration,
    });
    let connection = Connection::new(
        format!("remote-{}-{}", token, identity),
        socket,
        outbound_receiver,
        handler,
    );
    if let Err(e) = connection.run().await {
        warn!(room_id = %token, remote = %identity, error = %e, "Remote connection error");
    }

    room_closed.abort();
    room.unbind_remote(&lease).await;
    state.session_set.leave(&query.session_id, &query.user_id).await;
}

async fn bind(
    state: &AppState,
    token: &str,
    identity: &RemoteIdentity,
) -> Result<(Room, RemoteLease), AppError> {
    let room = state
        .registry
        .lookup(token)
        .await
        .ok_or_else(|| AppError::InvalidToken(token.to_string()))?;
    let lease = room.bind_remote(identity.clone()).await?;
    Ok((room, lease))
}

struct RemoteCommandHandler {
    room: Room,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    buzz_duration: Duration,
}

impl RemoteCommandHandler {
    fn reply(&self, message: WebSocketMessage) {
        let _ = self.outbound.send(OutboundFrame::Text(message.to_json()));
    }

    async fn buzz(&self, payload: BuzzPayload) {
        let Some(client) = self.room.driver_client().await else {
            self.reply(WebSocketMessage::error("No hardware connected"));
            return;
        };

        let speed = payload.speed.unwrap_or(1.0);
        match client.vibrate_all(speed).await {
            Ok(devices) => {
                info!(room_id = %self.room.id(), devices, speed, "Buzz");
                let duration = self.buzz_duration;
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if let Err(e) = client.stop_all().await {
                        debug!(error = %e, "Could not stop devices after buzz");
                    }
                });
            }
            Err(e) => self.reply(WebSocketMessage::error(e.to_string())),
        }
    }

    async fn stop(&self) {
        let Some(client) = self.room.driver_client().await else {
            self.reply(WebSocketMessage::error("No hardware connected"));
            return;
        };
        if let Err(e) = client.stop_all().await {
            self.reply(WebSocketMessage::error(e.to_string()));
        }
    }
}

#[async_trait]
impl MessageHandler for RemoteCommandHandler {
    async fn handle_message(&self, message: String) {
        match serde_json::from_str::<WebSocketMessage>(&message) {
            Ok(ws_message) => match ws_message.message_type {
                MessageType::Buzz => {
                    let payload = serde_json::from_value(ws_message.payload).unwrap_or_default();
                    self.buzz(payload).await;
                }
                MessageType::Stop => self.stop().await,
                _ => {
                    debug!(
                        message_type = ?ws_message.message_type,
                        "Unhandled message type"
                    );
                }
            },
            Err(e) => {
                warn!(
                    room_id = %self.room.id(),
                    error = %e,
                    "Failed to parse remote message"
                );
                self.reply(WebSocketMessage::error("Malformed message"));
            }
        }
    }
}
