use async_trait::async_trait;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::connector::ForwardingConnector;
use super::socket::{Connection, MessageHandler, OutboundFrame, SocketWrapper};
use crate::protocol::message::SYSTEM_MESSAGE_ID;
use crate::protocol::{
    encode_frame, DriverClient, ErrorCode, ForwardedDeviceServer, ProtocolMessage, ProtocolServer,
    RelayServer,
};
use crate::room::{token, HardwareConnection, Room};
use crate::shared::{isolate, AppError, AppState};
use crate::status::StatusReporter;

const DRIVER_CLIENT_NAME: &str = "Bridge Driver Client";

/// Text of the error frame sent before a rejected connection is closed
pub const REJECTION_MESSAGE: &str = "Invalid connection request!";

/// Hardware relay channel for the local peer
///
/// GET /room/{token}
pub async fn hardware_handler(
    ws: WebSocketUpgrade,
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| isolate("hardware", run_hardware_relay(Box::new(socket), token, state)))
}

/// Validates the token, claims the room's hardware slot, then relays frames
/// until the local peer goes away
pub async fn run_hardware_relay(socket: Box<dyn SocketWrapper>, token: String, state: AppState) {
    info!(room_id = %token, "Connection to room requested");

    let (room, reservation) = match claim_hardware_slot(&state, &token).await {
        Ok(claim) => claim,
        Err(e) => {
            info!(room_id = %token, error = %e, "Rejecting hardware connection");
            reject(socket).await;
            return;
        }
    };

    let (connector, events) = ForwardingConnector::new(socket, state.config.keepalive_interval);
    connector.listen();

    let server: Arc<dyn ProtocolServer> =
        Arc::new(ForwardedDeviceServer::new(state.config.server_name.clone()));
    let relay = RelayServer::new(room.clone(), reservation, connector.clone(), server.clone());
    let relay_task = tokio::spawn(relay.run(events));

    let client = Arc::new(DriverClient::new(DRIVER_CLIENT_NAME, server.clone()));
    match client.connect().await {
        Ok(()) => {
            let hardware = HardwareConnection {
                connection_id: reservation,
                server,
                client: client.clone(),
                connector: connector.clone(),
            };
            if let Err(e) = room.attach_hardware(hardware).await {
                warn!(room_id = %token, error = %e, "Room went away during handshake");
                client.disconnect().await;
                connector.close_transport();
            }
        }
        Err(e) => {
            warn!(room_id = %token, error = %e, "Driver handshake failed");
            room.release_reservation(reservation).await;
            connector.close_transport();
        }
    }

    match relay_task.await {
        Ok(outcome) => info!(
            room_id = %token,
            remote_acknowledged = outcome.remote_acknowledged,
            "Hardware connection finished"
        ),
        Err(e) => error!(room_id = %token, error = %e, "Relay task failed"),
    }
}

#[instrument(skip(state))]
async fn claim_hardware_slot(state: &AppState, token: &str) -> Result<(Room, Uuid), AppError> {
    if !token::is_well_formed(token) {
        return Err(AppError::InvalidToken(token.to_string()));
    }
    let room = state.registry.lookup(token).await.ok_or_else(|| {
        info!(room_id = %token, "No such room");
        AppError::InvalidToken(token.to_string())
    })?;
    let reservation = room.reserve_hardware().await?;
    Ok((room, reservation))
}

/// Sends the single array-wrapped error message, then closes
pub async fn reject(mut socket: Box<dyn SocketWrapper>) {
    let message = ProtocolMessage::error(SYSTEM_MESSAGE_ID, REJECTION_MESSAGE, ErrorCode::Init);
    if let Err(e) = socket.send_frame(OutboundFrame::Text(encode_frame(&message))).await {
        debug!(error = %e, "Could not deliver rejection");
    }
    let _ = socket.send_frame(OutboundFrame::Close).await;
}

/// Status channel: every inbound message is answered with a fresh snapshot
///
/// GET /status
pub async fn status_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| isolate("status", run_status(Box::new(socket), state)))
}

pub async fn run_status(socket: Box<dyn SocketWrapper>, state: AppState) {
    let (outbound, outbound_receiver) = mpsc::unbounded_channel();
    let handler = Arc::new(StatusRequestHandler {
        reporter: state.status_reporter.clone(),
        outbound,
    });

    if let Err(e) = Connection::new("status", socket, outbound_receiver, handler)
        .run()
        .await
    {
        warn!(error = %e, "Status connection error");
    }
}

struct StatusRequestHandler {
    reporter: Arc<StatusReporter>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

#[async_trait]
impl MessageHandler for StatusRequestHandler {
    async fn handle_message(&self, _message: String) {
        let snapshot = self.reporter.snapshot().await;
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                let _ = self.outbound.send(OutboundFrame::Text(json));
            }
            Err(e) => error!(error = %e, "Failed to serialize status snapshot"),
        }
    }
}
