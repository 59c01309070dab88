use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::{MessageKind, ProtocolMessage};
use super::server::ProtocolServer;
use crate::room::Room;
use crate::websockets::{ConnectorEvent, ForwardingConnector};

/// What a relay saw over its lifetime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayOutcome {
    pub inbound_relayed: usize,
    pub unprompted_relayed: usize,
    /// Whether the peer ever sent its handshake request
    pub remote_acknowledged: bool,
}

/// Binds a forwarding connector to an embedded server. Frames from the local
/// peer go into the server and its replies go back out; whatever the server
/// emits on its own is carried to the local peer as well.
pub struct RelayServer {
    room: Room,
    connection_id: Uuid,
    connector: Arc<ForwardingConnector>,
    server: Arc<dyn ProtocolServer>,
    unprompted: broadcast::Receiver<ProtocolMessage>,
    outcome: RelayOutcome,
}

impl RelayServer {
    /// Subscribes to the server right away so nothing it emits during the
    /// driver handshake is missed
    pub fn new(
        room: Room,
        connection_id: Uuid,
        connector: Arc<ForwardingConnector>,
        server: Arc<dyn ProtocolServer>,
    ) -> Self {
        let unprompted = server.subscribe();
        Self {
            room,
            connection_id,
            connector,
            server,
            unprompted,
            outcome: RelayOutcome::default(),
        }
    }

    /// Relays until the connector disconnects, then detaches this relay's
    /// hardware connection from the room
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ConnectorEvent>) -> RelayOutcome {
        info!(
            room_id = %self.room.id(),
            connection_id = %self.connection_id,
            server = %self.server.name(),
            "Relay started"
        );

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(ConnectorEvent::Message(message)) => self.relay_inbound(message).await,
                    Some(ConnectorEvent::Disconnected) | None => break,
                },

                message = self.unprompted.recv() => match message {
                    Ok(message) => {
                        debug!(message_type = %message.type_name(), "Relaying server message");
                        self.connector.send(&message);
                        self.outcome.unprompted_relayed += 1;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(room_id = %self.room.id(), skipped, "Relay fell behind embedded server");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.room.detach_connection(self.connection_id).await;
        self.connector.disconnect().await;

        info!(
            room_id = %self.room.id(),
            connection_id = %self.connection_id,
            inbound = self.outcome.inbound_relayed,
            unprompted = self.outcome.unprompted_relayed,
            "Relay finished"
        );
        self.outcome
    }

    async fn relay_inbound(&mut self, message: ProtocolMessage) {
        if message.is(MessageKind::RequestServerInfo) && !self.outcome.remote_acknowledged {
            self.outcome.remote_acknowledged = true;
            info!(room_id = %self.room.id(), "Remote connected");
        }

        self.outcome.inbound_relayed += 1;
        if let Some(reply) = self.server.handle_message(message).await {
            self.connector.send(&reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_frame, parse_frame, DriverClient, ForwardedDeviceServer};
    use crate::room::HardwareConnection;
    use crate::websockets::socket::test_utils::mock_socket;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_requests_are_answered_and_commands_forwarded() {
        let (registration, _status) = mpsc::unbounded_channel();
        let room = Room::new("ab12cd".to_string(), registration);
        let connection_id = room.reserve_hardware().await.unwrap();

        let (socket, mut peer) = mock_socket();
        let (connector, events) = ForwardingConnector::new(socket, Duration::from_secs(10));
        connector.listen();

        let server: Arc<dyn ProtocolServer> = Arc::new(ForwardedDeviceServer::new("Remote Server"));
        let relay = RelayServer::new(room.clone(), connection_id, connector.clone(), server.clone());
        let relay_task = tokio::spawn(relay.run(events));

        let client = Arc::new(DriverClient::new("Test Client", server.clone()));
        client.connect().await.unwrap();
        room.attach_hardware(HardwareConnection {
            connection_id,
            server,
            client: client.clone(),
            connector,
        })
        .await
        .unwrap();

        // Scanning request reaches the local peer
        let scanning = parse_frame(&peer.next_text().await.unwrap()).unwrap();
        assert!(scanning[0].is(MessageKind::StartScanning));

        // Local peer handshakes and announces a device
        peer.send(&encode_frame(&ProtocolMessage::new(
            MessageKind::RequestServerInfo,
            1,
            json!({ "ClientName": "Forwarder" }),
        )));
        let info = parse_frame(&peer.next_text().await.unwrap()).unwrap();
        assert!(info[0].is(MessageKind::ServerInfo));

        peer.send(&encode_frame(&ProtocolMessage::new(
            MessageKind::DeviceAdded,
            2,
            json!({
                "DeviceIndex": 0,
                "DeviceName": "Test Vibrator",
                "DeviceMessages": { "VibrateCmd": { "FeatureCount": 1 } },
            }),
        )));
        let ok = parse_frame(&peer.next_text().await.unwrap()).unwrap();
        assert!(ok[0].is(MessageKind::Ok));
        assert_eq!(ok[0].id(), 2);

        // Driver command travels to the local peer
        client.vibrate_all(0.5).await.unwrap();
        let command = parse_frame(&peer.next_text().await.unwrap()).unwrap();
        assert!(command[0].is(MessageKind::VibrateCmd));
        assert_eq!(command[0].device_index(), Some(0));

        drop(peer);
        let outcome = relay_task.await.unwrap();

        assert!(outcome.remote_acknowledged);
        assert_eq!(outcome.inbound_relayed, 2);
        assert!(!room.hardware_connected().await);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_before_attach_frees_reservation() {
        let (registration, _status) = mpsc::unbounded_channel();
        let room = Room::new("ab12cd".to_string(), registration);
        let connection_id = room.reserve_hardware().await.unwrap();

        let (socket, peer) = mock_socket();
        let (connector, events) = ForwardingConnector::new(socket, Duration::from_secs(10));
        connector.listen();
        let server: Arc<dyn ProtocolServer> = Arc::new(ForwardedDeviceServer::new("Remote Server"));
        let relay = RelayServer::new(room.clone(), connection_id, connector, server);

        drop(peer);
        let outcome = relay.run(events).await;

        assert!(!outcome.remote_acknowledged);
        assert!(room.reserve_hardware().await.is_ok());
    }
}
