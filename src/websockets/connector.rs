use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::keepalive::KeepAlive;
use super::socket::{Connection, MessageHandler, OutboundFrame, SocketWrapper};
use crate::protocol::{encode_frame, parse_frame, ProtocolMessage};

/// Events a connector surfaces to whoever owns it
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Message(ProtocolMessage),
    Disconnected,
}

struct PendingTransport {
    socket: Box<dyn SocketWrapper>,
    outbound_receiver: mpsc::UnboundedReceiver<OutboundFrame>,
}

/// Turns one raw socket into a typed stream of protocol messages plus a send
/// operation. Holds no business logic.
///
/// Once disconnected a connector stays disconnected; a new connection attempt
/// needs a new connector.
pub struct ForwardingConnector {
    id: Uuid,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ConnectorEvent>,
    pending: Mutex<Option<PendingTransport>>,
    keepalive_interval: Duration,
}

impl ForwardingConnector {
    pub fn new(
        socket: Box<dyn SocketWrapper>,
        keepalive_interval: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectorEvent>) {
        let (outbound, outbound_receiver) = mpsc::unbounded_channel();
        let (events, event_receiver) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            id: Uuid::new_v4(),
            outbound,
            connected: Arc::new(AtomicBool::new(true)),
            events,
            pending: Mutex::new(Some(PendingTransport {
                socket,
                outbound_receiver,
            })),
            keepalive_interval,
        });
        (connector, event_receiver)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Starts pumping the socket. Only the first call does anything.
    pub fn listen(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let transport = self.pending.lock().ok().and_then(|mut pending| pending.take())?;

        info!(connector_id = %self.id, "Starting forwarder listener");
        let connector = Arc::clone(self);
        Some(tokio::spawn(async move {
            let keepalive = KeepAlive::start(connector.outbound.clone(), connector.keepalive_interval);
            let handler = Arc::new(InboundFrameHandler {
                connector_id: connector.id,
                events: connector.events.clone(),
            });
            let connection = Connection::new(
                format!("forwarder-{}", connector.id),
                transport.socket,
                transport.outbound_receiver,
                handler,
            );

            match connection.run().await {
                Ok(()) => info!(connector_id = %connector.id, "Local side disconnected"),
                Err(e) => error!(connector_id = %connector.id, error = %e, "Error in forwarder connection"),
            }

            keepalive.stop();
            connector.mark_disconnected();
        }))
    }

    /// Sends one message to the peer. Best effort: silently dropped once
    /// the peer is gone.
    pub fn send(&self, message: &ProtocolMessage) {
        if !self.is_connected() {
            debug!(connector_id = %self.id, "Dropping send on disconnected connector");
            return;
        }
        let _ = self.outbound.send(OutboundFrame::Text(encode_frame(message)));
    }

    /// Resolves immediately. The connector lives exactly as long as its
    /// socket; the relay never shuts it down.
    pub async fn disconnect(&self) {}

    /// Asks the pump to close the socket from the server side
    pub fn close_transport(&self) {
        if self.is_connected() {
            let _ = self.outbound.send(OutboundFrame::Close);
        }
    }

    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(ConnectorEvent::Disconnected);
        }
    }
}

struct InboundFrameHandler {
    connector_id: Uuid,
    events: mpsc::UnboundedSender<ConnectorEvent>,
}

#[async_trait]
impl MessageHandler for InboundFrameHandler {
    async fn handle_message(&self, message: String) {
        match parse_frame(&message) {
            Ok(messages) => {
                for message in messages {
                    debug!(
                        connector_id = %self.connector_id,
                        message_type = %message.type_name(),
                        id = message.id(),
                        "Forwarded message received"
                    );
                    let _ = self.events.send(ConnectorEvent::Message(message));
                }
            }
            Err(e) => {
                warn!(
                    connector_id = %self.connector_id,
                    error = %e,
                    "Dropping malformed frame"
                );
            }
        }
    }
}
