use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Frames the application writes to a socket
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    /// Transport-level heartbeat
    Ping,
    /// Close the connection from the server side
    Close,
}

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), SocketError>;

    /// Receive the next text message from the peer (None if connection closed)
    async fn receive_message(&mut self) -> Result<Option<String>, SocketError>;
}

/// Handler for incoming WebSocket messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, message: String);
}

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), SocketError> {
        let message = match frame {
            OutboundFrame::Text(text) => Message::Text(text),
            OutboundFrame::Ping => Message::Ping(Vec::new()),
            OutboundFrame::Close => Message::Close(None),
        };
        self.send(message)
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("Dropping non UTF-8 binary frame"),
                },
                // axum answers pings itself; pongs only prove liveness
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

/// Connection represents a managed WebSocket connection
/// It pumps frames from the outbound channel to the socket and hands inbound
/// messages to the handler, one at a time and in arrival order
pub struct Connection {
    label: String,
    socket: Box<dyn SocketWrapper>,
    outbound_receiver: mpsc::UnboundedReceiver<OutboundFrame>,
    message_handler: Arc<dyn MessageHandler>,
}

impl Connection {
    pub fn new(
        label: impl Into<String>,
        socket: Box<dyn SocketWrapper>,
        outbound_receiver: mpsc::UnboundedReceiver<OutboundFrame>,
        message_handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            label: label.into(),
            socket,
            outbound_receiver,
            message_handler,
        }
    }

    /// Run the connection - handles both sending and receiving until disconnect
    pub async fn run(mut self) -> Result<(), SocketError> {
        loop {
            tokio::select! {
                // Handle outbound messages (from our app to client)
                frame = self.outbound_receiver.recv() => {
                    match frame {
                        Some(OutboundFrame::Close) => {
                            debug!(connection = %self.label, "Closing connection from server side");
                            break;
                        }
                        Some(frame) => self.socket.send_frame(frame).await?,
                        None => break,
                    }
                }

                // Handle inbound messages (from client to our app)
                message = self.socket.receive_message() => {
                    match message? {
                        Some(message) => self.message_handler.handle_message(message).await,
                        None => {
                            debug!(connection = %self.label, "Peer closed connection");
                            return Ok(());
                        }
                    }
                }
            }
        }

        // Clean disconnect
        let _ = self.socket.send_frame(OutboundFrame::Close).await;
        Ok(())
    }
}
