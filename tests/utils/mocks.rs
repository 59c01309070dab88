use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use haptic_bridge::{OutboundFrame, SocketError, SocketWrapper};

// ============================================================================
// Mock Infrastructure
// ============================================================================

const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Socket backed by two channels; the test holds the other ends
pub struct MockSocket {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

/// The test's side of a mock socket
pub struct MockPeer {
    actions: Option<mpsc::UnboundedSender<String>>,
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
}

pub fn mock_socket() -> (Box<dyn SocketWrapper>, MockPeer) {
    let (actions, inbound) = mpsc::unbounded_channel();
    let (outbound, frames) = mpsc::unbounded_channel();
    (
        Box::new(MockSocket { inbound, outbound }),
        MockPeer {
            actions: Some(actions),
            frames,
        },
    )
}

impl MockPeer {
    pub fn send(&self, text: &str) {
        if let Some(actions) = &self.actions {
            let _ = actions.send(text.to_string());
        }
    }

    /// Closes the peer's side, as a browser closing the tab would
    pub fn disconnect(&mut self) {
        self.actions = None;
    }

    /// Next text frame, skipping heartbeats. None once the server closed.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            let frame = tokio::time::timeout(FRAME_TIMEOUT, self.frames.recv())
                .await
                .expect("timed out waiting for a frame")?;
            match frame {
                OutboundFrame::Text(text) => return Some(text),
                OutboundFrame::Close => return None,
                OutboundFrame::Ping => continue,
            }
        }
    }

    /// True once the server has closed this socket
    pub async fn closed_by_server(&mut self) -> bool {
        loop {
            match tokio::time::timeout(FRAME_TIMEOUT, self.frames.recv()).await {
                Ok(Some(OutboundFrame::Close)) | Ok(None) => return true,
                Ok(Some(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Nothing but heartbeats arrives within `window`
    pub async fn stays_quiet(&mut self, window: Duration) -> bool {
        loop {
            match tokio::time::timeout(window, self.frames.recv()).await {
                Err(_) => return true,
                Ok(Some(OutboundFrame::Ping)) => continue,
                Ok(_) => return false,
            }
        }
    }
}

#[async_trait]
impl SocketWrapper for MockSocket {
    async fn send_frame(&mut self, frame: OutboundFrame) -> Result<(), SocketError> {
        self.outbound
            .send(frame)
            .map_err(|_| SocketError::ConnectionClosed)
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        Ok(self.inbound.recv().await)
    }
}
