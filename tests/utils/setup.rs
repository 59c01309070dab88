use std::time::Duration;
use tokio::task::JoinHandle;

use haptic_bridge::websockets::{run_hardware_relay, run_remote, RemoteQuery};
use haptic_bridge::{room::run_registration, AppState, ServerConfig};

use super::mocks::{mock_socket, MockPeer};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub const TEST_BUZZ_DURATION: Duration = Duration::from_millis(50);

pub struct TestSetup {
    pub state: AppState,
}

/// A peer plus the task serving it
pub struct ConnectedPeer {
    pub peer: MockPeer,
    pub task: JoinHandle<()>,
}

impl ConnectedPeer {
    /// Closes the peer's side and waits for the server to finish with it
    pub async fn disconnect(mut self) -> MockPeer {
        self.peer.disconnect();
        self.task.await.expect("connection task panicked");
        self.peer
    }
}

pub struct RegisteredRoom {
    pub token: String,
    pub registration: ConnectedPeer,
}

impl TestSetup {
    pub fn new() -> Self {
        let config = ServerConfig {
            keepalive_interval: Duration::from_secs(3600),
            buzz_duration: TEST_BUZZ_DURATION,
            ..ServerConfig::default()
        };
        Self {
            state: AppState::new(config),
        }
    }

    /// Opens a registration connection and reads back the announced token
    pub async fn register(&self) -> RegisteredRoom {
        let (socket, mut peer) = mock_socket();
        let task = tokio::spawn(run_registration(socket, self.state.clone()));

        let announcement = peer.next_text().await.expect("room announcement");
        let value: serde_json::Value = serde_json::from_str(&announcement).expect("json");
        let token = value["room"].as_str().expect("room token").to_string();

        RegisteredRoom {
            token,
            registration: ConnectedPeer { peer, task },
        }
    }

    pub fn attach_hardware(&self, token: &str) -> ConnectedPeer {
        let (socket, peer) = mock_socket();
        let task = tokio::spawn(run_hardware_relay(
            socket,
            token.to_string(),
            self.state.clone(),
        ));
        ConnectedPeer { peer, task }
    }

    pub fn connect_remote(&self, token: &str, session_id: &str, user_id: &str) -> ConnectedPeer {
        let (socket, peer) = mock_socket();
        let query = RemoteQuery {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            display_name: Some(format!("{} (display)", user_id)),
        };
        let task = tokio::spawn(run_remote(
            socket,
            token.to_string(),
            query,
            self.state.clone(),
        ));
        ConnectedPeer { peer, task }
    }
}
