use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::room::RoomRegistry;
use crate::session::SessionSetProvider;

/// Point-in-time view of who is where, built fresh on every request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// session id -> participant id -> display name
    pub sessions: BTreeMap<String, BTreeMap<String, String>>,
    /// room token -> hardware connected
    pub rooms: BTreeMap<String, bool>,
}

/// Debugging aggregator over the session set and the room registry.
/// Holds no state of its own and caches nothing.
pub struct StatusReporter {
    registry: Arc<RoomRegistry>,
    sessions: Arc<dyn SessionSetProvider>,
}

impl StatusReporter {
    pub fn new(registry: Arc<RoomRegistry>, sessions: Arc<dyn SessionSetProvider>) -> Self {
        Self { registry, sessions }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let sessions = self
            .sessions
            .sessions()
            .await
            .into_iter()
            .map(|session| {
                let participants = session
                    .participants
                    .into_iter()
                    .map(|p| (p.id, p.display_name))
                    .collect();
                (session.id, participants)
            })
            .collect();

        let mut rooms = BTreeMap::new();
        for room in self.registry.rooms().await {
            rooms.insert(room.id().to_string(), room.hardware_connected().await);
        }

        debug!(rooms = rooms.len(), "Status snapshot built");
        StatusSnapshot { sessions, rooms }
    }
}
