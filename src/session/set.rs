use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A user inside a remote session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
}

/// One live remote session and who is in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub participants: Vec<Participant>,
}

/// Read-only view of the live remote sessions
#[async_trait]
pub trait SessionSetProvider: Send + Sync {
    async fn sessions(&self) -> Vec<SessionInfo>;
}

struct Member {
    participant: Participant,
    connections: usize,
}

/// In-memory session set fed by the remote-control channel. A participant
/// joined over several connections stays listed until the last one leaves.
pub struct InMemorySessionSet {
    // session id -> members, in join order
    sessions: RwLock<BTreeMap<String, Vec<Member>>>,
}

impl InMemorySessionSet {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn join(&self, session_id: &str, participant: Participant) {
        let mut sessions = self.sessions.write().await;
        let members = sessions.entry(session_id.to_string()).or_default();
        if let Some(existing) = members
            .iter_mut()
            .find(|m| m.participant.id == participant.id)
        {
            existing.participant.display_name = participant.display_name;
            existing.connections += 1;
            return;
        }

        info!(
            session_id = %session_id,
            participant_id = %participant.id,
            display_name = %participant.display_name,
            "Participant joined session"
        );
        members.push(Member {
            participant,
            connections: 1,
        });
    }

    /// Drops one connection of a participant, removing the participant with
    /// its last one; a session left empty is dropped
    pub async fn leave(&self, session_id: &str, participant_id: &str) {
        let mut sessions = self.sessions.write().await;
        let Some(members) = sessions.get_mut(session_id) else {
            return;
        };
        let Some(position) = members
            .iter()
            .position(|m| m.participant.id == participant_id)
        else {
            return;
        };

        members[position].connections -= 1;
        if members[position].connections > 0 {
            return;
        }
        members.remove(position);
        info!(session_id = %session_id, participant_id = %participant_id, "Participant left session");

        if members.is_empty() {
            sessions.remove(session_id);
            debug!(session_id = %session_id, "Session closed");
        }
    }
}

impl Default for InMemorySessionSet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionSetProvider for InMemorySessionSet {
    async fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, members)| SessionInfo {
                id: id.clone(),
                participants: members.iter().map(|m| m.participant.clone()).collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str, name: &str) -> Participant {
        Participant {
            id: id.to_string(),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let set = InMemorySessionSet::new();
        set.join("space-1", participant("u1", "Alice")).await;
        set.join("space-1", participant("u2", "Bob")).await;
        set.join("space-2", participant("u3", "Carol")).await;

        let sessions = set.sessions().await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].participants.len(), 2);

        set.leave("space-2", "u3").await;
        let sessions = set.sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "space-1");
    }

    #[tokio::test]
    async fn test_rejoin_updates_display_name() {
        let set = InMemorySessionSet::new();
        set.join("space-1", participant("u1", "Alice")).await;
        set.join("space-1", participant("u1", "Alice B")).await;

        let sessions = set.sessions().await;
        assert_eq!(sessions[0].participants, vec![participant("u1", "Alice B")]);
    }

    #[tokio::test]
    async fn test_participant_stays_until_last_connection_leaves() {
        let set = InMemorySessionSet::new();
        set.join("space-1", participant("u1", "Alice")).await;
        set.join("space-1", participant("u1", "Alice")).await;

        set.leave("space-1", "u1").await;
        let sessions = set.sessions().await;
        assert_eq!(sessions[0].participants, vec![participant("u1", "Alice")]);

        set.leave("space-1", "u1").await;
        assert!(set.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_unknown_is_noop() {
        let set = InMemorySessionSet::new();
        set.leave("nowhere", "nobody").await;
        assert!(set.sessions().await.is_empty());
    }
}
