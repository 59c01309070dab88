use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::protocol::{DriverClient, ProtocolServer};
use crate::websockets::ForwardingConnector;

/// Identity of a remote peer (for example a VR session user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteIdentity(String);

impl RemoteIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which remote peer, if any, a room is linked to.
///
/// One identity may hold the binding over several connections; it is
/// released when the last of them closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBinding {
    Unbound,
    BoundTo {
        identity: RemoteIdentity,
        connections: HashSet<Uuid>,
    },
}

/// One remote connection's share of a room's binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLease {
    pub identity: RemoteIdentity,
    pub connection_id: Uuid,
}

/// A live hardware connection: the embedded server fed by the local peer,
/// the driver client issuing commands against it, and the connector carrying
/// frames to and from the local peer
#[derive(Clone)]
pub struct HardwareConnection {
    pub connection_id: Uuid,
    pub server: Arc<dyn ProtocolServer>,
    pub client: Arc<DriverClient>,
    pub connector: Arc<ForwardingConnector>,
}

/// The room's single hardware slot.
///
/// `Reserved` holds the slot for a local peer that passed the exclusivity
/// check but has not finished its handshake yet.
pub enum HardwareSlot {
    Vacant,
    Reserved(Uuid),
    Attached(HardwareConnection),
}

impl HardwareSlot {
    pub fn is_attached(&self) -> bool {
        matches!(self, HardwareSlot::Attached(_))
    }
}

/// First message on the registration channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomAnnouncement {
    pub room: String,
}

/// Room state pushed to the registration channel after every change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub room: String,
    pub hardware_connected: bool,
    pub remote_connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let status = RoomStatus {
            room: "ab12cd".to_string(),
            hardware_connected: true,
            remote_connected: false,
        };
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"room":"ab12cd","hardwareConnected":true,"remoteConnected":false}"#
        );
    }
}
