use haptic_bridge::protocol::{parse_frame, ErrorCode, MessageKind, ProtocolMessage};
use haptic_bridge::{RoomStatus, WebSocketMessage};

use super::mocks::MockPeer;

// ============================================================================
// Assertion Helpers
// ============================================================================

pub fn protocol_messages(frame: &str) -> Vec<ProtocolMessage> {
    parse_frame(frame).expect("frame should be a protocol message array")
}

/// Reads the next status message off a registration channel and checks it
pub async fn assert_status(registration: &mut MockPeer, hardware: bool, remote: bool) {
    let text = registration
        .next_text()
        .await
        .expect("registration channel closed before status arrived");
    let status: RoomStatus = serde_json::from_str(&text).expect("status message");
    assert_eq!(
        (status.hardware_connected, status.remote_connected),
        (hardware, remote),
        "unexpected status: {}",
        text
    );
}

/// A rejected peer gets one array-wrapped error message, then a close
pub async fn assert_rejected(peer: &mut MockPeer) {
    let frame = peer.next_text().await.expect("expected an error frame");
    let messages = protocol_messages(&frame);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is(MessageKind::Error));
    assert_eq!(
        messages[0].field("ErrorCode").and_then(|code| code.as_u64()),
        Some(ErrorCode::Init as u64)
    );
    assert_eq!(messages[0].error_message(), Some("Invalid connection request!"));
    assert!(peer.closed_by_server().await);
}

/// Skips protocol messages until one of `kind` arrives
pub async fn wait_for_message(peer: &mut MockPeer, kind: MessageKind) -> ProtocolMessage {
    loop {
        let frame = peer
            .next_text()
            .await
            .unwrap_or_else(|| panic!("closed while waiting for {}", kind));
        if let Some(message) = protocol_messages(&frame).into_iter().find(|m| m.is(kind)) {
            return message;
        }
    }
}

/// Reads the next remote-control message
pub async fn next_remote_message(peer: &mut MockPeer) -> WebSocketMessage {
    let text = peer.next_text().await.expect("remote channel closed");
    serde_json::from_str(&text).expect("remote-control message")
}
