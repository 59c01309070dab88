pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::{
    assert_rejected, assert_status, next_remote_message, protocol_messages, wait_for_message,
};
#[allow(unused_imports)]
pub use mocks::{mock_socket, MockPeer};
#[allow(unused_imports)]
pub use setup::{ConnectedPeer, RegisteredRoom, TestSetup};
