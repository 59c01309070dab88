// Library crate for the haptic bridge relay server
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod protocol;
pub mod room;
pub mod routes;
pub mod session;
pub mod shared;
pub mod status;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use config::ServerConfig;
pub use room::{Room, RoomRegistry, RoomStatus};
pub use routes::build_router;
pub use shared::{AppError, AppState};
pub use websockets::{MessageType, OutboundFrame, SocketError, SocketWrapper, WebSocketMessage};
