// Public API
pub use connector::{ConnectorEvent, ForwardingConnector};
pub use handlers::{hardware_handler, run_hardware_relay, run_status, status_handler};
pub use keepalive::{KeepAlive, DEFAULT_KEEPALIVE_INTERVAL};
pub use messages::{BuzzPayload, MessageType, WebSocketMessage};
pub use remote::{remote_handler, run_remote, RemoteQuery};
pub use socket::{Connection, MessageHandler, OutboundFrame, SocketError, SocketWrapper};

// Internal modules
mod connector;
mod handlers;
mod keepalive;
mod messages;
mod remote;
pub(crate) mod socket;
