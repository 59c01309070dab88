pub use client::{ClientError, DeviceInfo, DriverClient};
pub use message::{encode_frame, parse_frame, ErrorCode, FrameError, MessageKind, ProtocolMessage};
pub use relay::{RelayOutcome, RelayServer};
pub use server::{ForwardedDeviceServer, ProtocolServer};

pub mod client;
pub mod message;
pub mod relay;
pub mod server;
