// Public API - what other modules can use
pub use handle::Room;
pub use handlers::{get_room, list_rooms, registration_handler, run_registration};
pub use models::{HardwareConnection, RemoteBinding, RemoteIdentity, RemoteLease, RoomStatus};
pub use registry::RoomRegistry;

// Internal modules
mod handle;
mod handlers;
pub mod models;
pub mod registry;
pub mod token;
