use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, instrument};

use super::handle::Room;
use super::token::{RandomTokenGenerator, TokenGenerator};
use crate::shared::AppError;
use crate::websockets::OutboundFrame;

/// Upper bound on redraws before allocation gives up. With 36^6 tokens this
/// is only reachable with a broken generator.
pub const MAX_TOKEN_ATTEMPTS: usize = 64;

/// Token -> Room map. Tokens are unique among live rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
    generator: Box<dyn TokenGenerator>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_generator(Box::new(RandomTokenGenerator::new()))
    }

    pub fn with_generator(generator: Box<dyn TokenGenerator>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            generator,
        }
    }

    /// Creates a room under a fresh token. Status updates for the room are
    /// written to `registration`.
    #[instrument(skip(self, registration))]
    pub async fn allocate(
        &self,
        registration: mpsc::UnboundedSender<OutboundFrame>,
    ) -> Result<Room, AppError> {
        let mut rooms = self.rooms.write().await;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let token = self.generator.generate();
            if rooms.contains_key(&token) {
                debug!(room_id = %token, attempt, "Token collision, redrawing");
                continue;
            }

            let room = Room::new(token.clone(), registration);
            rooms.insert(token.clone(), room.clone());
            info!(room_id = %token, live_rooms = rooms.len(), "Room allocated");
            return Ok(room);
        }

        error!(attempts = MAX_TOKEN_ATTEMPTS, "Could not draw an unused room token");
        Err(AppError::Internal)
    }

    pub async fn lookup(&self, token: &str) -> Option<Room> {
        self.rooms.read().await.get(token).cloned()
    }

    /// Removes the room; releasing an unknown token is a no-op
    pub async fn release(&self, token: &str) {
        if self.rooms.write().await.remove(token).is_some() {
            info!(room_id = %token, "Room released");
        }
    }

    /// All live rooms, sorted by token
    pub async fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.read().await.values().cloned().collect();
        rooms.sort_by(|a, b| a.id().cmp(b.id()));
        rooms
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
