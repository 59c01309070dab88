use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::collections::HashSet;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::models::{
    HardwareConnection, HardwareSlot, RemoteBinding, RemoteIdentity, RemoteLease, RoomAnnouncement,
    RoomStatus,
};
use super::registry::RoomRegistry;
use crate::protocol::DriverClient;
use crate::shared::AppError;
use crate::websockets::OutboundFrame;

struct RoomState {
    remote: RemoteBinding,
    hardware: HardwareSlot,
    open: bool,
}

struct RoomInner {
    id: String,
    created_at: DateTime<Utc>,
    registration: mpsc::UnboundedSender<OutboundFrame>,
    closed: watch::Sender<bool>,
    state: Mutex<RoomState>,
}

/// A pairing record, addressed by its token.
///
/// Every mutation goes through the room's own lock and pushes a status
/// update to the registration channel before the lock is released, so status
/// messages always reflect the state they follow.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

impl Room {
    pub fn new(id: String, registration: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(RoomInner {
                id,
                created_at: Utc::now(),
                registration,
                closed,
                state: Mutex::new(RoomState {
                    remote: RemoteBinding::Unbound,
                    hardware: HardwareSlot::Vacant,
                    open: true,
                }),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Tells the registration peer which token it was given
    pub fn announce(&self) {
        let announcement = RoomAnnouncement {
            room: self.inner.id.clone(),
        };
        self.push_json(&announcement);
    }

    pub async fn status(&self) -> RoomStatus {
        let state = self.inner.state.lock().await;
        self.status_of(&state)
    }

    pub async fn hardware_connected(&self) -> bool {
        let state = self.inner.state.lock().await;
        match &state.hardware {
            HardwareSlot::Attached(connection) => connection.client.is_connected(),
            _ => false,
        }
    }

    /// Binds `identity` for one more connection. Returns the lease that
    /// connection gives back through `unbind_remote`.
    #[instrument(skip(self), fields(room_id = %self.inner.id))]
    pub async fn bind_remote(&self, identity: RemoteIdentity) -> Result<RemoteLease, AppError> {
        let mut state = self.inner.state.lock().await;
        if !state.open {
            return Err(AppError::InvalidToken(self.inner.id.clone()));
        }

        let connection_id = Uuid::new_v4();
        match &mut state.remote {
            RemoteBinding::BoundTo {
                identity: current,
                connections,
            } => {
                if *current != identity {
                    warn!(current = %current, "Room already bound to another remote peer");
                    return Err(AppError::AlreadyBound(self.inner.id.clone()));
                }
                connections.insert(connection_id);
                debug!(remote = %identity, connections = connections.len(), "Remote peer bound again");
            }
            RemoteBinding::Unbound => {
                info!(remote = %identity, "Remote peer bound");
                state.remote = RemoteBinding::BoundTo {
                    identity: identity.clone(),
                    connections: HashSet::from([connection_id]),
                };
            }
        }

        self.push_status(&state);
        Ok(RemoteLease {
            identity,
            connection_id,
        })
    }

    /// Returns a lease. The binding is cleared once its identity has no
    /// connections left; a lease from an earlier binding is ignored.
    #[instrument(skip(self), fields(room_id = %self.inner.id))]
    pub async fn unbind_remote(&self, lease: &RemoteLease) {
        let mut state = self.inner.state.lock().await;
        let remaining = match &mut state.remote {
            RemoteBinding::BoundTo {
                identity,
                connections,
            } if *identity == lease.identity => {
                if !connections.remove(&lease.connection_id) {
                    debug!(remote = %lease.identity, "Lease already returned");
                    return;
                }
                connections.len()
            }
            _ => {
                debug!(remote = %lease.identity, "Lease does not hold the binding");
                return;
            }
        };

        if remaining == 0 {
            info!(remote = %lease.identity, "Remote peer unbound");
            state.remote = RemoteBinding::Unbound;
            self.push_status(&state);
        } else {
            debug!(remote = %lease.identity, remaining, "Remote peer still connected elsewhere");
        }
    }

    /// Resolves once the room has been torn down
    pub async fn closed(&self) {
        let mut receiver = self.inner.closed.subscribe();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }

    /// Claims the hardware slot for a connecting local peer. The check and the
    /// claim happen under one lock, so two concurrent peers cannot both pass.
    #[instrument(skip(self), fields(room_id = %self.inner.id))]
    pub async fn reserve_hardware(&self) -> Result<Uuid, AppError> {
        let mut state = self.inner.state.lock().await;
        if !state.open {
            return Err(AppError::InvalidToken(self.inner.id.clone()));
        }
        if !matches!(state.hardware, HardwareSlot::Vacant) {
            info!("Connection is already active on room");
            return Err(AppError::AlreadyBound(self.inner.id.clone()));
        }

        let reservation = Uuid::new_v4();
        state.hardware = HardwareSlot::Reserved(reservation);
        debug!(reservation = %reservation, "Hardware slot reserved");
        Ok(reservation)
    }

    /// Completes a reservation made by `reserve_hardware`
    #[instrument(skip(self, connection), fields(room_id = %self.inner.id, connection_id = %connection.connection_id))]
    pub async fn attach_hardware(&self, connection: HardwareConnection) -> Result<(), AppError> {
        let mut state = self.inner.state.lock().await;
        let held = matches!(
            state.hardware,
            HardwareSlot::Reserved(reservation) if reservation == connection.connection_id
        );
        if !(state.open && held) {
            warn!("Reservation no longer held, refusing attach");
            return Err(AppError::InvalidToken(self.inner.id.clone()));
        }

        state.hardware = HardwareSlot::Attached(connection);
        info!("Hardware connection attached");
        self.push_status(&state);
        Ok(())
    }

    /// Gives up a reservation that never reached `attach_hardware`
    pub async fn release_reservation(&self, reservation: Uuid) {
        let mut state = self.inner.state.lock().await;
        if matches!(state.hardware, HardwareSlot::Reserved(held) if held == reservation) {
            debug!(room_id = %self.inner.id, reservation = %reservation, "Reservation released");
            state.hardware = HardwareSlot::Vacant;
        }
    }

    /// Detaches whatever hardware connection is attached
    pub async fn detach_hardware(&self) {
        let mut state = self.inner.state.lock().await;
        if let HardwareSlot::Attached(connection) =
            std::mem::replace(&mut state.hardware, HardwareSlot::Vacant)
        {
            Self::shut_down(&self.inner.id, connection).await;
            self.push_status(&state);
        }
    }

    /// Detaches the given connection only; a stale id is ignored
    pub async fn detach_connection(&self, connection_id: Uuid) {
        let mut state = self.inner.state.lock().await;
        let attached = matches!(
            &state.hardware,
            HardwareSlot::Attached(connection) if connection.connection_id == connection_id
        );
        let reserved = matches!(
            state.hardware,
            HardwareSlot::Reserved(reservation) if reservation == connection_id
        );

        if attached {
            if let HardwareSlot::Attached(connection) =
                std::mem::replace(&mut state.hardware, HardwareSlot::Vacant)
            {
                Self::shut_down(&self.inner.id, connection).await;
            }
            self.push_status(&state);
        } else if reserved {
            state.hardware = HardwareSlot::Vacant;
        } else {
            debug!(
                room_id = %self.inner.id,
                connection_id = %connection_id,
                "Connection no longer attached"
            );
        }
    }

    /// Driver client of the attached hardware connection, if any
    pub async fn driver_client(&self) -> Option<Arc<DriverClient>> {
        let state = self.inner.state.lock().await;
        match &state.hardware {
            HardwareSlot::Attached(connection) => Some(connection.client.clone()),
            _ => None,
        }
    }

    /// Full teardown once the registration connection is gone: hardware is
    /// detached first, then the remote binding, then the token is released.
    #[instrument(skip(self, registry), fields(room_id = %self.inner.id))]
    pub async fn teardown(&self, registry: &RoomRegistry) {
        {
            let mut state = self.inner.state.lock().await;
            state.open = false;
            if let HardwareSlot::Attached(connection) =
                std::mem::replace(&mut state.hardware, HardwareSlot::Vacant)
            {
                Self::shut_down(&self.inner.id, connection).await;
            }
            state.remote = RemoteBinding::Unbound;
        }
        self.inner.closed.send_replace(true);

        registry.release(&self.inner.id).await;

        let lifetime = Utc::now() - self.inner.created_at;
        info!(lifetime_secs = lifetime.num_seconds(), "Room torn down");
    }

    async fn shut_down(room_id: &str, connection: HardwareConnection) {
        info!(room_id = %room_id, connection_id = %connection.connection_id, "Detaching hardware connection");
        connection.client.disconnect().await;
        connection.server.shutdown().await;
        connection.connector.close_transport();
    }

    fn status_of(&self, state: &RoomState) -> RoomStatus {
        RoomStatus {
            room: self.inner.id.clone(),
            hardware_connected: state.hardware.is_attached(),
            remote_connected: matches!(state.remote, RemoteBinding::BoundTo { .. }),
        }
    }

    fn push_status(&self, state: &RoomState) {
        if state.open {
            let status = self.status_of(state);
            self.push_json(&status);
        }
    }

    fn push_json<T: serde::Serialize>(&self, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => {
                if self.inner.registration.send(OutboundFrame::Text(json)).is_err() {
                    debug!(room_id = %self.inner.id, "Registration channel already closed");
                }
            }
            Err(e) => error!(room_id = %self.inner.id, error = %e, "Failed to serialize room message"),
        }
    }
}
