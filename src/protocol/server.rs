use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument, warn};

use super::message::{ErrorCode, MessageKind, ProtocolMessage, MESSAGE_VERSION};

const UNPROMPTED_CAPACITY: usize = 64;

/// The embedded protocol server seam.
///
/// A server answers requests one at a time and may also emit messages on its
/// own (device commands headed for the hardware owner), which subscribers
/// receive through `subscribe`.
#[async_trait]
pub trait ProtocolServer: Send + Sync {
    fn name(&self) -> &str;

    /// Handle one inbound message. Returns the reply, or `None` when the
    /// message is itself a reply (`Ok` / `Error`) and needs no answer.
    async fn handle_message(&self, message: ProtocolMessage) -> Option<ProtocolMessage>;

    /// Messages the server emits unprompted
    fn subscribe(&self) -> broadcast::Receiver<ProtocolMessage>;

    async fn shutdown(&self);

    fn is_running(&self) -> bool;
}

/// Server hosting devices that physically live with the local peer.
///
/// Device announcements arrive from the local peer; device commands issued by
/// a driver client are emitted unprompted so the relay can carry them back.
pub struct ForwardedDeviceServer {
    name: String,
    devices: RwLock<BTreeMap<u32, Map<String, Value>>>,
    unprompted: broadcast::Sender<ProtocolMessage>,
    running: AtomicBool,
}

impl ForwardedDeviceServer {
    pub fn new(name: impl Into<String>) -> Self {
        let (unprompted, _) = broadcast::channel(UNPROMPTED_CAPACITY);
        Self {
            name: name.into(),
            devices: RwLock::new(BTreeMap::new()),
            unprompted,
            running: AtomicBool::new(true),
        }
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    fn emit(&self, message: ProtocolMessage) {
        if self.unprompted.send(message).is_err() {
            debug!(server = %self.name, "Unprompted message emitted with no subscribers");
        }
    }

    fn server_info(&self, id: u32) -> ProtocolMessage {
        ProtocolMessage::new(
            MessageKind::ServerInfo,
            id,
            json!({
                "ServerName": self.name,
                "MessageVersion": MESSAGE_VERSION,
                "MaxPingTime": 0,
            }),
        )
    }

    async fn add_device(&self, message: &ProtocolMessage) -> ProtocolMessage {
        let Some(index) = message.device_index() else {
            return ProtocolMessage::error(
                message.id(),
                "DeviceAdded without DeviceIndex",
                ErrorCode::Msg,
            );
        };

        let entry: Map<String, Value> = message
            .body()
            .iter()
            .filter(|(key, _)| *key != "Id")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.devices.write().await.insert(index, entry);

        info!(server = %self.name, device_index = index, "Forwarded device added");
        ProtocolMessage::ok(message.id())
    }

    async fn remove_device(&self, message: &ProtocolMessage) -> ProtocolMessage {
        if let Some(index) = message.device_index() {
            if self.devices.write().await.remove(&index).is_some() {
                info!(server = %self.name, device_index = index, "Forwarded device removed");
            }
        }
        ProtocolMessage::ok(message.id())
    }

    async fn device_list(&self, id: u32) -> ProtocolMessage {
        let devices: Vec<Value> = self
            .devices
            .read()
            .await
            .values()
            .cloned()
            .map(Value::Object)
            .collect();
        ProtocolMessage::new(MessageKind::DeviceList, id, json!({ "Devices": devices }))
    }

    async fn forward_device_command(&self, message: ProtocolMessage) -> ProtocolMessage {
        if let Some(index) = message.device_index() {
            if !self.devices.read().await.contains_key(&index) {
                warn!(server = %self.name, device_index = index, "Command for unknown device");
                return ProtocolMessage::error(
                    message.id(),
                    format!("Device index {} does not exist", index),
                    ErrorCode::Device,
                );
            }
        }

        let id = message.id();
        self.emit(message);
        ProtocolMessage::ok(id)
    }
}

#[async_trait]
impl ProtocolServer for ForwardedDeviceServer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, message), fields(server = %self.name, message_type = %message.type_name()))]
    async fn handle_message(&self, message: ProtocolMessage) -> Option<ProtocolMessage> {
        if message.is(MessageKind::Ok) || message.is(MessageKind::Error) {
            debug!(id = message.id(), "Absorbing reply from peer");
            return None;
        }

        if !self.is_running() {
            return Some(ProtocolMessage::error(
                message.id(),
                "Server is shut down",
                ErrorCode::Unknown,
            ));
        }

        let id = message.id();
        let reply = match message.kind() {
            Some(MessageKind::RequestServerInfo) => self.server_info(id),
            Some(MessageKind::Ping) => ProtocolMessage::ok(id),
            Some(MessageKind::StartScanning) | Some(MessageKind::StopScanning) => {
                self.emit(message);
                ProtocolMessage::ok(id)
            }
            Some(MessageKind::DeviceAdded) => self.add_device(&message).await,
            Some(MessageKind::DeviceRemoved) => self.remove_device(&message).await,
            Some(MessageKind::RequestDeviceList) => self.device_list(id).await,
            Some(MessageKind::StopAllDevices) => {
                self.emit(message);
                ProtocolMessage::ok(id)
            }
            _ if message.device_index().is_some() => self.forward_device_command(message).await,
            _ => ProtocolMessage::ok(id),
        };
        Some(reply)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProtocolMessage> {
        self.unprompted.subscribe()
    }

    async fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.devices.write().await.clear();
            info!(server = %self.name, "Embedded server shut down");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
