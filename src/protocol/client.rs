use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::message::{MessageKind, ProtocolMessage, MESSAGE_VERSION};
use super::server::ProtocolServer;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("server rejected {request}: {reason}")]
    Rejected { request: String, reason: String },

    #[error("unexpected reply to {request}: {reply}")]
    UnexpectedReply { request: String, reply: String },
}

/// A device as reported in the server's device list
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub messages: Value,
}

impl DeviceInfo {
    fn from_entry(entry: &Value) -> Option<Self> {
        Some(Self {
            index: u32::try_from(entry.get("DeviceIndex")?.as_u64()?).ok()?,
            name: entry
                .get("DeviceName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            messages: entry.get("DeviceMessages").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn supports(&self, kind: MessageKind) -> bool {
        self.messages.get(kind.as_ref()).is_some()
    }

    /// Number of vibration motors, defaulting to one when unspecified
    pub fn vibrator_count(&self) -> u64 {
        self.messages
            .get(MessageKind::VibrateCmd.as_ref())
            .and_then(|cmd| cmd.get("FeatureCount"))
            .and_then(Value::as_u64)
            .unwrap_or(1)
    }
}

/// Driver client talking to an embedded server in-process.
///
/// Commands issued here look, to the rest of the system, exactly like
/// commands sent to directly attached hardware.
pub struct DriverClient {
    name: String,
    server: Arc<dyn ProtocolServer>,
    connected: AtomicBool,
    next_id: AtomicU32,
}

impl DriverClient {
    pub fn new(name: impl Into<String>, server: Arc<dyn ProtocolServer>) -> Self {
        Self {
            name: name.into(),
            server,
            connected: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Handshake with the server, then start scanning for devices
    #[instrument(skip(self), fields(client = %self.name))]
    pub async fn connect(&self) -> Result<(), ClientError> {
        let info = self
            .request(
                MessageKind::RequestServerInfo,
                json!({ "ClientName": self.name, "MessageVersion": MESSAGE_VERSION }),
            )
            .await?;
        if !info.is(MessageKind::ServerInfo) {
            return Err(ClientError::UnexpectedReply {
                request: MessageKind::RequestServerInfo.to_string(),
                reply: info.type_name().to_string(),
            });
        }

        self.expect_ok(MessageKind::StartScanning, json!({})).await?;
        self.connected.store(true, Ordering::SeqCst);

        info!(
            server_name = ?info.field("ServerName"),
            "Driver client connected"
        );
        Ok(())
    }

    /// Disconnects and shuts the embedded server down. Safe to call twice.
    pub async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.server.shutdown().await;
            info!(client = %self.name, "Driver client disconnected");
        }
    }

    pub async fn devices(&self) -> Result<Vec<DeviceInfo>, ClientError> {
        self.ensure_connected()?;
        let reply = self.request(MessageKind::RequestDeviceList, json!({})).await?;
        let devices = reply
            .field("Devices")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(DeviceInfo::from_entry).collect())
            .unwrap_or_default();
        Ok(devices)
    }

    /// Runs every vibrator of every device at `speed` (0.0 - 1.0).
    /// Returns the number of devices commanded.
    pub async fn vibrate_all(&self, speed: f64) -> Result<usize, ClientError> {
        let speed = speed.clamp(0.0, 1.0);
        let mut commanded = 0;

        for device in self.devices().await? {
            if !device.supports(MessageKind::VibrateCmd) {
                continue;
            }
            let speeds: Vec<Value> = (0..device.vibrator_count())
                .map(|index| json!({ "Index": index, "Speed": speed }))
                .collect();
            self.expect_ok(
                MessageKind::VibrateCmd,
                json!({ "DeviceIndex": device.index, "Speeds": speeds }),
            )
            .await?;
            commanded += 1;
        }

        debug!(client = %self.name, commanded, speed, "Vibrate command sent");
        Ok(commanded)
    }

    pub async fn stop_all(&self) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.expect_ok(MessageKind::StopAllDevices, json!({})).await
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    async fn expect_ok(&self, kind: MessageKind, fields: Value) -> Result<(), ClientError> {
        let reply = self.request(kind, fields).await?;
        if reply.is(MessageKind::Ok) {
            Ok(())
        } else {
            Err(ClientError::UnexpectedReply {
                request: kind.to_string(),
                reply: reply.type_name().to_string(),
            })
        }
    }

    async fn request(&self, kind: MessageKind, fields: Value) -> Result<ProtocolMessage, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .server
            .handle_message(ProtocolMessage::new(kind, id, fields))
            .await
            .ok_or_else(|| ClientError::UnexpectedReply {
                request: kind.to_string(),
                reply: "nothing".to_string(),
            })?;

        if let Some(reason) = reply.error_message() {
            return Err(ClientError::Rejected {
                request: kind.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(reply)
    }
}
