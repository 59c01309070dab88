use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::warn;

/// Id reserved for messages the server originates on its own (errors, events)
pub const SYSTEM_MESSAGE_ID: u32 = 0;

/// Protocol message version announced during the handshake
pub const MESSAGE_VERSION: u32 = 2;

/// Message types the bridge inspects. Anything else is relayed untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
pub enum MessageKind {
    Ok,
    Error,
    Ping,
    RequestServerInfo,
    ServerInfo,
    StartScanning,
    StopScanning,
    ScanningFinished,
    RequestDeviceList,
    DeviceList,
    DeviceAdded,
    DeviceRemoved,
    VibrateCmd,
    StopDeviceCmd,
    StopAllDevices,
}

/// Error classes carried in the `ErrorCode` field of an `Error` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown = 0,
    Init = 1,
    Ping = 2,
    Msg = 3,
    Device = 4,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not an array of messages")]
    NotAnArray,

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// One protocol message: a JSON object with a single key naming the message
/// type, whose value is the message body (always carrying an `Id`).
///
/// The bridge never validates the body beyond that shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ProtocolMessage {
    type_name: String,
    body: Map<String, Value>,
}

impl ProtocolMessage {
    /// Builds a message of the given type. `fields` must be a JSON object;
    /// any other value is treated as an empty body.
    pub fn new(type_name: impl AsRef<str>, id: u32, fields: Value) -> Self {
        let mut body = Map::new();
        body.insert("Id".to_string(), Value::from(id));
        if let Value::Object(fields) = fields {
            body.extend(fields.into_iter().filter(|(key, _)| key != "Id"));
        }
        Self {
            type_name: type_name.as_ref().to_string(),
            body,
        }
    }

    pub fn ok(id: u32) -> Self {
        Self::new(MessageKind::Ok, id, json!({}))
    }

    pub fn error(id: u32, message: impl Into<String>, code: ErrorCode) -> Self {
        Self::new(
            MessageKind::Error,
            id,
            json!({
                "ErrorMessage": message.into(),
                "ErrorCode": code as u32,
            }),
        )
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The parsed message type, if it is one the bridge knows about
    pub fn kind(&self) -> Option<MessageKind> {
        self.type_name.parse().ok()
    }

    pub fn is(&self, kind: MessageKind) -> bool {
        self.type_name == kind.as_ref()
    }

    pub fn id(&self) -> u32 {
        self.body
            .get("Id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .unwrap_or(SYSTEM_MESSAGE_ID)
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    pub fn device_index(&self) -> Option<u32> {
        self.field("DeviceIndex")
            .and_then(Value::as_u64)
            .and_then(|index| u32::try_from(index).ok())
    }

    /// Error text of an `Error` message
    pub fn error_message(&self) -> Option<&str> {
        if !self.is(MessageKind::Error) {
            return None;
        }
        self.field("ErrorMessage").and_then(Value::as_str)
    }
}

impl TryFrom<Value> for ProtocolMessage {
    type Error = FrameError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(outer) = value else {
            return Err(FrameError::InvalidMessage(
                "message is not an object".to_string(),
            ));
        };
        if outer.len() != 1 {
            return Err(FrameError::InvalidMessage(format!(
                "message must have exactly one type key, found {}",
                outer.len()
            )));
        }
        let Some((type_name, inner)) = outer.into_iter().next() else {
            return Err(FrameError::InvalidMessage("empty message".to_string()));
        };
        match inner {
            Value::Object(body) => Ok(Self { type_name, body }),
            _ => Err(FrameError::InvalidMessage(format!(
                "body of {} is not an object",
                type_name
            ))),
        }
    }
}

impl From<ProtocolMessage> for Value {
    fn from(message: ProtocolMessage) -> Self {
        let mut outer = Map::new();
        outer.insert(message.type_name, Value::Object(message.body));
        Value::Object(outer)
    }
}

/// Parses one wire frame (a JSON array of messages) preserving message order.
///
/// A frame that is not a JSON array is an error. Malformed elements inside
/// an array are logged and skipped; the rest of the frame still goes through.
pub fn parse_frame(frame: &str) -> Result<Vec<ProtocolMessage>, FrameError> {
    let value: Value = serde_json::from_str(frame)?;
    let Value::Array(items) = value else {
        return Err(FrameError::NotAnArray);
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match ProtocolMessage::try_from(item) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(error = %e, "Skipping malformed message in frame");
                None
            }
        })
        .collect())
}

/// Encodes a single message in the array envelope peers expect
pub fn encode_frame(message: &ProtocolMessage) -> String {
    Value::Array(vec![Value::from(message.clone())]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_frame_preserves_order() {
        let frame = r#"[{"Ping":{"Id":4}},{"RequestDeviceList":{"Id":5}},{"Ok":{"Id":6}}]"#;
        let messages = parse_frame(frame).unwrap();

        let types: Vec<&str> = messages.iter().map(|m| m.type_name()).collect();
        assert_eq!(types, vec!["Ping", "RequestDeviceList", "Ok"]);
        assert_eq!(messages[1].id(), 5);
    }

    #[test]
    fn test_parse_empty_frame() {
        assert!(parse_frame("[]").unwrap().is_empty());
    }

    #[rstest]
    #[case::not_json("hello")]
    #[case::bare_object(r#"{"Ping":{"Id":1}}"#)]
    fn test_parse_rejects_malformed_frames(#[case] frame: &str) {
        assert!(parse_frame(frame).is_err());
    }

    #[rstest]
    #[case::two_keys(r#"[{"Ping":{"Id":1},"Ok":{"Id":1}},{"Ping":{"Id":2}}]"#)]
    #[case::scalar_body(r#"[{"Ping":3},{"Ping":{"Id":2}}]"#)]
    #[case::scalar_element(r#"[1,{"Ping":{"Id":2}}]"#)]
    fn test_parse_skips_malformed_elements(#[case] frame: &str) {
        let messages = parse_frame(frame).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id(), 2);
    }

    #[test]
    fn test_relayed_message_keeps_key_order() {
        let frame = r#"[{"VibrateCmd":{"Id":3,"Speeds":[{"Speed":0.5,"Index":0}],"DeviceIndex":1}}]"#;
        let messages = parse_frame(frame).unwrap();
        assert_eq!(encode_frame(&messages[0]), frame);
    }

    #[rstest]
    #[case::id(r#"[{"Ping":{"Id":4294967296}}]"#)]
    #[case::negative_id(r#"[{"Ping":{"Id":-1}}]"#)]
    fn test_out_of_range_id_falls_back_to_system_id(#[case] frame: &str) {
        let messages = parse_frame(frame).unwrap();
        assert_eq!(messages[0].id(), SYSTEM_MESSAGE_ID);
    }

    #[test]
    fn test_out_of_range_device_index_is_absent() {
        let messages = parse_frame(r#"[{"VibrateCmd":{"Id":1,"DeviceIndex":4294967297}}]"#).unwrap();
        assert_eq!(messages[0].device_index(), None);
    }

    #[test]
    fn test_unknown_types_are_kept_verbatim() {
        let frame = r#"[{"LinearCmd":{"Id":9,"DeviceIndex":2,"Vectors":[{"Index":0,"Duration":500,"Position":0.3}]}}]"#;
        let messages = parse_frame(frame).unwrap();

        assert_eq!(messages[0].kind(), None);
        assert_eq!(messages[0].device_index(), Some(2));
        assert_eq!(
            serde_json::from_str::<Value>(&encode_frame(&messages[0])).unwrap(),
            serde_json::from_str::<Value>(frame).unwrap()
        );
    }

    #[test]
    fn test_encode_wraps_single_message_in_array() {
        let frame = encode_frame(&ProtocolMessage::ok(7));
        assert_eq!(frame, r#"[{"Ok":{"Id":7}}]"#);
    }

    #[test]
    fn test_error_message_shape() {
        let message = ProtocolMessage::error(SYSTEM_MESSAGE_ID, "Invalid connection request!", ErrorCode::Init);

        assert!(message.is(MessageKind::Error));
        assert_eq!(message.error_message(), Some("Invalid connection request!"));
        assert_eq!(message.field("ErrorCode"), Some(&Value::from(1)));
        assert_eq!(message.id(), 0);
    }
}
