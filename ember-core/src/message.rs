//! Ember Link message kinds and payload definitions.
//!
//! Every message that can cross the wire is a variant of [`Message`],
//! a closed set — routing happens by matching on the variant instead
//! of inspecting runtime types, so an unhandled kind is a compile
//! error rather than a silent fallthrough.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EmberError;

/// Protocol version declared in the greeting. Must match what the
/// device firmware speaks.
pub const API_VERSION_MAJOR: u32 = 1;
pub const API_VERSION_MINOR: u32 = 7;

// ── MessageKind ──────────────────────────────────────────────────

/// Wire identifier for each message, carried as a varint in the frame
/// header.
///
/// Organized by category:
/// - `0x0001..0x00FF` — Session (handshake, login, keepalive, disconnect)
/// - `0x0100..0x01FF` — Bootstrap (device info, entity enumeration)
/// - `0x0200..0x02FF` — Entity definitions (device → client)
/// - `0x0300..0x03FF` — Entity states (device → client)
/// - `0x0400..0x04FF` — Entity commands (client → device)
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    // ── Session (0x00xx) ─────────────────────────────────────────
    /// Greeting: client identity and declared protocol version.
    HelloRequest = 0x0001,
    /// Greeting acknowledgement: peer identity and version.
    HelloResponse = 0x0002,
    /// Credential exchange, optionally carrying a shared secret.
    LoginRequest = 0x0003,
    /// Login outcome.
    LoginResponse = 0x0004,
    /// Graceful disconnect request (either direction).
    DisconnectRequest = 0x0005,
    /// Disconnect acknowledgement.
    DisconnectResponse = 0x0006,
    /// Keepalive probe.
    PingRequest = 0x0007,
    /// Keepalive reply.
    PingResponse = 0x0008,

    // ── Bootstrap (0x01xx) ───────────────────────────────────────
    /// Query device identity properties.
    DeviceInfoRequest = 0x0101,
    /// Device identity properties.
    DeviceInfoResponse = 0x0102,
    /// Start entity enumeration.
    ListEntitiesRequest = 0x0103,
    /// Entity enumeration finished.
    ListEntitiesDone = 0x0104,
    /// Subscribe to live state updates for all entities.
    SubscribeStatesRequest = 0x0105,

    // ── Entity definitions (0x02xx) ──────────────────────────────
    SensorDefinition = 0x0201,
    BinarySensorDefinition = 0x0202,
    TextSensorDefinition = 0x0203,
    SwitchDefinition = 0x0204,
    SelectDefinition = 0x0205,
    ClimateDefinition = 0x0206,

    // ── Entity states (0x03xx) ───────────────────────────────────
    SensorState = 0x0301,
    BinarySensorState = 0x0302,
    TextSensorState = 0x0303,
    SwitchState = 0x0304,
    SelectState = 0x0305,
    ClimateState = 0x0306,

    // ── Entity commands (0x04xx) ─────────────────────────────────
    SwitchCommand = 0x0401,
    SelectCommand = 0x0402,
    ClimateCommand = 0x0403,
}

impl TryFrom<u64> for MessageKind {
    type Error = EmberError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0x0001 => Ok(MessageKind::HelloRequest),
            0x0002 => Ok(MessageKind::HelloResponse),
            0x0003 => Ok(MessageKind::LoginRequest),
            0x0004 => Ok(MessageKind::LoginResponse),
            0x0005 => Ok(MessageKind::DisconnectRequest),
            0x0006 => Ok(MessageKind::DisconnectResponse),
            0x0007 => Ok(MessageKind::PingRequest),
            0x0008 => Ok(MessageKind::PingResponse),

            0x0101 => Ok(MessageKind::DeviceInfoRequest),
            0x0102 => Ok(MessageKind::DeviceInfoResponse),
            0x0103 => Ok(MessageKind::ListEntitiesRequest),
            0x0104 => Ok(MessageKind::ListEntitiesDone),
            0x0105 => Ok(MessageKind::SubscribeStatesRequest),

            0x0201 => Ok(MessageKind::SensorDefinition),
            0x0202 => Ok(MessageKind::BinarySensorDefinition),
            0x0203 => Ok(MessageKind::TextSensorDefinition),
            0x0204 => Ok(MessageKind::SwitchDefinition),
            0x0205 => Ok(MessageKind::SelectDefinition),
            0x0206 => Ok(MessageKind::ClimateDefinition),

            0x0301 => Ok(MessageKind::SensorState),
            0x0302 => Ok(MessageKind::BinarySensorState),
            0x0303 => Ok(MessageKind::TextSensorState),
            0x0304 => Ok(MessageKind::SwitchState),
            0x0305 => Ok(MessageKind::SelectState),
            0x0306 => Ok(MessageKind::ClimateState),

            0x0401 => Ok(MessageKind::SwitchCommand),
            0x0402 => Ok(MessageKind::SelectCommand),
            0x0403 => Ok(MessageKind::ClimateCommand),

            _ => Err(EmberError::UnknownKind { value }),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Session payloads ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub client_info: String,
    pub api_version_major: u32,
    pub api_version_minor: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloResponse {
    /// Device display name.
    pub name: String,
    /// Firmware / server description string.
    pub server_info: String,
    pub api_version_major: u32,
    pub api_version_minor: u32,
}

/// An empty password is an anonymous login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub invalid_password: bool,
}

// ── Bootstrap payloads ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfoResponse {
    pub name: String,
    pub mac_address: String,
    pub model: String,
    pub manufacturer: String,
    pub firmware_version: String,
    pub compiled_at: String,
}

// ── Entity definition payloads ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub object_id: String,
    pub key: u32,
    pub name: String,
    pub unit_of_measurement: String,
    pub accuracy_decimals: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinarySensorDefinition {
    pub object_id: String,
    pub key: u32,
    pub name: String,
    pub device_class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSensorDefinition {
    pub object_id: String,
    pub key: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchDefinition {
    pub object_id: String,
    pub key: u32,
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectDefinition {
    pub object_id: String,
    pub key: u32,
    pub name: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateDefinition {
    pub object_id: String,
    pub key: u32,
    pub name: String,
    pub supported_modes: Vec<ClimateMode>,
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub temperature_step: f32,
}

/// Operating mode of a climate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClimateMode {
    Off,
    Heat,
    Cool,
    Auto,
    FanOnly,
    Dry,
}

impl fmt::Display for ClimateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClimateMode::Off => "off",
            ClimateMode::Heat => "heat",
            ClimateMode::Cool => "cool",
            ClimateMode::Auto => "auto",
            ClimateMode::FanOnly => "fan_only",
            ClimateMode::Dry => "dry",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ClimateMode {
    type Err = EmberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ClimateMode::Off),
            "heat" => Ok(ClimateMode::Heat),
            "cool" => Ok(ClimateMode::Cool),
            "auto" => Ok(ClimateMode::Auto),
            "fan_only" => Ok(ClimateMode::FanOnly),
            "dry" => Ok(ClimateMode::Dry),
            _ => Err(EmberError::ProtocolViolation("unknown climate mode")),
        }
    }
}

// ── Entity state payloads ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    pub key: u32,
    pub state: f32,
    pub missing_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinarySensorState {
    pub key: u32,
    pub state: bool,
    pub missing_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSensorState {
    pub key: u32,
    pub state: String,
    pub missing_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchState {
    pub key: u32,
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectState {
    pub key: u32,
    pub state: String,
    pub missing_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateState {
    pub key: u32,
    pub mode: ClimateMode,
    pub current_temperature: f32,
    pub target_temperature: f32,
}

// ── Entity command payloads ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCommand {
    pub key: u32,
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectCommand {
    pub key: u32,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateCommand {
    pub key: u32,
    pub mode: Option<ClimateMode>,
    pub target_temperature: Option<f32>,
}

// ── Message ──────────────────────────────────────────────────────

/// A decoded Ember Link message.
///
/// Kinds with no payload are unit variants; the rest wrap their
/// payload struct.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HelloRequest(HelloRequest),
    HelloResponse(HelloResponse),
    LoginRequest(LoginRequest),
    LoginResponse(LoginResponse),
    DisconnectRequest,
    DisconnectResponse,
    PingRequest,
    PingResponse,

    DeviceInfoRequest,
    DeviceInfoResponse(DeviceInfoResponse),
    ListEntitiesRequest,
    ListEntitiesDone,
    SubscribeStatesRequest,

    SensorDefinition(SensorDefinition),
    BinarySensorDefinition(BinarySensorDefinition),
    TextSensorDefinition(TextSensorDefinition),
    SwitchDefinition(SwitchDefinition),
    SelectDefinition(SelectDefinition),
    ClimateDefinition(ClimateDefinition),

    SensorState(SensorState),
    BinarySensorState(BinarySensorState),
    TextSensorState(TextSensorState),
    SwitchState(SwitchState),
    SelectState(SelectState),
    ClimateState(ClimateState),

    SwitchCommand(SwitchCommand),
    SelectCommand(SelectCommand),
    ClimateCommand(ClimateCommand),
}

impl Message {
    /// The wire kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::HelloRequest(_) => MessageKind::HelloRequest,
            Message::HelloResponse(_) => MessageKind::HelloResponse,
            Message::LoginRequest(_) => MessageKind::LoginRequest,
            Message::LoginResponse(_) => MessageKind::LoginResponse,
            Message::DisconnectRequest => MessageKind::DisconnectRequest,
            Message::DisconnectResponse => MessageKind::DisconnectResponse,
            Message::PingRequest => MessageKind::PingRequest,
            Message::PingResponse => MessageKind::PingResponse,

            Message::DeviceInfoRequest => MessageKind::DeviceInfoRequest,
            Message::DeviceInfoResponse(_) => MessageKind::DeviceInfoResponse,
            Message::ListEntitiesRequest => MessageKind::ListEntitiesRequest,
            Message::ListEntitiesDone => MessageKind::ListEntitiesDone,
            Message::SubscribeStatesRequest => MessageKind::SubscribeStatesRequest,

            Message::SensorDefinition(_) => MessageKind::SensorDefinition,
            Message::BinarySensorDefinition(_) => MessageKind::BinarySensorDefinition,
            Message::TextSensorDefinition(_) => MessageKind::TextSensorDefinition,
            Message::SwitchDefinition(_) => MessageKind::SwitchDefinition,
            Message::SelectDefinition(_) => MessageKind::SelectDefinition,
            Message::ClimateDefinition(_) => MessageKind::ClimateDefinition,

            Message::SensorState(_) => MessageKind::SensorState,
            Message::BinarySensorState(_) => MessageKind::BinarySensorState,
            Message::TextSensorState(_) => MessageKind::TextSensorState,
            Message::SwitchState(_) => MessageKind::SwitchState,
            Message::SelectState(_) => MessageKind::SelectState,
            Message::ClimateState(_) => MessageKind::ClimateState,

            Message::SwitchCommand(_) => MessageKind::SwitchCommand,
            Message::SelectCommand(_) => MessageKind::SelectCommand,
            Message::ClimateCommand(_) => MessageKind::ClimateCommand,
        }
    }

    /// Serialize the payload portion of this message.
    ///
    /// Unit variants serialize to an empty payload.
    pub fn encode_payload(&self) -> Result<Vec<u8>, EmberError> {
        let bytes = match self {
            Message::HelloRequest(p) => bincode::serialize(p)?,
            Message::HelloResponse(p) => bincode::serialize(p)?,
            Message::LoginRequest(p) => bincode::serialize(p)?,
            Message::LoginResponse(p) => bincode::serialize(p)?,
            Message::DisconnectRequest
            | Message::DisconnectResponse
            | Message::PingRequest
            | Message::PingResponse
            | Message::DeviceInfoRequest
            | Message::ListEntitiesRequest
            | Message::ListEntitiesDone
            | Message::SubscribeStatesRequest => Vec::new(),

            Message::DeviceInfoResponse(p) => bincode::serialize(p)?,

            Message::SensorDefinition(p) => bincode::serialize(p)?,
            Message::BinarySensorDefinition(p) => bincode::serialize(p)?,
            Message::TextSensorDefinition(p) => bincode::serialize(p)?,
            Message::SwitchDefinition(p) => bincode::serialize(p)?,
            Message::SelectDefinition(p) => bincode::serialize(p)?,
            Message::ClimateDefinition(p) => bincode::serialize(p)?,

            Message::SensorState(p) => bincode::serialize(p)?,
            Message::BinarySensorState(p) => bincode::serialize(p)?,
            Message::TextSensorState(p) => bincode::serialize(p)?,
            Message::SwitchState(p) => bincode::serialize(p)?,
            Message::SelectState(p) => bincode::serialize(p)?,
            Message::ClimateState(p) => bincode::serialize(p)?,

            Message::SwitchCommand(p) => bincode::serialize(p)?,
            Message::SelectCommand(p) => bincode::serialize(p)?,
            Message::ClimateCommand(p) => bincode::serialize(p)?,
        };
        Ok(bytes)
    }

    /// Reconstruct a message from its wire kind and payload bytes.
    pub fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<Message, EmberError> {
        let msg = match kind {
            MessageKind::HelloRequest => Message::HelloRequest(bincode::deserialize(payload)?),
            MessageKind::HelloResponse => Message::HelloResponse(bincode::deserialize(payload)?),
            MessageKind::LoginRequest => Message::LoginRequest(bincode::deserialize(payload)?),
            MessageKind::LoginResponse => Message::LoginResponse(bincode::deserialize(payload)?),
            MessageKind::DisconnectRequest => Message::DisconnectRequest,
            MessageKind::DisconnectResponse => Message::DisconnectResponse,
            MessageKind::PingRequest => Message::PingRequest,
            MessageKind::PingResponse => Message::PingResponse,

            MessageKind::DeviceInfoRequest => Message::DeviceInfoRequest,
            MessageKind::DeviceInfoResponse => {
                Message::DeviceInfoResponse(bincode::deserialize(payload)?)
            }
            MessageKind::ListEntitiesRequest => Message::ListEntitiesRequest,
            MessageKind::ListEntitiesDone => Message::ListEntitiesDone,
            MessageKind::SubscribeStatesRequest => Message::SubscribeStatesRequest,

            MessageKind::SensorDefinition => {
                Message::SensorDefinition(bincode::deserialize(payload)?)
            }
            MessageKind::BinarySensorDefinition => {
                Message::BinarySensorDefinition(bincode::deserialize(payload)?)
            }
            MessageKind::TextSensorDefinition => {
                Message::TextSensorDefinition(bincode::deserialize(payload)?)
            }
            MessageKind::SwitchDefinition => {
                Message::SwitchDefinition(bincode::deserialize(payload)?)
            }
            MessageKind::SelectDefinition => {
                Message::SelectDefinition(bincode::deserialize(payload)?)
            }
            MessageKind::ClimateDefinition => {
                Message::ClimateDefinition(bincode::deserialize(payload)?)
            }

            MessageKind::SensorState => Message::SensorState(bincode::deserialize(payload)?),
            MessageKind::BinarySensorState => {
                Message::BinarySensorState(bincode::deserialize(payload)?)
            }
            MessageKind::TextSensorState => {
                Message::TextSensorState(bincode::deserialize(payload)?)
            }
            MessageKind::SwitchState => Message::SwitchState(bincode::deserialize(payload)?),
            MessageKind::SelectState => Message::SelectState(bincode::deserialize(payload)?),
            MessageKind::ClimateState => Message::ClimateState(bincode::deserialize(payload)?),

            MessageKind::SwitchCommand => Message::SwitchCommand(bincode::deserialize(payload)?),
            MessageKind::SelectCommand => Message::SelectCommand(bincode::deserialize(payload)?),
            MessageKind::ClimateCommand => Message::ClimateCommand(bincode::deserialize(payload)?),
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        let kinds = [
            MessageKind::HelloRequest,
            MessageKind::HelloResponse,
            MessageKind::LoginRequest,
            MessageKind::LoginResponse,
            MessageKind::DisconnectRequest,
            MessageKind::DisconnectResponse,
            MessageKind::PingRequest,
            MessageKind::PingResponse,
            MessageKind::DeviceInfoRequest,
            MessageKind::DeviceInfoResponse,
            MessageKind::ListEntitiesRequest,
            MessageKind::ListEntitiesDone,
            MessageKind::SubscribeStatesRequest,
            MessageKind::SensorDefinition,
            MessageKind::BinarySensorDefinition,
            MessageKind::TextSensorDefinition,
            MessageKind::SwitchDefinition,
            MessageKind::SelectDefinition,
            MessageKind::ClimateDefinition,
            MessageKind::SensorState,
            MessageKind::BinarySensorState,
            MessageKind::TextSensorState,
            MessageKind::SwitchState,
            MessageKind::SelectState,
            MessageKind::ClimateState,
            MessageKind::SwitchCommand,
            MessageKind::SelectCommand,
            MessageKind::ClimateCommand,
        ];
        for kind in kinds {
            assert_eq!(MessageKind::try_from(kind as u64).unwrap(), kind);
        }
    }

    #[test]
    fn kind_invalid() {
        assert!(MessageKind::try_from(0xDEAD).is_err());
    }

    #[test]
    fn payload_roundtrip() {
        let msg = Message::HelloResponse(HelloResponse {
            name: "greenhouse".into(),
            server_info: "ember 2.4.1".into(),
            api_version_major: 1,
            api_version_minor: 7,
        });
        let bytes = msg.encode_payload().unwrap();
        let decoded = Message::decode_payload(msg.kind(), &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unit_kinds_have_empty_payload() {
        assert!(Message::PingRequest.encode_payload().unwrap().is_empty());
        assert_eq!(
            Message::decode_payload(MessageKind::PingRequest, &[]).unwrap(),
            Message::PingRequest
        );
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let msg = Message::SwitchState(SwitchState {
            key: 7,
            state: true,
        });
        let bytes = msg.encode_payload().unwrap();
        let res = Message::decode_payload(MessageKind::SwitchState, &bytes[..bytes.len() - 1]);
        assert!(matches!(res, Err(EmberError::Encoding(_))));
    }

    #[test]
    fn climate_mode_parse() {
        assert_eq!("heat".parse::<ClimateMode>().unwrap(), ClimateMode::Heat);
        assert_eq!(ClimateMode::FanOnly.to_string(), "fan_only");
        assert!("toast".parse::<ClimateMode>().is_err());
    }
}
