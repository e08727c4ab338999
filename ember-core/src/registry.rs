//! Outward-facing surface: what the host application sees.
//!
//! The connection manager reports everything it learns — status
//! transitions, device identity, discovered channels, live state —
//! through an [`EventSink`] supplied at construction. The sink is the
//! only boundary between this crate and the host's own device
//! registry.

use std::collections::HashMap;
use std::fmt;

// ── Status reporting ─────────────────────────────────────────────

/// Coarse connectivity state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Connection attempt in progress, outcome unknown.
    Unknown,
    Online,
    Offline,
}

/// Why the device is in its current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDetail {
    None,
    /// Socket-level or protocol-level failure; will retry.
    CommunicationError,
    /// Bad hostname or rejected credentials; needs user action
    /// (still retried, so a fix takes effect without a restart).
    ConfigurationError,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Channels ─────────────────────────────────────────────────────

/// A category of device functionality with its own wire messages and
/// channel representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Sensor,
    BinarySensor,
    TextSensor,
    Switch,
    Select,
    Climate,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A locally-synthesized addressable point representing one device
/// capability instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    /// Stable identifier, unique per device.
    pub id: String,
    /// Human-readable label from the device.
    pub label: String,
    pub capability: Capability,
    /// Numeric key the device uses to address this entity.
    pub key: u32,
    /// Abstract item type the channel carries ("Switch", "Number",
    /// "String", "Contact").
    pub item_type: &'static str,
}

// ── States and commands ──────────────────────────────────────────

/// Abstract state of one channel, as published to the host registry.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelState {
    OnOff(bool),
    /// `true` = open.
    Contact(bool),
    Decimal(f64),
    Text(String),
    /// The device reported no usable value.
    Undefined,
}

/// Abstract command issued by the host against one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    /// Re-request live state for all channels.
    Refresh,
    OnOff(bool),
    Decimal(f64),
    Text(String),
}

/// One channel's new state, produced by a capability handler.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub channel: String,
    pub state: ChannelState,
}

// ── EventSink ────────────────────────────────────────────────────

/// Callback surface the host application implements.
///
/// Invoked from the connection manager's task; implementations should
/// be quick and must not call back into the handle synchronously.
pub trait EventSink: Send + Sync {
    /// Report a connectivity transition.
    fn update_status(&self, status: DeviceStatus, detail: StatusDetail, message: &str);

    /// Replace the device identity properties (firmware version,
    /// model, MAC address, ...). Called once per successful
    /// connection.
    fn replace_properties(&self, properties: HashMap<String, String>);

    /// Atomically replace the channel set. Called when entity
    /// enumeration completes.
    fn replace_channels(&self, channels: &[ChannelDescriptor]);

    /// Publish one channel's current value.
    fn update_state(&self, channel: &str, state: ChannelState);
}
