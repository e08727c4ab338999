//! # ember-core
//!
//! Client library for the Ember Link protocol — a lightweight binary
//! RPC used to pair a home-automation hub with embedded devices over
//! TCP.
//!
//! This crate contains:
//! - **Messages**: `Message`, `MessageKind` and payload structs — the
//!   closed set of everything that crosses the wire
//! - **Codec**: `EmberCodec` for framed TCP I/O via `tokio_util`
//! - **Network**: `Connection` for a managed transport with
//!   asynchronous event delivery
//! - **State**: `ConnectionPhase` — the handshake/session lifecycle
//! - **Capabilities**: per-capability handlers and the
//!   `HandlerTable` routing both directions of entity traffic
//! - **Device**: `DeviceHandler` — the connection manager driving
//!   handshake, login, liveness supervision and reconnection
//! - **Registry**: the `EventSink` boundary to the host application
//! - **Error**: `EmberError` — typed, `thiserror`-based error
//!   hierarchy

pub mod capability;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod message;
pub mod network;
pub mod registry;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capability::{CapabilityHandler, Dispatch, HandlerTable};
pub use codec::{EmberCodec, FRAME_PREAMBLE, MAX_PAYLOAD_SIZE};
pub use config::{DeviceConfig, ProtocolTimings, DEFAULT_PORT};
pub use device::{DeviceHandle, DeviceHandler};
pub use error::EmberError;
pub use message::{Message, MessageKind};
pub use network::{Connection, TransportEvent};
pub use registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, DeviceStatus, EventSink,
    StateUpdate, StatusDetail,
};
pub use state::ConnectionPhase;
