//! Capability handlers and the message-routing table.
//!
//! Each capability owns exactly two inbound wire kinds — its entity
//! definition and its state message — plus the translation of
//! abstract commands into protocol requests. The [`HandlerTable`]
//! indexes handlers both ways (by capability tag for outbound
//! commands, by message kind for inbound traffic) and is built once
//! at construction; it is read-only afterwards apart from the
//! per-connection key bindings inside each handler.

pub mod binary_sensor;
pub mod climate;
pub mod select;
pub mod sensor;
pub mod switch;
pub mod text_sensor;

use std::collections::HashMap;

use crate::error::EmberError;
use crate::message::{Message, MessageKind};
use crate::registry::{Capability, ChannelCommand, ChannelDescriptor, StateUpdate};

pub use binary_sensor::BinarySensorHandler;
pub use climate::ClimateHandler;
pub use select::SelectHandler;
pub use sensor::SensorHandler;
pub use switch::SwitchHandler;
pub use text_sensor::TextSensorHandler;

// ── CapabilityHandler ────────────────────────────────────────────

/// Per-capability encode/decode and state-projection logic.
///
/// Handlers accumulate a key → channel binding while definitions are
/// enumerated and use it to resolve state messages; [`reset`] clears
/// the binding at the start of each connection cycle.
///
/// [`reset`]: CapabilityHandler::reset
pub trait CapabilityHandler: Send + Sync {
    fn capability(&self) -> Capability;

    /// Wire kind of this capability's entity-definition message.
    fn definition_kind(&self) -> MessageKind;

    /// Wire kind of this capability's state message.
    fn state_kind(&self) -> MessageKind;

    /// Synthesize channel descriptors from a definition message and
    /// record the key binding. A message of the wrong variant yields
    /// no channels.
    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor>;

    /// Project a state message onto the locally-registered channels.
    /// Unknown keys yield no updates.
    fn handle_state(&self, state: &Message) -> Vec<StateUpdate>;

    /// Translate an abstract command into the protocol request for
    /// the entity addressed by `key`.
    fn encode_command(
        &self,
        channel: &ChannelDescriptor,
        command: &ChannelCommand,
        key: u32,
    ) -> Result<Message, EmberError>;

    /// Forget all key bindings from the previous connection cycle.
    fn reset(&mut self);
}

// ── HandlerTable ─────────────────────────────────────────────────

/// What the table did with an inbound message.
#[derive(Debug)]
pub enum Dispatch {
    /// A definition message produced channel descriptors.
    Channels(Vec<ChannelDescriptor>),
    /// A state message produced zero or more updates.
    States(Vec<StateUpdate>),
    /// No handler owns this kind.
    Unrouted,
}

/// Registry of capability handlers, indexed by tag and by owned wire
/// kinds.
pub struct HandlerTable {
    handlers: Vec<Box<dyn CapabilityHandler>>,
    by_tag: HashMap<Capability, usize>,
    by_kind: HashMap<MessageKind, usize>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            by_tag: HashMap::new(),
            by_kind: HashMap::new(),
        }
    }

    /// Table with every capability this client supports.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(Box::new(SensorHandler::new()));
        table.register(Box::new(BinarySensorHandler::new()));
        table.register(Box::new(TextSensorHandler::new()));
        table.register(Box::new(SwitchHandler::new()));
        table.register(Box::new(SelectHandler::new()));
        table.register(Box::new(ClimateHandler::new()));
        table
    }

    /// Register a handler under its tag and both of its wire kinds.
    ///
    /// Panics on a duplicate registration — the table is built once
    /// at construction and a collision is a programming error.
    pub fn register(&mut self, handler: Box<dyn CapabilityHandler>) {
        let index = self.handlers.len();
        let tag = handler.capability();
        let definition = handler.definition_kind();
        let state = handler.state_kind();

        assert!(
            self.by_tag.insert(tag, index).is_none(),
            "duplicate handler for capability {tag}"
        );
        assert!(
            self.by_kind.insert(definition, index).is_none(),
            "duplicate handler for message kind {definition}"
        );
        assert!(
            self.by_kind.insert(state, index).is_none(),
            "duplicate handler for message kind {state}"
        );
        self.handlers.push(handler);
    }

    /// Whether any handler owns this wire kind.
    pub fn routes(&self, kind: MessageKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Route an inbound message to the handler that owns its kind.
    pub fn dispatch(&mut self, msg: &Message) -> Dispatch {
        let kind = msg.kind();
        let Some(&index) = self.by_kind.get(&kind) else {
            return Dispatch::Unrouted;
        };
        let handler = &mut self.handlers[index];
        if kind == handler.definition_kind() {
            Dispatch::Channels(handler.build_channels(msg))
        } else {
            Dispatch::States(handler.handle_state(msg))
        }
    }

    /// Translate an abstract command via the handler bound to `tag`.
    pub fn encode(
        &self,
        tag: Capability,
        channel: &ChannelDescriptor,
        command: &ChannelCommand,
        key: u32,
    ) -> Result<Message, EmberError> {
        let Some(&index) = self.by_tag.get(&tag) else {
            return Err(EmberError::Api(format!("no handler for capability {tag}")));
        };
        self.handlers[index].encode_command(channel, command, key)
    }

    /// Clear every handler's key bindings.
    pub fn reset(&mut self) {
        for handler in &mut self.handlers {
            handler.reset();
        }
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ── Tests ────────────────────────────────────────────────────────
