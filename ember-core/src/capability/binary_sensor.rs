//! Binary sensor capability (door contacts, motion, ...). Read-only;
//! projected as an open/closed contact.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::CapabilityHandler;
use crate::error::EmberError;
use crate::message::{Message, MessageKind};
use crate::registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, StateUpdate,
};

pub struct BinarySensorHandler {
    channels: HashMap<u32, String>,
}

impl BinarySensorHandler {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl Default for BinarySensorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityHandler for BinarySensorHandler {
    fn capability(&self) -> Capability {
        Capability::BinarySensor
    }

    fn definition_kind(&self) -> MessageKind {
        MessageKind::BinarySensorDefinition
    }

    fn state_kind(&self) -> MessageKind {
        MessageKind::BinarySensorState
    }

    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor> {
        let Message::BinarySensorDefinition(def) = definition else {
            return Vec::new();
        };
        self.channels.insert(def.key, def.object_id.clone());
        vec![ChannelDescriptor {
            id: def.object_id.clone(),
            label: def.name.clone(),
            capability: Capability::BinarySensor,
            key: def.key,
            item_type: "Contact",
        }]
    }

    fn handle_state(&self, state: &Message) -> Vec<StateUpdate> {
        let Message::BinarySensorState(st) = state else {
            return Vec::new();
        };
        let Some(id) = self.channels.get(&st.key) else {
            debug!(key = st.key, "binary sensor state for unknown key");
            return Vec::new();
        };
        let value = if st.missing_state {
            ChannelState::Undefined
        } else {
            ChannelState::Contact(st.state)
        };
        vec![StateUpdate {
            channel: id.clone(),
            state: value,
        }]
    }

    fn encode_command(
        &self,
        channel: &ChannelDescriptor,
        command: &ChannelCommand,
        _key: u32,
    ) -> Result<Message, EmberError> {
        Err(EmberError::Api(format!(
            "binary sensor channel {} is read-only, cannot accept {command:?}",
            channel.id
        )))
    }

    fn reset(&mut self) {
        self.channels.clear();
    }
}
