//! Text sensor capability. Read-only string values.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::CapabilityHandler;
use crate::error::EmberError;
use crate::message::{Message, MessageKind};
use crate::registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, StateUpdate,
};

pub struct TextSensorHandler {
    channels: HashMap<u32, String>,
}

impl TextSensorHandler {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl Default for TextSensorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityHandler for TextSensorHandler {
    fn capability(&self) -> Capability {
        Capability::TextSensor
    }

    fn definition_kind(&self) -> MessageKind {
        MessageKind::TextSensorDefinition
    }

    fn state_kind(&self) -> MessageKind {
        MessageKind::TextSensorState
    }

    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor> {
        let Message::TextSensorDefinition(def) = definition else {
            return Vec::new();
        };
        self.channels.insert(def.key, def.object_id.clone());
        vec![ChannelDescriptor {
            id: def.object_id.clone(),
            label: def.name.clone(),
            capability: Capability::TextSensor,
            key: def.key,
            item_type: "String",
        }]
    }

    fn handle_state(&self, state: &Message) -> Vec<StateUpdate> {
        let Message::TextSensorState(st) = state else {
            return Vec::new();
        };
        let Some(id) = self.channels.get(&st.key) else {
            debug!(key = st.key, "text sensor state for unknown key");
            return Vec::new();
        };
        let value = if st.missing_state {
            ChannelState::Undefined
        } else {
            ChannelState::Text(st.state.clone())
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
            "text sensor channel {} is read-only, cannot accept {command:?}",
            channel.id
        )))
    }

    fn reset(&mut self) {
        self.channels.clear();
    }
}
