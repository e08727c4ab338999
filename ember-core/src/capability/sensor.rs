//! Numeric sensor capability (temperatures, power readings, ...).
//!
//! Read-only: state flows device → client, commands are rejected.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::CapabilityHandler;
use crate::error::EmberError;
use crate::message::{Message, MessageKind};
use crate::registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, StateUpdate,
};

pub struct SensorHandler {
    channels: HashMap<u32, String>,
}

impl SensorHandler {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl Default for SensorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityHandler for SensorHandler {
    fn capability(&self) -> Capability {
        Capability::Sensor
    }

    fn definition_kind(&self) -> MessageKind {
        MessageKind::SensorDefinition
    }

    fn state_kind(&self) -> MessageKind {
        MessageKind::SensorState
    }

    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor> {
        let Message::SensorDefinition(def) = definition else {
            return Vec::new();
        };
        self.channels.insert(def.key, def.object_id.clone());
        vec![ChannelDescriptor {
            id: def.object_id.clone(),
            label: def.name.clone(),
            capability: Capability::Sensor,
            key: def.key,
            item_type: "Number",
        }]
    }

    fn handle_state(&self, state: &Message) -> Vec<StateUpdate> {
        let Message::SensorState(st) = state else {
            return Vec::new();
        };
        let Some(id) = self.channels.get(&st.key) else {
            debug!(key = st.key, "sensor state for unknown key");
            return Vec::new();
        };
        let value = if st.missing_state {
            ChannelState::Undefined
        } else {
            ChannelState::Decimal(st.state as f64)
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
            "sensor channel {} is read-only, cannot accept {command:?}",
            channel.id
        )))
    }

    fn reset(&mut self) {
        self.channels.clear();
    }
}
