//! Switch capability: the one bidirectional boolean.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::CapabilityHandler;
use crate::error::EmberError;
use crate::message::{Message, MessageKind, SwitchCommand};
use crate::registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, StateUpdate,
};

pub struct SwitchHandler {
    channels: HashMap<u32, String>,
}

impl SwitchHandler {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }
}

impl Default for SwitchHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityHandler for SwitchHandler {
    fn capability(&self) -> Capability {
        Capability::Switch
    }

    fn definition_kind(&self) -> MessageKind {
        MessageKind::SwitchDefinition
    }

    fn state_kind(&self) -> MessageKind {
        MessageKind::SwitchState
    }

    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor> {
        let Message::SwitchDefinition(def) = definition else {
            return Vec::new();
        };
        self.channels.insert(def.key, def.object_id.clone());
        vec![ChannelDescriptor {
            id: def.object_id.clone(),
            label: def.name.clone(),
            capability: Capability::Switch,
            key: def.key,
            item_type: "Switch",
        }]
    }

    fn handle_state(&self, state: &Message) -> Vec<StateUpdate> {
        let Message::SwitchState(st) = state else {
            return Vec::new();
        };
        let Some(id) = self.channels.get(&st.key) else {
            debug!(key = st.key, "switch state for unknown key");
            return Vec::new();
        };
        vec![StateUpdate {
            channel: id.clone(),
            state: ChannelState::OnOff(st.state),
        }]
    }

    fn encode_command(
        &self,
        channel: &ChannelDescriptor,
        command: &ChannelCommand,
        key: u32,
    ) -> Result<Message, EmberError> {
        match command {
            ChannelCommand::OnOff(on) => {
                Ok(Message::SwitchCommand(SwitchCommand { key, state: *on }))
            }
            other => Err(EmberError::Api(format!(
                "switch channel {} cannot accept {other:?}",
                channel.id
            ))),
        }
    }

    fn reset(&mut self) {
        self.channels.clear();
    }
}
