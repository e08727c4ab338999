//! Select capability: a string value constrained to a fixed option
//! list declared by the device.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::CapabilityHandler;
use crate::error::EmberError;
use crate::message::{Message, MessageKind, SelectCommand};
use crate::registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, StateUpdate,
};

pub struct SelectHandler {
    channels: HashMap<u32, String>,
    /// Option lists by key, used to reject commands the device would
    /// ignore.
    options: HashMap<u32, Vec<String>>,
}

impl SelectHandler {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            options: HashMap::new(),
        }
    }
}

impl Default for SelectHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityHandler for SelectHandler {
    fn capability(&self) -> Capability {
        Capability::Select
    }

    fn definition_kind(&self) -> MessageKind {
        MessageKind::SelectDefinition
    }

    fn state_kind(&self) -> MessageKind {
        MessageKind::SelectState
    }

    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor> {
        let Message::SelectDefinition(def) = definition else {
            return Vec::new();
        };
        self.channels.insert(def.key, def.object_id.clone());
        self.options.insert(def.key, def.options.clone());
        vec![ChannelDescriptor {
            id: def.object_id.clone(),
            label: def.name.clone(),
            capability: Capability::Select,
            key: def.key,
            item_type: "String",
        }]
    }

    fn handle_state(&self, state: &Message) -> Vec<StateUpdate> {
        let Message::SelectState(st) = state else {
            return Vec::new();
        };
        let Some(id) = self.channels.get(&st.key) else {
            debug!(key = st.key, "select state for unknown key");
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
        key: u32,
    ) -> Result<Message, EmberError> {
        let ChannelCommand::Text(option) = command else {
            return Err(EmberError::Api(format!(
                "select channel {} cannot accept {command:?}",
                channel.id
            )));
        };
        if let Some(options) = self.options.get(&key) {
            if !options.iter().any(|o| o == option) {
                return Err(EmberError::Api(format!(
                    "option {option:?} not offered by select channel {}",
                    channel.id
                )));
            }
        }
        Ok(Message::SelectCommand(SelectCommand {
            key,
            state: option.clone(),
        }))
    }

    fn reset(&mut self) {
        self.channels.clear();
        self.options.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SelectDefinition, SelectState};

    fn fan_mode() -> Message {
        Message::SelectDefinition(SelectDefinition {
            object_id: "fan_mode".into(),
            key: 8,
            name: "Fan Mode".into(),
            options: vec!["low".into(), "high".into()],
        })
    }

    #[test]
    fn state_projects_to_text() {
        let mut handler = SelectHandler::new();
        handler.build_channels(&fan_mode());
        let updates = handler.handle_state(&Message::SelectState(SelectState {
            key: 8,
            state: "low".into(),
            missing_state: false,
        }));
        assert_eq!(updates[0].state, ChannelState::Text("low".into()));
    }

    #[test]
    fn known_option_encodes_command() {
        let mut handler = SelectHandler::new();
        let channels = handler.build_channels(&fan_mode());
        let msg = handler
            .encode_command(&channels[0], &ChannelCommand::Text("high".into()), 8)
            .unwrap();
        assert_eq!(
            msg,
            Message::SelectCommand(SelectCommand {
                key: 8,
                state: "high".into()
            })
        );
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut handler = SelectHandler::new();
        let channels = handler.build_channels(&fan_mode());
        let res = handler.encode_command(&channels[0], &ChannelCommand::Text("turbo".into()), 8);
        assert!(res.is_err());
    }
}
