//! Climate capability (thermostats, HVAC heads).
//!
//! One climate entity fans out into three channels: operating mode,
//! current temperature (read-only) and target temperature. All three
//! share the entity's numeric key; the channel id suffix decides
//! which aspect a command addresses.

use std::collections::HashMap;

use tracing::debug;

use crate::capability::CapabilityHandler;
use crate::error::EmberError;
use crate::message::{ClimateCommand, ClimateMode, Message, MessageKind};
use crate::registry::{
    Capability, ChannelCommand, ChannelDescriptor, ChannelState, StateUpdate,
};

const MODE_SUFFIX: &str = "_mode";
const CURRENT_SUFFIX: &str = "_current_temperature";
const TARGET_SUFFIX: &str = "_target_temperature";

struct ClimateEntity {
    object_id: String,
    supported_modes: Vec<ClimateMode>,
    min_temperature: f32,
    max_temperature: f32,
}

pub struct ClimateHandler {
    entities: HashMap<u32, ClimateEntity>,
}

impl ClimateHandler {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }
}

impl Default for ClimateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityHandler for ClimateHandler {
    fn capability(&self) -> Capability {
        Capability::Climate
    }

    fn definition_kind(&self) -> MessageKind {
        MessageKind::ClimateDefinition
    }

    fn state_kind(&self) -> MessageKind {
        MessageKind::ClimateState
    }

    fn build_channels(&mut self, definition: &Message) -> Vec<ChannelDescriptor> {
        let Message::ClimateDefinition(def) = definition else {
            return Vec::new();
        };
        self.entities.insert(
            def.key,
            ClimateEntity {
                object_id: def.object_id.clone(),
                supported_modes: def.supported_modes.clone(),
                min_temperature: def.min_temperature,
                max_temperature: def.max_temperature,
            },
        );
        vec![
            ChannelDescriptor {
                id: format!("{}{MODE_SUFFIX}", def.object_id),
                label: format!("{} Mode", def.name),
                capability: Capability::Climate,
                key: def.key,
                item_type: "String",
            },
            ChannelDescriptor {
                id: format!("{}{CURRENT_SUFFIX}", def.object_id),
                label: format!("{} Current Temperature", def.name),
                capability: Capability::Climate,
                key: def.key,
                item_type: "Number",
            },
            ChannelDescriptor {
                id: format!("{}{TARGET_SUFFIX}", def.object_id),
                label: format!("{} Target Temperature", def.name),
                capability: Capability::Climate,
                key: def.key,
                item_type: "Number",
            },
        ]
    }

    fn handle_state(&self, state: &Message) -> Vec<StateUpdate> {
        let Message::ClimateState(st) = state else {
            return Vec::new();
        };
        let Some(entity) = self.entities.get(&st.key) else {
            debug!(key = st.key, "climate state for unknown key");
            return Vec::new();
        };
        vec![
            StateUpdate {
                channel: format!("{}{MODE_SUFFIX}", entity.object_id),
                state: ChannelState::Text(st.mode.to_string()),
            },
            StateUpdate {
                channel: format!("{}{CURRENT_SUFFIX}", entity.object_id),
                state: ChannelState::Decimal(st.current_temperature as f64),
            },
            StateUpdate {
                channel: format!("{}{TARGET_SUFFIX}", entity.object_id),
                state: ChannelState::Decimal(st.target_temperature as f64),
            },
        ]
    }

    fn encode_command(
        &self,
        channel: &ChannelDescriptor,
        command: &ChannelCommand,
        key: u32,
    ) -> Result<Message, EmberError> {
        let entity = self.entities.get(&key);

        if channel.id.ends_with(MODE_SUFFIX) {
            let ChannelCommand::Text(mode) = command else {
                return Err(EmberError::Api(format!(
                    "climate mode channel {} expects a mode name, got {command:?}",
                    channel.id
                )));
            };
            let mode: ClimateMode = mode.parse()?;
            if let Some(entity) = entity {
                if !entity.supported_modes.contains(&mode) {
                    return Err(EmberError::Api(format!(
                        "mode {mode} not supported by climate channel {}",
                        channel.id
                    )));
                }
            }
            return Ok(Message::ClimateCommand(ClimateCommand {
                key,
                mode: Some(mode),
                target_temperature: None,
            }));
        }

        if channel.id.ends_with(TARGET_SUFFIX) {
            let ChannelCommand::Decimal(target) = command else {
                return Err(EmberError::Api(format!(
                    "climate target channel {} expects a temperature, got {command:?}",
                    channel.id
                )));
            };
            let target = *target as f32;
            if let Some(entity) = entity {
                if target < entity.min_temperature || target > entity.max_temperature {
                    return Err(EmberError::Api(format!(
                        "target {target} outside device range {}..{}",
                        entity.min_temperature, entity.max_temperature
                    )));
                }
            }
            return Ok(Message::ClimateCommand(ClimateCommand {
                key,
                mode: None,
                target_temperature: Some(target),
            }));
        }

        Err(EmberError::Api(format!(
            "climate channel {} is read-only, cannot accept {command:?}",
            channel.id
        )))
    }

    fn reset(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClimateDefinition, ClimateState};

    fn thermostat() -> Message {
        Message::ClimateDefinition(ClimateDefinition {
            object_id: "living_room".into(),
            key: 3,
            name: "Living Room".into(),
            supported_modes: vec![ClimateMode::Off, ClimateMode::Heat],
            min_temperature: 5.0,
            max_temperature: 30.0,
            temperature_step: 0.5,
        })
    }

    #[test]
    fn builds_three_channels() {
        let mut handler = ClimateHandler::new();
        let channels = handler.build_channels(&thermostat());
        let ids: Vec<_> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "living_room_mode",
                "living_room_current_temperature",
                "living_room_target_temperature"
            ]
        );
    }

    #[test]
    fn state_fans_out_to_three_updates() {
        let mut handler = ClimateHandler::new();
        handler.build_channels(&thermostat());
        let updates = handler.handle_state(&Message::ClimateState(ClimateState {
            key: 3,
            mode: ClimateMode::Heat,
            current_temperature: 19.5,
            target_temperature: 21.0,
        }));
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].state, ChannelState::Text("heat".into()));
        assert_eq!(updates[2].state, ChannelState::Decimal(21.0));
    }

    #[test]
    fn mode_command_round_trips() {
        let mut handler = ClimateHandler::new();
        let channels = handler.build_channels(&thermostat());
        let msg = handler
            .encode_command(&channels[0], &ChannelCommand::Text("heat".into()), 3)
            .unwrap();
        assert_eq!(
            msg,
            Message::ClimateCommand(ClimateCommand {
                key: 3,
                mode: Some(ClimateMode::Heat),
                target_temperature: None,
            })
        );
    }

    #[test]
    fn unsupported_mode_is_rejected() {
        let mut handler = ClimateHandler::new();
        let channels = handler.build_channels(&thermostat());
        let res = handler.encode_command(&channels[0], &ChannelCommand::Text("cool".into()), 3);
        assert!(res.is_err());
    }

    #[test]
    fn target_temperature_respects_device_range() {
        let mut handler = ClimateHandler::new();
        let channels = handler.build_channels(&thermostat());

        let msg = handler
            .encode_command(&channels[2], &ChannelCommand::Decimal(21.0), 3)
            .unwrap();
        assert_eq!(
            msg,
            Message::ClimateCommand(ClimateCommand {
                key: 3,
                mode: None,
                target_temperature: Some(21.0),
            })
        );

        let res = handler.encode_command(&channels[2], &ChannelCommand::Decimal(50.0), 3);
        assert!(res.is_err());
    }

    #[test]
    fn current_temperature_channel_rejects_commands() {
        let mut handler = ClimateHandler::new();
        let channels = handler.build_channels(&thermostat());
        let res = handler.encode_command(&channels[1], &ChannelCommand::Decimal(20.0), 3);
        assert!(res.is_err());
    }
}
