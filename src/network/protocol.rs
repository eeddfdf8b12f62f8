//! Protocol Messages
//!
//! Every message travels in a [`Message`] envelope: who sent it, the
//! sender's command frame, a type tag, and a bincode-encoded body. Framing
//! the envelope on the wire is the transport's job.
//!
//! JSON helpers exist for logging and debugging; the simulation only ever
//! sees bincode.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::game::entity::{EntityId, PlayerId};
use crate::game::events::GameEvent;
use crate::game::input::FrameInput;
use crate::game::snapshot::EntitySnapshot;
use crate::netcode::prediction::FrameReference;

/// Sender id used by the server.
pub const SERVER_SENDER_ID: u32 = 0;

/// Errors encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Body or envelope failed binary encoding
    #[error("Binary codec error: {0}")]
    Binary(#[from] bincode::Error),

    /// Envelope failed JSON encoding
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Body decoded as the wrong type
    #[error("Expected {expected:?} body, got {found:?}")]
    TypeMismatch {
        /// Type the caller asked for
        expected: MessageType,
        /// Type tag on the envelope
        found: MessageType,
    },

    /// Message type not accepted by this endpoint
    #[error("Unexpected {0:?} message")]
    Unexpected(MessageType),

    /// Message from a sender with no player
    #[error("Message from unknown sender {0}")]
    UnknownSender(u32),
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client asks for a character
    CreatePlayer,
    /// Server assigns ids and spawn transform
    AckCreatePlayer,
    /// One frame of client input
    Input,
    /// Authoritative world snapshot
    GameStateUpdate,
    /// Latency probe
    Ping,
    /// Latency probe reply
    AckPing,
}

/// Wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Connection id of the sender ([`SERVER_SENDER_ID`] for the server)
    pub sender_id: u32,
    /// Sender's command frame when the message was produced
    pub command_frame: u64,
    /// Body type
    pub message_type: MessageType,
    /// Bincode-encoded body
    pub body: Vec<u8>,
}

/// A message body with a fixed type tag.
pub trait MessageBody: Serialize + DeserializeOwned {
    /// Tag written into the envelope.
    const TYPE: MessageType;
}

impl Message {
    /// Wrap `body` in an envelope.
    pub fn new<B: MessageBody>(sender_id: u32, command_frame: u64, body: &B) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender_id,
            command_frame,
            message_type: B::TYPE,
            body: bincode::serialize(body)?,
        })
    }

    /// Decode the body, checking the type tag first.
    pub fn decode<B: MessageBody>(&self) -> Result<B, ProtocolError> {
        if self.message_type != B::TYPE {
            return Err(ProtocolError::TypeMismatch {
                expected: B::TYPE,
                found: self.message_type,
            });
        }
        Ok(bincode::deserialize(&self.body)?)
    }

    /// Serialize the envelope to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize an envelope from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }

    /// Serialize the envelope to JSON.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize an envelope from JSON.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

// =============================================================================
// CLIENT -> SERVER BODIES
// =============================================================================

/// Request a character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePlayer;

impl MessageBody for CreatePlayer {
    const TYPE: MessageType = MessageType::CreatePlayer;
}

/// Input for the envelope's command frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    /// The input.
    pub input: FrameInput,
}

impl MessageBody for InputMessage {
    const TYPE: MessageType = MessageType::Input;
}

/// Latency probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Client wall clock when sent, Unix milliseconds
    pub sent_at_ms: i64,
}

impl MessageBody for Ping {
    const TYPE: MessageType = MessageType::Ping;
}

// =============================================================================
// SERVER -> CLIENT BODIES
// =============================================================================

/// Ids and spawn transform for a newly created character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AckCreatePlayer {
    /// Assigned player id
    pub player_id: PlayerId,
    /// Character entity
    pub entity_id: EntityId,
    /// Camera entity following the character
    pub camera_id: EntityId,
    /// Spawn position
    pub position: Vec3,
    /// Spawn orientation
    pub orientation: Quat,
}

impl MessageBody for AckCreatePlayer {
    const TYPE: MessageType = MessageType::AckCreatePlayer;
}

/// Authoritative snapshot broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateUpdate {
    /// Newest local frame of the receiving client's input applied
    pub last_input_command_frame: u64,
    /// Global frame that input was applied on
    pub last_input_global_command_frame: u64,
    /// Global frame of the snapshot
    pub current_global_command_frame: u64,
    /// Every replicated entity
    pub entities: BTreeMap<EntityId, EntitySnapshot>,
    /// Events since the previous broadcast, sorted
    pub events: Vec<GameEvent>,
}

impl GameStateUpdate {
    /// Frame bookkeeping for reconciliation.
    pub fn frame_reference(&self) -> FrameReference {
        FrameReference {
            last_input_command_frame: self.last_input_command_frame,
            last_input_global_command_frame: self.last_input_global_command_frame,
            current_global_command_frame: self.current_global_command_frame,
        }
    }
}

impl MessageBody for GameStateUpdate {
    const TYPE: MessageType = MessageType::GameStateUpdate;
}

/// Latency probe reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPing {
    /// The probe's `sent_at_ms`, echoed
    pub ping_sent_at_ms: i64,
    /// Server wall clock on receipt, Unix milliseconds
    pub server_time_ms: i64,
}

impl MessageBody for AckPing {
    const TYPE: MessageType = MessageType::AckPing;
}

/// Wall clock in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::EntityType;
    use crate::game::events::GameEventData;

    fn snapshot(id: u32) -> EntitySnapshot {
        EntitySnapshot {
            entity_id: EntityId(id),
            entity_type: EntityType::Player,
            player_id: Some(PlayerId(1)),
            owner: None,
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::from_rotation_y(0.5),
            velocity: Vec3::new(0.0, -4.0, 0.0),
            impulses: BTreeMap::new(),
            animation: "run".to_string(),
            controller: None,
        }
    }

    #[test]
    fn test_input_message_through_envelope() {
        let body = InputMessage {
            input: FrameInput::with_flags(FrameInput::FLAG_FORWARD | FrameInput::FLAG_ZIP, Quat::IDENTITY),
        };
        let message = Message::new(3, 42, &body).unwrap();
        assert_eq!(message.message_type, MessageType::Input);

        let wire = message.to_bytes().unwrap();
        let parsed = Message::from_bytes(&wire).unwrap();
        assert_eq!(parsed.sender_id, 3);
        assert_eq!(parsed.command_frame, 42);
        assert_eq!(parsed.decode::<InputMessage>().unwrap(), body);
    }

    #[test]
    fn test_state_update_body() {
        let mut entities = BTreeMap::new();
        entities.insert(EntityId(2), snapshot(2));
        let update = GameStateUpdate {
            last_input_command_frame: 40,
            last_input_global_command_frame: 97,
            current_global_command_frame: 100,
            entities,
            events: vec![GameEvent::entity_despawned(99, EntityId(5))],
        };

        let message = Message::new(SERVER_SENDER_ID, 100, &update).unwrap();
        let parsed: GameStateUpdate = message.decode().unwrap();

        assert_eq!(parsed.frame_reference().lookup_frame(), 43);
        assert_eq!(parsed.entities[&EntityId(2)], snapshot(2));
        assert_eq!(
            parsed.events[0].data,
            GameEventData::EntityDespawned {
                entity_id: EntityId(5)
            }
        );
    }

    #[test]
    fn test_decode_checks_type() {
        let message = Message::new(1, 0, &Ping { sent_at_ms: 5 }).unwrap();
        let err = message.decode::<AckPing>().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TypeMismatch {
                expected: MessageType::AckPing,
                found: MessageType::Ping,
            }
        ));
    }

    #[test]
    fn test_malformed_body_is_error() {
        let message = Message {
            sender_id: 1,
            command_frame: 0,
            message_type: MessageType::AckCreatePlayer,
            body: vec![1, 2],
        };
        assert!(matches!(message.decode::<AckCreatePlayer>(), Err(ProtocolError::Binary(_))));
        assert!(Message::from_bytes(&[0xff]).is_err());
    }

    #[test]
    fn test_envelope_json() {
        let message = Message::new(2, 7, &CreatePlayer).unwrap();
        let json = message.to_json().unwrap();
        assert!(json.contains("\"create_player\""));
        assert_eq!(Message::from_json(&json).unwrap(), message);
    }
}
