//! Authoritative Game Server
//!
//! Owns the authoritative world and the global command frame. Each tick:
//!
//! 1. Drain inbound messages (create player, input, ping)
//! 2. Release due inputs from the input buffer, holding the last input for
//!    players with nothing due
//! 3. Run the server frame
//! 4. Every `snapshot_interval_frames`, send each player a state update

use std::collections::BTreeMap;

use chrono::Utc;
use glam::{Quat, Vec3};
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::core::hash::{short_hex, StateHash};
use crate::game::entity::{EntityId, PlayerId};
use crate::game::events::GameEvent;
use crate::game::input::FrameInput;
use crate::game::step::{tick_server_world, TickResult};
use crate::game::world::World;
use crate::netcode::input_buffer::InputBuffer;
use crate::network::dispatch::{dispatch_inbound, send_logged, InboundQueue, MessageHandler, MessageSender};
use crate::network::driver::{Simulation, StepControl};
use crate::network::protocol::{
    now_ms, AckCreatePlayer, AckPing, CreatePlayer, GameStateUpdate, InputMessage, Message, MessageBody, MessageType,
    Ping, ProtocolError, SERVER_SENDER_ID,
};

/// Horizontal spacing between spawn points.
const SPAWN_SPACING: f32 = 30.0;

/// Server-side state for one connected player.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    /// Player id
    pub player_id: PlayerId,
    /// Character entity
    pub entity: EntityId,
    /// Camera entity
    pub camera: EntityId,
    /// Input applied on the latest frame (held when nothing is due)
    pub last_input: FrameInput,
    /// Player frame of the latest applied input (0 before any)
    pub last_input_frame: u64,
    /// Global frame the latest input was applied on
    pub last_input_global_frame: u64,
}

/// Outcome of one server tick.
#[derive(Debug)]
pub struct ServerTick {
    /// Global frame just simulated
    pub frame: u64,
    /// Messages handled before simulating
    pub messages: usize,
    /// Simulation result
    pub result: TickResult,
    /// Whether a state update went out
    pub broadcast: bool,
}

/// Authoritative server.
pub struct GameServer {
    config: SimulationConfig,
    world: World,
    global_frame: u64,
    input_buffer: InputBuffer,
    players: BTreeMap<u32, PlayerSlot>,
    connections: BTreeMap<u32, Box<dyn MessageSender>>,
    next_connection: u32,
    last_fired: BTreeMap<EntityId, u64>,
    pending_events: Vec<GameEvent>,
    rejected_inputs: u64,
}

impl GameServer {
    /// Server with an empty arena.
    pub fn new(config: SimulationConfig) -> Self {
        let mut world = World::new();
        world.spawn_arena();

        Self {
            input_buffer: InputBuffer::new(config.input_buffer_size),
            config,
            world,
            global_frame: 0,
            players: BTreeMap::new(),
            connections: BTreeMap::new(),
            next_connection: SERVER_SENDER_ID + 1,
            last_fired: BTreeMap::new(),
            pending_events: Vec::new(),
            rejected_inputs: 0,
        }
    }

    /// Register an outbound connection. The returned id is the sender id the
    /// client must use.
    pub fn connect(&mut self, sender: Box<dyn MessageSender>) -> u32 {
        let id = self.next_connection;
        self.next_connection += 1;
        self.connections.insert(id, sender);
        info!(connection = id, "Client connected");
        id
    }

    /// Drop a connection and its character.
    pub fn disconnect(&mut self, connection: u32) {
        self.connections.remove(&connection);
        let Some(slot) = self.players.remove(&connection) else {
            return;
        };

        self.input_buffer.remove_player(slot.player_id);
        self.last_fired.remove(&slot.entity);
        for entity in [slot.entity, slot.camera] {
            if self.world.despawn(entity).is_some() {
                self.pending_events.push(GameEvent::entity_despawned(self.global_frame, entity));
            }
        }
        info!(connection, player = %slot.player_id, "Client disconnected");
    }

    /// Run one global command frame.
    pub fn tick(&mut self, inbound: &mut InboundQueue) -> ServerTick {
        self.global_frame += 1;
        let frame = self.global_frame;

        let messages = dispatch_inbound(inbound, self);

        let mut inputs = BTreeMap::new();
        for slot in self.players.values_mut() {
            if let Some(buffered) = self.input_buffer.pull_input(frame, slot.player_id) {
                slot.last_input = buffered.input;
                slot.last_input_frame = buffered.player_frame;
                slot.last_input_global_frame = frame;
            }
            inputs.insert(slot.entity, slot.last_input);
        }

        let result = tick_server_world(&mut self.world, frame, &inputs, &mut self.last_fired, &self.config);
        self.pending_events.extend(result.events.iter().cloned());

        let broadcast = frame % self.config.snapshot_interval_frames.max(1) == 0;
        if broadcast {
            self.broadcast_state();
        }

        ServerTick {
            frame,
            messages,
            result,
            broadcast,
        }
    }

    fn broadcast_state(&mut self) {
        let entities = self.world.snapshots();
        let mut events = std::mem::take(&mut self.pending_events);
        events.sort();

        for (connection, slot) in &self.players {
            let update = GameStateUpdate {
                last_input_command_frame: slot.last_input_frame,
                last_input_global_command_frame: slot.last_input_global_frame,
                current_global_command_frame: self.global_frame,
                entities: entities.clone(),
                events: events.clone(),
            };
            self.send_to(*connection, &update);
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(frame = self.global_frame, entities = entities.len(), "State broadcast");
    }

    fn send_to<B: MessageBody>(&self, connection: u32, body: &B) {
        let Some(sender) = self.connections.get(&connection) else {
            warn!(connection, "No connection for outbound message");
            return;
        };
        match Message::new(SERVER_SENDER_ID, self.global_frame, body) {
            Ok(message) => {
                send_logged(sender.as_ref(), message);
            }
            Err(e) => warn!(connection, error = %e, "Failed to encode outbound message"),
        }
    }

    // =========================================================================
    // HANDLERS
    // =========================================================================

    fn handle_create_player(&mut self, connection: u32) -> Result<(), ProtocolError> {
        if !self.connections.contains_key(&connection) {
            return Err(ProtocolError::UnknownSender(connection));
        }

        if let Some(slot) = self.players.get(&connection) {
            warn!(connection, player = %slot.player_id, "Duplicate create request");
            let ack = self.ack_for(slot);
            self.send_to(connection, &ack);
            return Ok(());
        }

        let player_id = PlayerId(connection);
        let spawn = Vec3::new(self.players.len() as f32 * SPAWN_SPACING, 0.0, 0.0);
        let entity = self.world.allocate_id();
        self.world.spawn_player(entity, player_id, spawn);
        let camera = self.world.allocate_id();
        self.world.spawn_camera(camera, entity, Quat::IDENTITY);

        let slot = PlayerSlot {
            player_id,
            entity,
            camera,
            last_input: FrameInput::new(),
            last_input_frame: 0,
            last_input_global_frame: 0,
        };
        let ack = self.ack_for(&slot);
        self.players.insert(connection, slot);
        self.pending_events
            .push(GameEvent::player_joined(self.global_frame, player_id, entity));

        info!(connection, player = %player_id, entity = %entity, "Player created");
        self.send_to(connection, &ack);
        Ok(())
    }

    fn ack_for(&self, slot: &PlayerSlot) -> AckCreatePlayer {
        let transform = self.world.transform(slot.entity).ok().copied().unwrap_or_default();
        AckCreatePlayer {
            player_id: slot.player_id,
            entity_id: slot.entity,
            camera_id: slot.camera,
            position: transform.position,
            orientation: transform.orientation,
        }
    }

    fn handle_input(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let body: InputMessage = message.decode()?;
        let slot = self
            .players
            .get(&message.sender_id)
            .ok_or(ProtocolError::UnknownSender(message.sender_id))?;

        // Refused inputs are dropped, never fatal
        if let Err(err) = self.input_buffer.push_input(
            self.global_frame,
            message.command_frame,
            slot.last_input_frame,
            slot.player_id,
            Utc::now(),
            body.input,
        ) {
            warn!(error = %err, "Dropping input");
            self.rejected_inputs += 1;
        }
        Ok(())
    }

    fn handle_ping(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let ping: Ping = message.decode()?;
        let ack = AckPing {
            ping_sent_at_ms: ping.sent_at_ms,
            server_time_ms: now_ms(),
        };
        self.send_to(message.sender_id, &ack);
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current global command frame.
    pub fn global_frame(&self) -> u64 {
        self.global_frame
    }

    /// Authoritative world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Player slot for a connection.
    pub fn player(&self, connection: u32) -> Option<&PlayerSlot> {
        self.players.get(&connection)
    }

    /// Connected players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Inputs refused as out-of-order or already confirmed.
    pub fn rejected_inputs(&self) -> u64 {
        self.rejected_inputs
    }

    /// Hash of the authoritative world.
    pub fn world_hash(&self) -> StateHash {
        self.world.compute_hash()
    }

    /// Simulation config.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

impl MessageHandler for GameServer {
    fn handle_message(&mut self, message: Message) -> Result<(), ProtocolError> {
        match message.message_type {
            MessageType::CreatePlayer => {
                message.decode::<CreatePlayer>()?;
                self.handle_create_player(message.sender_id)
            }
            MessageType::Input => self.handle_input(&message),
            MessageType::Ping => self.handle_ping(&message),
            other => Err(ProtocolError::Unexpected(other)),
        }
    }
}

/// A server plus its inbound queue, driven by the fixed loop.
pub struct ServerNode {
    /// The server
    pub server: GameServer,
    /// Messages from clients
    pub inbound: InboundQueue,
    /// Stop after this many frames (0 = run until shut down)
    pub frame_limit: u64,
}

impl Simulation for ServerNode {
    fn step(&mut self) -> StepControl {
        let tick = self.server.tick(&mut self.inbound);
        if tick.result.resolution.truncated() {
            debug!(frame = tick.frame, "Collision resolution truncated");
        }
        if tick.frame % 600 == 0 {
            info!(
                frame = tick.frame,
                players = self.server.player_count(),
                hash = %short_hex(&self.server.world_hash()),
                "Server checkpoint"
            );
        }

        if self.frame_limit > 0 && tick.frame >= self.frame_limit {
            StepControl::Stop
        } else {
            StepControl::Continue
        }
    }

    fn frame(&self) -> u64 {
        self.server.global_frame()
    }
}
