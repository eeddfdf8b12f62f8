//! Predicting Game Client
//!
//! Simulates the local player immediately, records every frame, and
//! reconciles against authoritative updates. Remote entities are never
//! simulated; they play back from the state buffer one local frame at a
//! time.

use glam::Quat;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::game::entity::{EntityId, PlayerId};
use crate::game::events::GameEventData;
use crate::game::input::FrameInput;
use crate::game::world::World;
use crate::netcode::history::CommandFrameHistory;
use crate::netcode::interpolation::{EntityBundle, StateBuffer};
use crate::netcode::prediction::{predict_frame, reconcile, Reconciliation};
use crate::network::dispatch::{dispatch_inbound, send_logged, InboundQueue, MessageHandler, MessageSender};
use crate::network::driver::{Simulation, StepControl};
use crate::network::protocol::{
    now_ms, AckCreatePlayer, AckPing, CreatePlayer, GameStateUpdate, InputMessage, Message, MessageBody, MessageType,
    Ping, ProtocolError,
};

/// Ids of this client's character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPlayer {
    /// Assigned player id
    pub player_id: PlayerId,
    /// Character entity
    pub entity: EntityId,
    /// Camera entity
    pub camera: EntityId,
}

/// Prediction and network counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Local frames simulated
    pub frames: u64,
    /// State updates received
    pub updates_received: u64,
    /// Updates that confirmed the prediction
    pub prediction_hits: u64,
    /// Updates with no matching history
    pub unmatched: u64,
    /// Updates that forced a rollback
    pub mispredictions: u64,
    /// Frames re-simulated by rollbacks
    pub replayed_frames: u64,
    /// Latest round-trip time
    pub rtt_ms: Option<i64>,
}

/// Client-side session.
pub struct GameClient {
    sender_id: u32,
    config: SimulationConfig,
    world: World,
    sender: Box<dyn MessageSender>,
    local_frame: u64,
    local: Option<LocalPlayer>,
    history: CommandFrameHistory,
    state_buffer: StateBuffer,
    stats: ClientStats,
    create_sent: bool,
}

impl GameClient {
    /// Client for connection `sender_id`, sending through `sender`.
    pub fn new(sender_id: u32, sender: Box<dyn MessageSender>, config: SimulationConfig) -> Self {
        let mut world = World::new();
        world.spawn_arena();

        Self {
            sender_id,
            history: CommandFrameHistory::new(config.history_capacity),
            state_buffer: StateBuffer::new(config.state_buffer_size),
            config,
            world,
            sender,
            local_frame: 0,
            local: None,
            stats: ClientStats::default(),
            create_sent: false,
        }
    }

    /// Run one local command frame with `input`.
    ///
    /// Until the server has assigned a character this only processes
    /// messages and (once) requests a character.
    pub fn tick(&mut self, inbound: &mut InboundQueue, input: FrameInput) -> Option<u64> {
        dispatch_inbound(inbound, self);

        let Some(local) = self.local else {
            if !self.create_sent {
                self.send(&CreatePlayer);
                self.create_sent = true;
            }
            return None;
        };

        self.local_frame += 1;
        let frame = self.local_frame;

        if let Some(bundle) = self.state_buffer.pull_entity_interpolations(frame) {
            for (id, snapshot) in &bundle {
                if *id != local.entity {
                    self.world.apply_snapshot(snapshot);
                }
            }
        }

        if let Err(e) = predict_frame(&mut self.world, &mut self.history, local.entity, frame, input, &self.config) {
            warn!(frame, error = %e, "Prediction failed");
        }
        self.stats.frames += 1;

        self.send(&InputMessage { input });

        if frame % self.config.ping_interval_frames.max(1) == 0 {
            self.send(&Ping { sent_at_ms: now_ms() });
        }

        Some(frame)
    }

    fn send<B: MessageBody>(&self, body: &B) {
        match Message::new(self.sender_id, self.local_frame, body) {
            Ok(message) => {
                send_logged(self.sender.as_ref(), message);
            }
            Err(e) => warn!(error = %e, "Failed to encode outbound message"),
        }
    }

    // =========================================================================
    // HANDLERS
    // =========================================================================

    fn handle_ack_create(&mut self, ack: AckCreatePlayer) {
        if self.local.is_some() {
            debug!("Ignoring repeated create acknowledgement");
            return;
        }

        self.world.spawn_player(ack.entity_id, ack.player_id, ack.position);
        if let Ok(transform) = self.world.transform_mut(ack.entity_id) {
            transform.orientation = ack.orientation;
        }
        self.world.spawn_camera(ack.camera_id, ack.entity_id, Quat::IDENTITY);

        self.local = Some(LocalPlayer {
            player_id: ack.player_id,
            entity: ack.entity_id,
            camera: ack.camera_id,
        });
        info!(player = %ack.player_id, entity = %ack.entity_id, "Joined game");
    }

    fn handle_state_update(&mut self, update: GameStateUpdate) {
        self.stats.updates_received += 1;
        let own = self.local.map(|l| l.entity);

        for event in &update.events {
            if let GameEventData::EntityDespawned { entity_id } = event.data {
                if Some(entity_id) != own {
                    self.world.despawn(entity_id);
                    self.state_buffer.remove_entity(entity_id);
                }
            }
        }

        if let Some(local) = self.local {
            if let Some(snapshot) = update.entities.get(&local.entity) {
                self.reconcile_local(local.entity, &update, snapshot);
            }
        }

        let remote: EntityBundle = update
            .entities
            .iter()
            .filter(|(id, _)| Some(**id) != own)
            .map(|(id, snapshot)| (*id, snapshot.clone()))
            .collect();
        self.state_buffer
            .push_entity_update(self.local_frame, update.current_global_command_frame, remote);
    }

    fn reconcile_local(
        &mut self,
        entity: EntityId,
        update: &GameStateUpdate,
        snapshot: &crate::game::snapshot::EntitySnapshot,
    ) {
        let outcome = reconcile(
            &mut self.world,
            &mut self.history,
            entity,
            update.frame_reference(),
            snapshot,
            &self.config,
        );

        match outcome {
            Ok(Reconciliation::Hit { .. }) => self.stats.prediction_hits += 1,
            Ok(Reconciliation::Unmatched { .. }) => self.stats.unmatched += 1,
            Ok(Reconciliation::Rollback { replayed, .. }) => {
                self.stats.mispredictions += 1;
                self.stats.replayed_frames += replayed as u64;
            }
            Err(e) => warn!(error = %e, "Reconciliation failed"),
        }
    }

    fn handle_ack_ping(&mut self, ack: AckPing) {
        let rtt = now_ms() - ack.ping_sent_at_ms;
        self.stats.rtt_ms = Some(rtt);
        debug!(rtt_ms = rtt, "Ping acknowledged");
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Connection id used as sender id.
    pub fn sender_id(&self) -> u32 {
        self.sender_id
    }

    /// Latest local command frame.
    pub fn local_frame(&self) -> u64 {
        self.local_frame
    }

    /// This client's character, once assigned.
    pub fn local_player(&self) -> Option<LocalPlayer> {
        self.local
    }

    /// Client world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Counters.
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Unconfirmed predicted frames.
    pub fn history(&self) -> &CommandFrameHistory {
        &self.history
    }
}

impl MessageHandler for GameClient {
    fn handle_message(&mut self, message: Message) -> Result<(), ProtocolError> {
        match message.message_type {
            MessageType::AckCreatePlayer => self.handle_ack_create(message.decode()?),
            MessageType::GameStateUpdate => self.handle_state_update(message.decode()?),
            MessageType::AckPing => self.handle_ack_ping(message.decode()?),
            other => return Err(ProtocolError::Unexpected(other)),
        }
        Ok(())
    }
}

/// Produces the local input for each frame.
pub trait InputSource: Send {
    /// Input for local frame `frame`.
    fn next_input(&mut self, frame: u64) -> FrameInput;
}

impl<F> InputSource for F
where
    F: FnMut(u64) -> FrameInput + Send,
{
    fn next_input(&mut self, frame: u64) -> FrameInput {
        self(frame)
    }
}

/// A client, its inbound queue and its input source, driven by the fixed
/// loop.
pub struct ClientNode {
    /// The client
    pub client: GameClient,
    /// Messages from the server
    pub inbound: InboundQueue,
    /// Local input
    pub input: Box<dyn InputSource>,
    /// Stop after this many local frames (0 = run until shut down)
    pub frame_limit: u64,
}

impl Simulation for ClientNode {
    fn step(&mut self) -> StepControl {
        let input = self.input.next_input(self.client.local_frame() + 1);
        self.client.tick(&mut self.inbound, input);

        if self.frame_limit > 0 && self.client.local_frame() >= self.frame_limit {
            StepControl::Stop
        } else {
            StepControl::Continue
        }
    }

    fn frame(&self) -> u64 {
        self.client.local_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::server::GameServer;

    struct Harness {
        server: GameServer,
        server_in: InboundQueue,
        client: GameClient,
        client_in: InboundQueue,
    }

    fn harness(config: SimulationConfig) -> Harness {
        let server_in = InboundQueue::new(1024);
        let client_in = InboundQueue::new(1024);
        let mut server = GameServer::new(config.clone());
        let connection = server.connect(Box::new(client_in.handle()));
        let client = GameClient::new(connection, Box::new(server_in.handle()), config);
        Harness {
            server,
            server_in,
            client,
            client_in,
        }
    }

    impl Harness {
        fn run(&mut self, frames: usize, input: FrameInput) {
            for _ in 0..frames {
                self.client.tick(&mut self.client_in, input);
                self.server.tick(&mut self.server_in);
            }
        }
    }

    #[test]
    fn test_join_then_predict() {
        let mut h = harness(SimulationConfig::default());
        assert_eq!(h.client.tick(&mut h.client_in, FrameInput::new()), None);
        h.server.tick(&mut h.server_in);

        assert_eq!(h.client.tick(&mut h.client_in, FrameInput::new()), Some(1));
        let local = h.client.local_player().unwrap();
        assert!(h.client.world().contains(local.entity));
        assert_eq!(h.client.world().camera_for(local.entity), Some(local.camera));
        assert_eq!(h.client.history().latest_frame(), Some(1));
    }

    #[test]
    fn test_constant_input_predicts_correctly() {
        let mut h = harness(SimulationConfig::default());
        let run = FrameInput::with_flags(FrameInput::FLAG_FORWARD, Quat::IDENTITY);
        h.run(80, run);

        let stats = h.client.stats();
        assert!(stats.updates_received >= 7);
        assert!(stats.prediction_hits >= 1);
        assert_eq!(stats.mispredictions, 0);
        // Confirmed frames are pruned
        assert!(h.client.history().len() < 40);
    }

    #[test]
    fn test_remote_players_interpolated() {
        let config = SimulationConfig::default();
        let mut h = harness(config.clone());

        // Second client on the same server
        let mut other_in = InboundQueue::new(1024);
        let connection = h.server.connect(Box::new(other_in.handle()));
        let mut other = GameClient::new(connection, Box::new(h.server_in.handle()), config);

        for _ in 0..60 {
            h.client.tick(&mut h.client_in, FrameInput::new());
            other.tick(&mut other_in, FrameInput::new());
            h.server.tick(&mut h.server_in);
        }

        let remote = other.local_player().unwrap().entity;
        assert!(h.client.world().contains(remote));
        let server_pos = h.server.world().transform(remote).unwrap().position;
        let client_pos = h.client.world().transform(remote).unwrap().position;
        assert!((server_pos.x - client_pos.x).abs() < 1e-3);
        assert!((server_pos.z - client_pos.z).abs() < 1e-3);
    }

    #[test]
    fn test_unexpected_message_rejected() {
        let mut h = harness(SimulationConfig::default());
        let message = Message::new(0, 0, &CreatePlayer).unwrap();
        assert!(matches!(
            h.client.handle_message(message),
            Err(ProtocolError::Unexpected(MessageType::CreatePlayer))
        ));
    }
}
