//! Network Layer
//!
//! Message envelope, dispatch, and the server and client sessions.
//! This layer is **non-deterministic** (wall clock, channel timing); all
//! simulation runs through `game/` and `netcode/`.

pub mod client;
pub mod dispatch;
pub mod driver;
pub mod protocol;
pub mod server;

pub use client::{ClientNode, ClientStats, GameClient, InputSource, LocalPlayer};
pub use dispatch::{
    dispatch_inbound, send_logged, ChannelSender, InboundHandle, InboundQueue, MessageHandler, MessageSender,
    NetworkError,
};
pub use driver::{run_fixed_loop, LoopExit, Simulation, StepControl};
pub use protocol::{
    AckCreatePlayer, AckPing, CreatePlayer, GameStateUpdate, InputMessage, Message, MessageBody, MessageType, Ping,
    ProtocolError, SERVER_SENDER_ID,
};
pub use server::{GameServer, PlayerSlot, ServerNode, ServerTick};
