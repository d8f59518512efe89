//! Messages exchanged between the server and its clients.
//!
//! Every frame carries an [`Envelope`] holding the protocol version and one
//! [`Message`]. The enum variant index is the wire discriminant, so adding
//! variants must only ever append.

use serde::{Deserialize, Serialize};

use crate::common::Cell;
use crate::config::GameOptions;
use crate::game::{GameSnapshot, PlayerId};
use crate::moves::{Move, MoveRecord};
use crate::ship::Ship;

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Typed error catalog reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    ServerClosed,
    InvalidGameSize,
    InvalidSessionCode,
    InvalidPlacement,
    InvalidSecret,
    NoGameInProgress,
    InvalidPlayer,
    AlreadyInQueue,
    AlreadyInGame,
    NotInQueue,
    GameAlreadyStarted,
    InvalidMove,
    NotYourTurn,
    InvalidGameOptions,
}

/// Versioned wrapper written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u16,
    pub message: Message,
}

impl Envelope {
    pub fn new(message: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message,
        }
    }
}

/// Every message kind, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // server → client
    /// Sent once right after connecting.
    Register {
        username: String,
        id: PlayerId,
        queue_length: u32,
    },
    /// Broadcast to everyone whenever the queue changes.
    QueueUpdate { queue_size: u32, in_queue: bool },
    /// The creator's new lobby, including its join code.
    GameCreated { game_state: GameSnapshot },
    /// Both players are seated and the build phase began.
    GameStarting { game_state: GameSnapshot },
    GameStateUpdate { game_state: GameSnapshot },
    MoveMade {
        game_state: GameSnapshot,
        player: PlayerId,
        record: MoveRecord,
    },
    ErrorMessage { error_type: ErrorType },

    // client → server
    JoinQueue,
    LeaveQueue,
    CreateGame { options: GameOptions },
    JoinGameWithCode { code: String },
    PlayerUpdateShipPlacement { ships: Vec<Ship> },
    PlayerMove { mv: Move },
    /// Relayed verbatim to the opponent during the battle.
    PlayerHover {
        user_id: PlayerId,
        x: u8,
        y: u8,
        affected_fields: Vec<Cell>,
    },
    LeaveGame,
    RequestGameState,
}

impl Message {
    /// Whether a client may send this message to the server.
    pub fn is_client_message(&self) -> bool {
        matches!(
            self,
            Message::JoinQueue
                | Message::LeaveQueue
                | Message::CreateGame { .. }
                | Message::JoinGameWithCode { .. }
                | Message::PlayerUpdateShipPlacement { .. }
                | Message::PlayerMove { .. }
                | Message::PlayerHover { .. }
                | Message::LeaveGame
                | Message::RequestGameState
        )
    }

    pub fn error(error_type: ErrorType) -> Self {
        Message::ErrorMessage { error_type }
    }
}
