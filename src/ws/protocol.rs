//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entity::InputState;
use crate::game::geometry::Rect;
use crate::game::physics::GameConfig;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join (or create) a room
    JoinGame {
        room_id: String,
        /// Room capacity, only used when this join creates the room
        #[serde(default)]
        max_players: Option<usize>,
        /// Sprite name picked on the character screen
        #[serde(default)]
        character: Option<String>,
    },

    /// Latest held keys, replaces the previous state
    InputUpdate { input: InputState },

    /// Jump to a level (or restart the current one)
    LoadLevel { level_id: usize },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the current room without closing the socket
    LeaveGame,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { session_id: Uuid, server_time: u64 },

    /// Confirmation of room join, sent only to the joining player
    JoinedGame {
        room_id: String,
        player_id: Uuid,
        player_index: usize,
        /// Room capacity, fixed when the room was created
        max_players: usize,
        game_state: GameSnapshot,
        config: GameConfig,
    },

    /// Join rejected, room at capacity
    RoomFull { message: String },

    /// Someone joined the room
    PlayerJoined {
        total_players: usize,
        max_players: usize,
    },

    /// Someone left the room
    PlayerLeft { total_players: usize },

    /// Per-tick authoritative state
    StateUpdate { tick: u64, game_state: GameSnapshot },

    /// A level was (re)loaded
    LevelLoaded {
        level_id: usize,
        game_state: GameSnapshot,
    },

    /// Everyone reached the finish line
    LevelComplete {
        completed_level: usize,
        next_level: usize,
    },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Public projection of a room's simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// In join order
    pub players: Vec<PlayerSnapshot>,
    pub platforms: Vec<Rect>,
    pub buttons: Vec<ButtonSnapshot>,
    pub gates: Vec<GateSnapshot>,
    pub moveable_blocks: Vec<BlockSnapshot>,
    pub finish_line: Option<Rect>,
    pub level_id: usize,
    pub is_paused: bool,
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub player_index: usize,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub width: f32,
    pub height: f32,
    pub is_grounded: bool,
    pub color: String,
    pub character: String,
    /// Players stacked on this one
    pub supporting: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonSnapshot {
    pub id: String,
    #[serde(flatten)]
    pub rect: Rect,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSnapshot {
    pub id: String,
    #[serde(flatten)]
    pub rect: Rect,
    pub is_open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: String,
    #[serde(flatten)]
    pub rect: Rect,
    pub weight: u32,
}
