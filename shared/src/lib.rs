//! Wire protocol shared between the hexarena server and its clients.
//!
//! Every message travels as a frame: a 4-byte big-endian length prefix
//! followed by a bincode-encoded [`Message`]. The server owns all game truth;
//! clients only render the payloads defined here and send back intents.

use serde::{Deserialize, Serialize};

/// Hard cap on the body of a single frame. A peer announcing a larger frame
/// is disconnected without reading the body.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Number of playable colours. Joiners beyond this become spectators.
pub const MAX_PLAYERS: usize = 6;

/// Upper bound on a pawn's bonus range.
pub const MAX_RANGE: u8 = 3;

/// Pawn status flags, stored as a bitset on the pawn.
pub mod flags {
    /// Moves may be redirected or the flag shed instead (random roll).
    pub const CONFUSED: u8 = 1 << 0;
    /// One move of extended reach, cleared after use.
    pub const JUMP: u8 = 1 << 1;
    /// Ignore elevation limits when moving.
    pub const CLIMB: u8 = 1 << 2;
    /// Survives one mine detonation.
    pub const ARMOUR: u8 = 1 << 3;
    /// Absorbs one destruction effect.
    pub const SHIELD: u8 = 1 << 4;
    /// Hidden from enemy clients under fog of war.
    pub const INVIS: u8 = 1 << 5;

    /// The beneficial flags, stripped by purification.
    pub const GOOD: u8 = JUMP | CLIMB | ARMOUR | SHIELD | INVIS;
}

/// Player colour slot. `Spectator` and `Unassigned` are sentinels: a session
/// is `Unassigned` between accept and a valid INIT, and `Spectator` when all
/// playable colours are taken.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Colour {
    Blue,
    Red,
    Green,
    Yellow,
    Purple,
    Orange,
    Spectator,
    Unassigned,
}

impl Colour {
    /// The playable colour with the given index, if in range.
    pub fn from_index(index: usize) -> Option<Colour> {
        match index {
            0 => Some(Colour::Blue),
            1 => Some(Colour::Red),
            2 => Some(Colour::Green),
            3 => Some(Colour::Yellow),
            4 => Some(Colour::Purple),
            5 => Some(Colour::Orange),
            _ => None,
        }
    }

    /// Index of a playable colour; sentinels have none.
    pub fn index(&self) -> Option<usize> {
        match self {
            Colour::Blue => Some(0),
            Colour::Red => Some(1),
            Colour::Green => Some(2),
            Colour::Yellow => Some(3),
            Colour::Purple => Some(4),
            Colour::Orange => Some(5),
            Colour::Spectator | Colour::Unassigned => None,
        }
    }

    /// True for the colours that own pawns and take turns.
    pub fn is_player(&self) -> bool {
        self.index().is_some()
    }
}

/// Why a pawn was removed from the board, reported alongside the removal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DestroyCause {
    /// Destroyed by another pawn's power.
    Action,
    /// Stepped on (or was pulled onto) an enemy mine.
    Mined,
    /// Consumed while creating a black hole.
    BlackHole,
    /// Crushed by the burrowing worm.
    Worm,
    /// Owner resigned or disconnected.
    Resigned,
}

/// One player as listed in GINFO/PJOIN/PQUIT payloads.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: u16,
    pub name: String,
    pub colour: Colour,
}

/// Snapshot of one tile, sent in BEGIN and incremental UPDATE messages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TileState {
    pub col: i32,
    pub row: i32,
    pub height: i32,
    pub smashed: bool,
    pub has_pickup: bool,
    pub mine: Option<Colour>,
    pub pad: Option<Colour>,
    pub hole: Option<u32>,
}

/// Snapshot of one pawn. A `destroyed` pawn is being reported for removal;
/// `cause` says why. When the update describes a relocation, `moved_from`
/// holds the coordinates the pawn left.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PawnState {
    pub col: i32,
    pub row: i32,
    pub moved_from: Option<(i32, i32)>,
    pub colour: Colour,
    pub flags: u8,
    pub range: u8,
    pub powers: Vec<(usize, u32)>,
    pub destroyed: bool,
    pub cause: Option<DestroyCause>,
}

/// Every message kind the server and clients exchange.
///
/// Client to server: `Init`, `Move`, `Use`, `Chat`, `Resign`, `Begin` (as an
/// admin start request, payload empty), `ChangeMap`, `ChangeSetting`,
/// `ChangeColour`, `Kick`. Server to client: everything else. Messages that
/// are illegal for the current phase are silently dropped by the server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Message {
    /// Join request carrying the display name. Must be the first message.
    Init { name: String },
    /// Full lobby snapshot sent to a session after its INIT is accepted.
    GameInfo {
        your_id: u16,
        players: Vec<PlayerInfo>,
        map_name: String,
        fog_of_war: bool,
    },
    /// Someone else joined the lobby.
    PlayerJoined { player: PlayerInfo },
    /// Someone left, with the reason the server recorded.
    PlayerQuit { player: PlayerInfo, reason: String },
    /// Game start: the full board. Sent to everyone before the first TURN.
    Begin {
        map_name: String,
        tiles: Vec<TileState>,
        pawns: Vec<PawnState>,
    },
    /// Whose turn it now is.
    Turn { player_id: u16 },
    /// Move intent: pawn at `from`, destination `to`.
    Move { from: (i32, i32), to: (i32, i32) },
    /// The previous MOVE or USE was rejected. No state changed.
    BadMove,
    /// The previous USE succeeded.
    Ok,
    /// Use the power with the given registry index from the pawn at `tile`.
    Use { tile: (i32, i32), power: usize },
    /// Incremental state delta: changed tiles and changed/destroyed pawns.
    Update {
        tiles: Vec<TileState>,
        pawns: Vec<PawnState>,
    },
    /// Chat line; the server stamps `player_id` before rebroadcasting.
    Chat { player_id: u16, text: String },
    /// The acting player forfeits all pawns.
    Resign,
    /// The game ended; back to the lobby.
    GameOver { draw: bool, winner: Option<u16> },
    /// Final notice before the server closes this connection.
    Quit { reason: String },
    /// Admin request to disconnect the given session.
    Kick { player_id: u16 },
    /// Colour change for the given session (self- or admin-initiated).
    ChangeColour { player_id: u16, colour: Colour },
    /// Admin request to load a different scenario.
    ChangeMap { name: String },
    /// Admin settings merge; unset fields are left unchanged.
    ChangeSetting { fog_of_war: Option<bool> },
}

/// Encodes a message as a length-prefixed frame ready to write to a socket.
pub fn encode_frame(message: &Message) -> bincode::Result<Vec<u8>> {
    let body = bincode::serialize(message)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame body (the bytes after the length prefix).
pub fn decode_body(body: &[u8]) -> bincode::Result<Message> {
    bincode::deserialize(body)
}
