//! # Hex Arena Server Library
//!
//! The authoritative server for a turn-based board game played on a hex
//! grid over persistent TCP connections. The server owns all game truth:
//! board layout, pawn positions, per-tile modifiers, turn order, and the
//! outcome of every player action. Clients render state and submit
//! intents; the server validates, mutates, and broadcasts deltas.
//!
//! ## Architecture
//!
//! A single dispatcher task owns every piece of mutable state. Each
//! accepted socket gets a reader task (one outstanding read of a
//! length-prefixed frame) and a writer task (strict FIFO queue); both feed
//! or drain channels, so no handler ever blocks on a peer and no lock is
//! taken anywhere in the game logic. Timer-driven sequences such as the
//! worm hazard re-enter the dispatcher through the same event channel,
//! carrying a generation stamp so cancelled timers cannot fire into a
//! torn-down game.
//!
//! ## Module Organization
//!
//! - [`board`]: tiles, pawns, hex geometry and area queries. Pure data,
//!   no I/O.
//! - [`game`]: the turn-effect engine: moves, destruction, teleports,
//!   with every mutation recorded for incremental broadcast.
//! - [`powers`]: the immutable registry of pawn powers with weighted
//!   random selection.
//! - [`pull`]: the per-turn black-hole gravity simulation.
//! - [`scenario`]: plain-text map loading.
//! - [`connection`]: per-socket reader/writer tasks.
//! - [`server`]: session registry, lobby/game state machine, turn
//!   scheduling, and the dispatcher loop.

pub mod board;
pub mod connection;
pub mod game;
pub mod powers;
pub mod pull;
pub mod scenario;
pub mod server;
