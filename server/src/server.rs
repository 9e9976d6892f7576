//! Server state machine: session registry, lobby and game dispatch
//!
//! A single dispatcher task owns every piece of mutable state (sessions,
//! board, turn cursor, phase), so no handler ever takes a lock. Connection
//! reader tasks and the worm timer feed [`Event`]s into one channel; the
//! dispatcher drains it in `run`, mutates, and queues broadcasts on the
//! per-session writers.

use crate::board::{neighbour_coords, Coords, HexDir, TileFilter, MAX_HEIGHT};
use crate::connection::{self, Connection};
use crate::game::{Game, WormSeed};
use crate::powers::Registry;
use crate::{pull, scenario};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{flags, Colour, DestroyCause, Message, PlayerInfo, MAX_PLAYERS};
use std::collections::BTreeMap;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

/// The first-assigned session id runs the lobby.
pub const ADMIN_ID: u16 = 0;

/// Set to disable game-over detection for soak testing.
pub const NO_GAME_OVER_ENV: &str = "HEXARENA_NO_GAME_OVER";

/// Everything that can wake the dispatcher.
#[derive(Debug)]
pub enum Event {
    Received { id: u16, msg: Message },
    Disconnected { id: u16 },
    WormTick { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Lobby,
    Game,
}

/// One live connection and what the lobby knows about it.
struct Session {
    name: String,
    colour: Colour,
    conn: Connection,
    /// One-shot teardown guard: late read/write errors after a quit has
    /// started must not re-enter the quit path.
    quitting: bool,
}

impl Session {
    fn initialized(&self) -> bool {
        self.colour != Colour::Unassigned
    }
}

/// State of the crawling worm hazard between ticks.
struct WormState {
    tile: Coords,
    colour: Colour,
    remaining: u8,
    generation: u64,
}

pub struct Server {
    listener: TcpListener,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,

    sessions: BTreeMap<u16, Session>,
    next_id: u16,

    phase: Phase,
    game: Game,
    registry: Registry,
    map_name: String,
    scenario_dir: PathBuf,
    fog_of_war: bool,

    /// Session currently authorized to move.
    turn: Option<u16>,
    pspawn_turns: u32,
    pspawn_num: usize,

    worm: Option<WormState>,
    /// Bumped for every new worm; stale timer ticks carry an old value and
    /// are dropped.
    worm_generation: u64,

    rng: StdRng,
}

impl Server {
    /// Binds the listener and loads the initial scenario.
    pub async fn bind(
        addr: &str,
        map_name: &str,
        scenario_dir: PathBuf,
    ) -> Result<Server, Box<dyn Error>> {
        let board = scenario::load_board(&scenario_dir, map_name)?;
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            events_tx,
            events_rx,
            sessions: BTreeMap::new(),
            next_id: 0,
            phase: Phase::Lobby,
            game: Game::new(board),
            registry: Registry::standard(),
            map_name: map_name.to_string(),
            scenario_dir,
            fog_of_war: false,
            turn: None,
            pspawn_turns: 1,
            pspawn_num: 1,
            worm: None,
            worm_generation: 0,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The dispatcher loop. Runs until the process is stopped.
    pub async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr),
                        Err(err) => error!("accept failed: {}", err),
                    }
                }
                event = self.events_rx.recv() => {
                    // The dispatcher holds a sender, so recv never ends.
                    match event {
                        Some(Event::Received { id, msg }) => self.handle_message(id, msg),
                        Some(Event::Disconnected { id }) => self.handle_disconnect(id),
                        Some(Event::WormTick { generation }) => self.worm_tick(generation),
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if self.phase == Phase::Game {
            info!("refusing {} (game in progress)", addr);
            let conn = connection::spawn(stream, u16::MAX, self.events_tx.clone());
            conn.writer.send(&Message::Quit {
                reason: "game already in progress".to_string(),
            });
            conn.shutdown();
            return;
        }

        let id = self.alloc_id();
        info!("session {} connected from {}", id, addr);

        let conn = connection::spawn(stream, id, self.events_tx.clone());
        self.sessions.insert(
            id,
            Session {
                name: String::new(),
                colour: Colour::Unassigned,
                conn,
                quitting: false,
            },
        );
    }

    /// Next free session id. The counter wraps and skips ids still in use;
    /// `u16::MAX` is reserved for connections refused before they get a
    /// session.
    fn alloc_id(&mut self) -> u16 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if id != u16::MAX && !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }

    fn handle_disconnect(&mut self, id: u16) {
        if self.sessions.contains_key(&id) {
            self.quit_session(id, "connection lost");
        }
    }

    fn handle_message(&mut self, id: u16, msg: Message) {
        // Chat relays in every phase, stamped with the sender's id.
        if let Message::Chat { text, .. } = msg {
            self.broadcast(&Message::Chat {
                player_id: id,
                text,
            });
            return;
        }

        match self.phase {
            Phase::Lobby => self.lobby_message(id, msg),
            Phase::Game => self.game_message(id, msg),
        }
    }

    // ---- lobby phase ----

    fn lobby_message(&mut self, id: u16, msg: Message) {
        match msg {
            Message::Init { name } => self.init_session(id, name),
            Message::Begin { .. } if id == ADMIN_ID => self.start_game(),
            Message::ChangeMap { name } if id == ADMIN_ID => self.change_map(&name),
            Message::ChangeSetting { fog_of_war } if id == ADMIN_ID => {
                if let Some(fog) = fog_of_war {
                    self.fog_of_war = fog;
                }
                self.broadcast(&Message::ChangeSetting { fog_of_war });
            }
            Message::ChangeColour { player_id, colour } => {
                if id != ADMIN_ID && id != player_id {
                    return;
                }
                if colour == Colour::Unassigned {
                    return;
                }
                match self.sessions.get_mut(&player_id) {
                    Some(session) if session.initialized() => {
                        session.colour = colour;
                        self.broadcast(&Message::ChangeColour { player_id, colour });
                    }
                    _ => warn!("colour change for unknown session {}", player_id),
                }
            }
            Message::Kick { player_id } if id == ADMIN_ID && player_id != ADMIN_ID => {
                if self.sessions.contains_key(&player_id) {
                    info!("kicking session {}", player_id);
                    self.quit_session(player_id, "kicked");
                } else {
                    warn!("kick for unknown session {}", player_id);
                }
            }
            other => debug!("session {}: ignoring {:?} in lobby", id, other),
        }
    }

    fn init_session(&mut self, id: u16, name: String) {
        if name.is_empty() {
            self.quit_session(id, "no player name supplied");
            return;
        }
        match self.sessions.get(&id) {
            Some(session) if !session.initialized() => {}
            _ => return,
        }

        let colour = self.free_colour();
        if let Some(session) = self.sessions.get_mut(&id) {
            session.name = name.clone();
            session.colour = colour;
        }
        info!("session {} is {:?} ({:?})", id, name, colour);

        self.send_to(id, &self.game_info(id));
        self.broadcast_except(
            id,
            &Message::PlayerJoined {
                player: PlayerInfo { id, name, colour },
            },
        );
    }

    /// Lowest playable colour nobody holds, else spectator.
    fn free_colour(&self) -> Colour {
        for index in 0..MAX_PLAYERS {
            let candidate = Colour::from_index(index).unwrap_or(Colour::Spectator);
            if !self.sessions.values().any(|s| s.colour == candidate) {
                return candidate;
            }
        }
        Colour::Spectator
    }

    fn game_info(&self, your_id: u16) -> Message {
        Message::GameInfo {
            your_id,
            players: self.roster(),
            map_name: self.map_name.clone(),
            fog_of_war: self.fog_of_war,
        }
    }

    fn roster(&self) -> Vec<PlayerInfo> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.initialized())
            .map(|(id, s)| PlayerInfo {
                id: *id,
                name: s.name.clone(),
                colour: s.colour,
            })
            .collect()
    }

    fn change_map(&mut self, name: &str) {
        match scenario::load_board(&self.scenario_dir, name) {
            Ok(board) => {
                self.map_name = name.to_string();
                self.game.replace_board(board);
                let ids: Vec<u16> = self.sessions.keys().copied().collect();
                for id in ids {
                    self.send_to(id, &self.game_info(id));
                }
            }
            Err(err) => {
                // Recoverable: the lobby keeps the previous board.
                warn!("failed to load map {:?}: {}", name, err);
            }
        }
    }

    fn start_game(&mut self) {
        // Always start from a pristine copy; the previous game consumed
        // the in-memory board.
        let board = match scenario::load_board(&self.scenario_dir, &self.map_name) {
            Ok(board) => board,
            Err(err) => {
                error!("cannot start, map {:?} failed: {}", self.map_name, err);
                return;
            }
        };

        let claimed: Vec<Colour> = {
            let mut set: Vec<Colour> = self
                .sessions
                .values()
                .filter(|s| s.colour.is_player())
                .map(|s| s.colour)
                .collect();
            set.sort();
            set.dedup();
            set
        };
        if claimed.is_empty() {
            warn!("cannot start without players");
            return;
        }

        self.game.replace_board(board);
        let slots = self.game.board.colours();
        if slots.len() < claimed.len() {
            warn!(
                "too many teams for {:?}: a {} team map",
                self.map_name,
                slots.len()
            );
            return;
        }

        // Map the scenario's colour slots onto the claimed colours, both in
        // ascending order; pawns of unclaimed slots leave the board.
        let colour_map: BTreeMap<Colour, Colour> = slots
            .iter()
            .copied()
            .zip(claimed.iter().copied())
            .collect();
        for slot in &slots {
            if !colour_map.contains_key(slot) {
                self.game.destroy_team(*slot, DestroyCause::Resigned);
            }
        }
        self.game.recolour_pawns(&colour_map);
        let _ = self.game.effects.take(); // BEGIN carries the full snapshot

        self.worm = None;
        self.pspawn_turns = 1;
        self.pspawn_num = 1;

        let tiles = self.game.board.tiles().map(|t| t.to_state()).collect();
        let pawns = self
            .game
            .board
            .pawn_ids()
            .iter()
            .filter_map(|id| self.game.board.pawn(*id))
            .map(|p| p.to_state())
            .collect();
        self.broadcast(&Message::Begin {
            map_name: self.map_name.clone(),
            tiles,
            pawns,
        });

        info!("game started on {:?} with {} teams", self.map_name, claimed.len());
        self.phase = Phase::Game;

        // Random starting cursor; next_turn advances to the first eligible
        // session after it.
        let ids: Vec<u16> = self.sessions.keys().copied().collect();
        self.turn = ids.get(self.rng.gen_range(0..ids.len())).copied();
        self.next_turn();
    }

    // ---- game phase ----

    fn game_message(&mut self, id: u16, msg: Message) {
        // The worm owns the board while it crawls; intents are received
        // and dropped.
        if self.worm.is_some() {
            return;
        }
        match msg {
            Message::Move { from, to } => self.handle_move(id, from, to),
            Message::Use { tile, power } => self.handle_use(id, tile, power),
            Message::Resign => {
                if self.turn != Some(id) {
                    return;
                }
                let colour = match self.sessions.get(&id) {
                    Some(s) => s.colour,
                    None => return,
                };
                info!("session {} resigns", id);
                self.game.destroy_team(colour, DestroyCause::Resigned);
                self.flush_effects();
                if !self.check_game_over() {
                    self.next_turn();
                }
            }
            other => debug!("session {}: ignoring {:?} in game", id, other),
        }
    }

    fn handle_move(&mut self, id: u16, from: Coords, to: Coords) {
        let colour = match self.sessions.get(&id) {
            Some(s) => s.colour,
            None => return,
        };
        // Addressing errors are dropped silently; only capability failures
        // earn a BADMOVE.
        let (pawn, owner) = match self.game.board.pawn_at(from) {
            Some(p) => (p.id, p.colour),
            None => return,
        };
        if self.game.board.tile(to).is_none() || owner != colour || self.turn != Some(id) {
            return;
        }

        let mut dest = to;
        let confused = self
            .game
            .board
            .pawn(pawn)
            .map(|p| p.has_flag(flags::CONFUSED) && !p.has_flag(flags::JUMP))
            .unwrap_or(false);
        if confused {
            match self.rng.gen_range(0..6) {
                0..=2 => {
                    // Stagger: redirect to a random legal neighbour of the
                    // requested destination.
                    let choices: Vec<Coords> = HexDir::ALL
                        .iter()
                        .map(|d| neighbour_coords(to, *d))
                        .filter(|c| self.game.can_move(pawn, *c))
                        .collect();
                    if !choices.is_empty() {
                        dest = choices[self.rng.gen_range(0..choices.len())];
                    }
                }
                3 => {
                    // The confusion wears off instead.
                    if let Some(p) = self.game.board.pawn_mut(pawn) {
                        p.flags &= !flags::CONFUSED;
                    }
                    self.game.touch_pawn(pawn);
                }
                _ => {}
            }
        }

        if self.game.can_move(pawn, dest) {
            self.game.move_pawn(pawn, dest);
            // A jump grant is spent by the move.
            let jumped = self
                .game
                .board
                .pawn(pawn)
                .map(|p| p.has_flag(flags::JUMP))
                .unwrap_or(false);
            if jumped {
                if let Some(p) = self.game.board.pawn_mut(pawn) {
                    p.flags &= !flags::JUMP;
                }
                self.game.touch_pawn(pawn);
            }
            self.flush_effects();
            if !self.check_game_over() {
                self.next_turn();
            }
        } else {
            self.flush_effects(); // a shed confusion flag still broadcasts
            self.send_to(id, &Message::BadMove);
        }
    }

    fn handle_use(&mut self, id: u16, tile: Coords, power: usize) {
        let pawn = match self.game.board.pawn_at(tile) {
            Some(p) => p.id,
            None => {
                self.send_to(id, &Message::BadMove);
                return;
            }
        };

        let held = self
            .game
            .board
            .pawn(pawn)
            .and_then(|p| p.powers.get(&power).copied())
            .unwrap_or(0);
        if held == 0 || !self.registry.test(power, pawn, &self.game) {
            self.send_to(id, &Message::BadMove);
            return;
        }

        if let Some(p) = self.game.board.pawn_mut(pawn) {
            if held == 1 {
                p.powers.remove(&power);
            } else {
                p.powers.insert(power, held - 1);
            }
        }

        if !self.registry.apply(power, pawn, &mut self.game, &mut self.rng) {
            // The effect routine refused after all; refund the charge.
            if let Some(p) = self.game.board.pawn_mut(pawn) {
                *p.powers.entry(power).or_insert(0) += 1;
            }
            self.send_to(id, &Message::BadMove);
            return;
        }

        if let Some(seed) = self.game.pending_worm.take() {
            self.start_worm(seed);
        }
        if self.game.board.pawn(pawn).is_some() {
            self.game.touch_pawn(pawn);
        }
        self.flush_effects();
        self.send_to(id, &Message::Ok);

        if !self.check_game_over() {
            // A player who wiped out their own last pawn loses the rest of
            // their turn.
            let turn_done = self
                .turn
                .and_then(|t| self.sessions.get(&t))
                .map(|s| self.game.pawn_count(s.colour) == 0)
                .unwrap_or(false);
            if turn_done {
                self.next_turn();
            }
        }
    }

    // ---- turn scheduling ----

    fn next_turn(&mut self) {
        pull::run(&mut self.game, &mut self.rng);
        self.flush_effects();
        if self.check_game_over() {
            return;
        }

        let ids: Vec<u16> = self.sessions.keys().copied().collect();
        if ids.is_empty() {
            return;
        }
        let start = match self.turn.and_then(|t| ids.iter().position(|&i| i == t)) {
            Some(pos) => pos + 1,
            None => 0,
        };
        let next = (0..ids.len())
            .map(|offset| ids[(start + offset) % ids.len()])
            .find(|id| self.eligible(*id));
        let next = match next {
            Some(id) => id,
            None => return,
        };
        self.turn = Some(next);

        // The eligible set may have changed while the cursor advanced;
        // guard again rather than assume the first check still holds.
        if self.check_game_over() {
            return;
        }

        self.pspawn_turns = self.pspawn_turns.saturating_sub(1);
        if self.pspawn_turns == 0 {
            self.spawn_powers();
        }

        self.broadcast(&Message::Turn { player_id: next });
    }

    fn eligible(&self, id: u16) -> bool {
        self.sessions
            .get(&id)
            .map(|s| s.colour.is_player() && self.game.pawn_count(s.colour) > 0)
            .unwrap_or(false)
    }

    /// True when the game just ended (or no game is running).
    fn check_game_over(&mut self) -> bool {
        if self.phase == Phase::Lobby {
            return true;
        }
        if std::env::var_os(NO_GAME_OVER_ENV).is_some() {
            return false;
        }

        let mut alive = 0;
        let mut winner = None;
        for (id, session) in &self.sessions {
            if session.colour.is_player() && self.game.pawn_count(session.colour) > 0 {
                alive += 1;
                winner = Some(*id);
            }
        }
        if alive > 1 {
            return false;
        }

        info!(
            "game over: {}",
            match winner {
                Some(id) => format!("session {} wins", id),
                None => "draw".to_string(),
            }
        );
        self.worm = None;
        self.phase = Phase::Lobby;
        self.turn = None;
        self.broadcast(&Message::GameOver {
            draw: alive == 0,
            winner,
        });
        true
    }

    fn spawn_powers(&mut self) {
        let tiles =
            self.game
                .board
                .random_tiles(&mut self.rng, self.pspawn_num, true, TileFilter::power_spawn());
        for at in tiles {
            let power = self.registry.random_power(&mut self.rng);
            if let Some(tile) = self.game.board.tile_mut(at) {
                tile.pickup = Some(power);
            }
            self.game.touch_tile(at);
        }
        self.pspawn_turns = self.rng.gen_range(1..=6);
        self.pspawn_num = self.rng.gen_range(1..=4);
        self.flush_effects();
    }

    // ---- worm hazard ----

    fn start_worm(&mut self, seed: WormSeed) {
        self.worm_generation += 1;
        info!(
            "worm wakes at {:?} for {} ticks",
            seed.start, seed.ticks
        );
        self.worm = Some(WormState {
            tile: seed.start,
            colour: seed.colour,
            remaining: seed.ticks,
            generation: self.worm_generation,
        });
        self.schedule_worm_tick(self.worm_generation);
    }

    fn schedule_worm_tick(&self, generation: u64) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            let _ = events.send(Event::WormTick { generation });
        });
    }

    fn worm_tick(&mut self, generation: u64) {
        let mut state = match self.worm.take() {
            Some(state) if state.generation == generation => state,
            other => {
                // A stale tick from a cancelled worm; put a newer one back.
                self.worm = other;
                return;
            }
        };
        if state.remaining == 0 {
            return;
        }
        state.remaining -= 1;

        if let Some(tile) = self.game.board.tile_mut(state.tile) {
            if tile.height < MAX_HEIGHT {
                let height = tile.height;
                tile.set_height(height + 1);
            }
        }
        let victim = self
            .game
            .board
            .pawn_at(state.tile)
            .filter(|p| p.colour != state.colour)
            .map(|p| p.id);
        if let Some(victim) = victim {
            self.game.destroy_pawn(victim, DestroyCause::Worm);
        }
        self.game.touch_tile(state.tile);
        self.flush_effects();
        if self.check_game_over() {
            return;
        }

        // Crawl onward through a random neighbour it can still burrow under.
        let choices: Vec<Coords> = HexDir::ALL
            .iter()
            .map(|d| neighbour_coords(state.tile, *d))
            .filter(|c| {
                self.game
                    .board
                    .tile(*c)
                    .map(|t| t.height < MAX_HEIGHT)
                    .unwrap_or(false)
            })
            .collect();
        if choices.is_empty() {
            info!("worm hits a dead end at {:?}", state.tile);
            return;
        }
        state.tile = choices[self.rng.gen_range(0..choices.len())];
        let generation = state.generation;
        self.worm = Some(state);
        self.schedule_worm_tick(generation);
    }

    // ---- teardown ----

    fn quit_session(&mut self, id: u16, reason: &str) {
        let (name, colour) = match self.sessions.get_mut(&id) {
            Some(session) if !session.quitting => {
                session.quitting = true;
                (session.name.clone(), session.colour)
            }
            _ => return,
        };
        info!("session {} leaving: {}", id, reason);

        if colour != Colour::Unassigned {
            self.broadcast_except(
                id,
                &Message::PlayerQuit {
                    player: PlayerInfo {
                        id,
                        name,
                        colour,
                    },
                    reason: reason.to_string(),
                },
            );
        }
        if self.phase == Phase::Game && colour.is_player() {
            self.game.destroy_team(colour, DestroyCause::Resigned);
            self.flush_effects();
        }
        if self.turn == Some(id) {
            self.next_turn();
        }

        if let Some(session) = self.sessions.remove(&id) {
            session.conn.writer.send(&Message::Quit {
                reason: reason.to_string(),
            });
            session.conn.shutdown();
        }
        self.check_game_over();
    }

    // ---- broadcast plumbing ----

    fn flush_effects(&mut self) {
        if self.game.effects.is_empty() {
            return;
        }
        let (tiles, pawns) = self.game.effects.take();
        self.broadcast(&Message::Update { tiles, pawns });
    }

    fn broadcast(&self, msg: &Message) {
        for session in self.sessions.values() {
            if session.initialized() {
                session.conn.writer.send(msg);
            }
        }
    }

    fn broadcast_except(&self, exempt: u16, msg: &Message) {
        for (id, session) in &self.sessions {
            if *id != exempt && session.initialized() {
                session.conn.writer.send(msg);
            }
        }
    }

    fn send_to(&self, id: u16, msg: &Message) {
        if let Some(session) = self.sessions.get(&id) {
            session.conn.writer.send(msg);
        }
    }
}
