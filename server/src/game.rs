//! Turn-effect engine: applies moves and powers to the board
//!
//! [`Game`] wraps the board with the mutation operations the dispatcher
//! calls. Every mutation records what changed into an [`Effects`] collector;
//! the dispatcher drains it into UPDATE broadcasts after each handler runs.
//! This keeps the board free of any reference back to the network layer.

use crate::board::{neighbour_coords, Board, Coords, HexDir, PawnId, TileFilter};
use log::debug;
use rand::Rng;
use shared::{flags, Colour, DestroyCause, PawnState, TileState, MAX_RANGE};
use std::collections::BTreeMap;

/// Accumulated state deltas for the broadcast after the current handler.
#[derive(Debug, Default)]
pub struct Effects {
    tiles: Vec<TileState>,
    pawns: Vec<PawnState>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty() && self.pawns.is_empty()
    }

    pub fn tile(&mut self, state: TileState) {
        self.tiles.push(state);
    }

    pub fn pawn(&mut self, state: PawnState) {
        self.pawns.push(state);
    }

    pub fn destroyed(&mut self, mut state: PawnState, cause: DestroyCause) {
        state.destroyed = true;
        state.cause = Some(cause);
        self.pawns.push(state);
    }

    /// Drains the collector for broadcasting.
    pub fn take(&mut self) -> (Vec<TileState>, Vec<PawnState>) {
        (
            std::mem::take(&mut self.tiles),
            std::mem::take(&mut self.pawns),
        )
    }
}

/// Request to start the multi-tick worm hazard, produced by the worm power
/// and picked up by the dispatcher after the power routine returns.
#[derive(Debug, Clone, Copy)]
pub struct WormSeed {
    pub start: Coords,
    pub colour: Colour,
    pub ticks: u8,
}

/// The authoritative game state plus its pending effect deltas.
#[derive(Debug, Default)]
pub struct Game {
    pub board: Board,
    pub effects: Effects,
    /// Set by the worm power; the dispatcher takes it and starts the timer.
    pub pending_worm: Option<WormSeed>,
}

impl Game {
    pub fn new(board: Board) -> Game {
        Game {
            board,
            effects: Effects::default(),
            pending_worm: None,
        }
    }

    /// Swaps in a different board (map change, game start). Pending effects
    /// are discarded with it.
    pub fn replace_board(&mut self, board: Board) {
        self.board = board;
        self.effects = Effects::default();
        self.pending_worm = None;
    }

    /// Number of pawns the colour still owns.
    pub fn pawn_count(&self, colour: Colour) -> usize {
        self.board.player_pawns(colour).len()
    }

    /// Movement capability test: the destination must be an open tile the
    /// pawn can reach. Reach is the six neighbours; a JUMP grant widens it
    /// to radial distance two and ignores elevation, as does CLIMB. Without
    /// either, the destination may be at most one level above the pawn.
    pub fn can_move(&self, id: PawnId, to: Coords) -> bool {
        let pawn = match self.board.pawn(id) {
            Some(p) => p,
            None => return false,
        };
        let from_tile = match self.board.tile(pawn.tile) {
            Some(t) => t,
            None => return false,
        };
        let dest = match self.board.tile(to) {
            Some(t) => t,
            None => return false,
        };
        if !dest.is_open() {
            return false;
        }

        let adjacent = HexDir::ALL
            .iter()
            .any(|dir| neighbour_coords(pawn.tile, *dir) == to);
        if pawn.has_flag(flags::JUMP) {
            // Jump reach: anywhere within two steps, elevation ignored.
            return adjacent || self.board.radial_tiles(pawn.tile, 1).contains(&to);
        }
        if !adjacent {
            return false;
        }
        pawn.has_flag(flags::CLIMB) || dest.height <= from_tile.height + 1
    }

    /// Relocates a pawn and resolves what it lands on: power pickups are
    /// collected, enemy mines detonate, black holes swallow. Returns false
    /// if the destination refuses the pawn. Assumes `can_move` (or the pull
    /// rule) already held.
    pub fn move_pawn(&mut self, id: PawnId, to: Coords) -> bool {
        let from = match self.board.pawn(id) {
            Some(p) => p.tile,
            None => return false,
        };
        // A hole tile never admits an occupant; a pawn sent there (pulled,
        // usually) is swallowed instead of relocated.
        let swallowed = self
            .board
            .tile(to)
            .map(|t| t.hole.is_some() && !t.smashed && t.pawn.is_none())
            .unwrap_or(false);
        if swallowed {
            self.destroy_pawn_moved(id, from, DestroyCause::BlackHole);
            return true;
        }
        if !self.board.relocate_pawn(id, to) {
            return false;
        }

        let mut tile_changed = false;
        let landed_pickup = match self.board.tile_mut(to) {
            Some(tile) => {
                let pickup = tile.pickup.take();
                if pickup.is_some() {
                    tile_changed = true;
                }
                pickup
            }
            None => None,
        };

        let pawn_colour = self.board.pawn(id).map(|p| p.colour);
        let landed_mine = {
            let mine_owner = self.board.tile(to).and_then(|t| t.mine);
            match (mine_owner, pawn_colour) {
                (Some(owner), Some(colour)) if owner != colour => {
                    if let Some(tile) = self.board.tile_mut(to) {
                        tile.mine = None;
                    }
                    tile_changed = true;
                    true
                }
                _ => false,
            }
        };

        if let Some(index) = landed_pickup {
            if let Some(pawn) = self.board.pawn_mut(id) {
                *pawn.powers.entry(index).or_insert(0) += 1;
                debug!("pawn at {:?} picked up power {}", to, index);
            }
        }

        if tile_changed {
            self.touch_tile(to);
        }

        let mut survived = true;
        if landed_mine {
            // Armour (preferred) or shield spends itself sweeping the mine.
            let protected = match self.board.pawn_mut(id) {
                Some(p) if p.has_flag(flags::ARMOUR) => {
                    p.flags &= !flags::ARMOUR;
                    true
                }
                Some(p) if p.has_flag(flags::SHIELD) => {
                    p.flags &= !flags::SHIELD;
                    true
                }
                _ => false,
            };
            if !protected {
                self.destroy_pawn_moved(id, from, DestroyCause::Mined);
                survived = false;
            }
        }

        if survived {
            if let Some(pawn) = self.board.pawn(id) {
                let mut state = pawn.to_state();
                state.moved_from = Some(from);
                self.effects.pawn(state);
            }
        }
        true
    }

    /// Removes a pawn and records the destruction with its cause.
    pub fn destroy_pawn(&mut self, id: PawnId, cause: DestroyCause) {
        if let Some(pawn) = self.board.remove_pawn(id) {
            self.effects.destroyed(pawn.to_state(), cause);
        }
    }

    fn destroy_pawn_moved(&mut self, id: PawnId, from: Coords, cause: DestroyCause) {
        if let Some(pawn) = self.board.remove_pawn(id) {
            let mut state = pawn.to_state();
            state.moved_from = Some(from);
            self.effects.destroyed(state, cause);
        }
    }

    /// Destroys every pawn of the colour (resignation, disconnect, unused
    /// scenario colours at game start).
    pub fn destroy_team(&mut self, colour: Colour, cause: DestroyCause) {
        for id in self.board.player_pawns(colour) {
            self.destroy_pawn(id, cause);
        }
    }

    /// Remaps pawn colours for game start: scenario colours onto the
    /// claimed colours, both taken in ascending order.
    pub fn recolour_pawns(&mut self, map: &BTreeMap<Colour, Colour>) {
        for id in self.board.pawn_ids() {
            if let Some(pawn) = self.board.pawn_mut(id) {
                if let Some(new) = map.get(&pawn.colour) {
                    pawn.colour = *new;
                }
            }
        }
    }

    /// Records the current state of a tile into the pending effects.
    pub fn touch_tile(&mut self, at: Coords) {
        if let Some(tile) = self.board.tile(at) {
            let state = tile.to_state();
            self.effects.tile(state);
        }
    }

    /// Records the current state of a pawn into the pending effects.
    pub fn touch_pawn(&mut self, id: PawnId) {
        if let Some(pawn) = self.board.pawn(id) {
            let state = pawn.to_state();
            self.effects.pawn(state);
        }
    }

    /// Grants one extra point of range, up to the cap.
    pub fn grant_range(&mut self, id: PawnId) -> bool {
        match self.board.pawn_mut(id) {
            Some(p) if p.range < MAX_RANGE => {
                p.range += 1;
                true
            }
            _ => false,
        }
    }

    /// Sets a status flag; fails when already present.
    pub fn grant_flag(&mut self, id: PawnId, flag: u8) -> bool {
        match self.board.pawn_mut(id) {
            Some(p) if !p.has_flag(flag) => {
                p.flags |= flag;
                true
            }
            _ => false,
        }
    }

    /// Teleports the pawn: uniformly random among the pawn's own landing
    /// pads when any are open, otherwise among all open, hazard-free tiles.
    pub fn teleport_pawn(&mut self, id: PawnId, rng: &mut impl Rng) -> bool {
        let colour = match self.board.pawn(id) {
            Some(p) => p.colour,
            None => return false,
        };
        let pads: Vec<Coords> = self
            .board
            .tiles()
            .filter(|t| t.pad == Some(colour) && t.is_open() && t.mine.is_none())
            .map(|t| t.coords())
            .collect();
        let target = if pads.is_empty() {
            self.board
                .random_tiles(rng, 1, true, TileFilter::teleport())
                .into_iter()
                .next()
        } else {
            Some(pads[rng.gen_range(0..pads.len())])
        };
        match target {
            Some(to) => self.move_pawn(id, to),
            None => false,
        }
    }
}
