//! Gravitational pull: black holes drag nearby pawns once per turn
//!
//! For every hole/pawn pair the pull chance is the hole's strength divided
//! by the squared planar distance, drawn as a percentage roll. A successful
//! draw moves the pawn one step along the bearing from the hole, which can
//! land it on the hole tile itself and destroy it.

use crate::board::{neighbour_coords, planar, Coords, HexDir, PawnId};
use crate::game::Game;
use rand::Rng;
use std::f32::consts::PI;

/// Runs one pull pass. Called at the start of every turn advance.
pub fn run(game: &mut Game, rng: &mut impl Rng) {
    let holes = game.board.holes();
    let pawns = game.board.pawn_ids();

    for hole_at in holes {
        let strength = match game.board.tile(hole_at).and_then(|t| t.hole) {
            Some(s) => s,
            None => continue,
        };
        let (bx, by) = planar(hole_at);
        for &id in &pawns {
            // A pawn destroyed earlier this pass no longer exists.
            let at = match game.board.pawn(id) {
                Some(p) => p.tile,
                None => continue,
            };
            let (px, py) = planar(at);
            let (dx, dy) = (bx - px, by - py);
            let dist2 = dx * dx + dy * dy;
            if dist2 == 0.0 {
                continue;
            }
            let chance = strength as f32 / dist2;
            if rng.gen_range(0..100) < (chance * 100.0) as i32 {
                pull_pawn(game, hole_at, id);
            }
        }
    }
}

fn pull_pawn(game: &mut Game, hole: Coords, id: PawnId) {
    let at = match game.board.pawn(id) {
        Some(p) => p.tile,
        None => return,
    };
    let target = match sector_target(hole, at) {
        Some(t) => t,
        None => return,
    };
    if !can_pull(game, id, target) {
        return;
    }
    game.move_pawn(id, target);
}

/// The pawn's neighbour one step toward the hole, picked by bucketing the
/// hole-to-pawn bearing into six 60-degree sectors. Bearings landing exactly
/// on a sector boundary pull nowhere.
fn sector_target(hole: Coords, at: Coords) -> Option<Coords> {
    let (bx, by) = planar(hole);
    let (px, py) = planar(at);
    let angle = (py - by).atan2(px - bx);

    let dir = if angle > -PI / 6.0 && angle <= PI / 6.0 {
        HexDir::Left // approaching from the right
    } else if angle > PI / 6.0 && angle <= PI / 2.0 {
        HexDir::NorthWest // from below right
    } else if angle > PI / 2.0 && angle <= 5.0 * PI / 6.0 {
        HexDir::NorthEast // from below left
    } else if angle < -PI / 6.0 && angle >= -PI / 2.0 {
        HexDir::SouthWest // from above right
    } else if angle < -PI / 2.0 && angle >= -5.0 * PI / 6.0 {
        HexDir::SouthEast // from above left
    } else if angle > 5.0 * PI / 6.0 || angle < -5.0 * PI / 6.0 {
        HexDir::Right // from the left
    } else {
        return None;
    };
    Some(neighbour_coords(at, dir))
}

/// Pawns can be pulled down off ledges but never up a cliff, and never
/// onto an occupied tile.
fn can_pull(game: &Game, id: PawnId, target: Coords) -> bool {
    let from_height = match game
        .board
        .pawn(id)
        .and_then(|p| game.board.tile(p.tile))
    {
        Some(t) => t.height,
        None => return false,
    };
    match game.board.tile(target) {
        Some(t) => t.pawn.is_none() && t.height <= from_height + 1,
        None => false,
    }
}
