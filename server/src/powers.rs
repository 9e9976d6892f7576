//! Power registry: the data-driven table of board effects
//!
//! Each power is a `{use, test}` pair of plain function values plus a spawn
//! weight and a directionality binding. Directional powers are registered
//! four times (radial neighbourhood, full row, and the two diagonal lines
//! through the pawn), with radial variants weighted below linear ones since
//! radial coverage grows faster with range. The registry is built once at
//! startup and never changes; a power instance on a tile or pawn is just an
//! index into it.

use crate::board::{Coords, PawnId};
use crate::game::{Game, WormSeed};
use rand::{Rng, RngCore};
use shared::{flags, MAX_RANGE};

/// Which set of tiles a power's area covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directionality {
    Radial,
    Row,
    /// NE/SW diagonal line through the pawn.
    RisingLine,
    /// NW/SE diagonal line through the pawn.
    FallingLine,
    Undirected,
}

impl Directionality {
    const DIRECTIONAL: [Directionality; 4] = [
        Directionality::Radial,
        Directionality::Row,
        Directionality::RisingLine,
        Directionality::FallingLine,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Directionality::Radial => "Radial",
            Directionality::Row => "Row",
            Directionality::RisingLine => "Rising Line",
            Directionality::FallingLine => "Falling Line",
            Directionality::Undirected => "",
        }
    }
}

/// Acting pawn plus the direction the registry entry was bound with.
pub struct PowerCtx {
    pub pawn: PawnId,
    pub direction: Directionality,
}

type UseFn = fn(&PowerCtx, &mut Game, &mut dyn RngCore) -> bool;
type TestFn = fn(&PowerCtx, &Game) -> bool;

/// One immutable registry entry.
pub struct PowerDef {
    pub name: String,
    pub direction: Directionality,
    pub spawn_weight: u32,
    use_fn: UseFn,
    test_fn: TestFn,
}

/// The fixed ordered sequence of powers.
pub struct Registry {
    defs: Vec<PowerDef>,
}

impl Registry {
    /// Builds the standard power set.
    pub fn standard() -> Registry {
        let mut reg = Registry { defs: Vec::new() };

        // Directional powers: (radial weight, linear weight).
        reg.push_directional("Destroy", 60, 100, destroy_use, destroy_test);
        reg.push_directional("Shatter", 25, 40, shatter_use, shatter_test);
        reg.push_directional("Purify", 60, 100, purify_use, purify_test);
        reg.push_directional("Minefield", 35, 60, mine_use, mine_test);
        reg.push_directional("Confuse", 35, 60, confuse_use, confuse_test);
        reg.push_directional("Wall", 35, 60, wall_use, wall_test);

        reg.push("Raise Tile", 100, raise_use, raise_test);
        reg.push("Lower Tile", 100, lower_use, lower_test);
        reg.push("Extra Range", 20, range_use, range_test);
        reg.push("Climb", 60, climb_use, climb_test);
        reg.push("Jump", 60, jump_use, jump_test);
        reg.push("Armour", 60, armour_use, armour_test);
        reg.push("Shield", 60, shield_use, shield_test);
        reg.push("Invisibility", 40, invis_use, invis_test);
        reg.push("Landing Pad", 60, pad_use, pad_test);
        reg.push("Teleport", 60, teleport_use, teleport_test);
        reg.push("Black Hole", 15, black_hole_use, black_hole_test);
        reg.push("Worm", 15, worm_use, worm_test);

        debug_assert!(reg.total_weight() > 0);
        reg
    }

    fn push(&mut self, name: &str, weight: u32, use_fn: UseFn, test_fn: TestFn) {
        self.defs.push(PowerDef {
            name: name.to_string(),
            direction: Directionality::Undirected,
            spawn_weight: weight,
            use_fn,
            test_fn,
        });
    }

    fn push_directional(
        &mut self,
        name: &str,
        radial_weight: u32,
        linear_weight: u32,
        use_fn: UseFn,
        test_fn: TestFn,
    ) {
        for direction in Directionality::DIRECTIONAL {
            let weight = if direction == Directionality::Radial {
                radial_weight
            } else {
                linear_weight
            };
            self.defs.push(PowerDef {
                name: format!("{} {}", name, direction.suffix()),
                direction,
                spawn_weight: weight,
                use_fn,
                test_fn,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PowerDef> {
        self.defs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PowerDef> {
        self.defs.iter()
    }

    /// Index of the first entry with the given name, for tests and tools.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.defs.iter().position(|d| d.name == name)
    }

    pub fn total_weight(&self) -> u32 {
        self.defs.iter().map(|d| d.spawn_weight).sum()
    }

    /// Weighted random entry: draw in [0, total), walk the table
    /// subtracting weights until the draw goes negative.
    pub fn random_power(&self, rng: &mut impl Rng) -> usize {
        let mut n = rng.gen_range(0..self.total_weight());
        for (index, def) in self.defs.iter().enumerate() {
            if n < def.spawn_weight {
                return index;
            }
            n -= def.spawn_weight;
        }
        // Total weight is positive, so the walk always terminates above.
        unreachable!("weighted draw exhausted the registry")
    }

    /// Applicability test for the pawn using entry `index`.
    pub fn test(&self, index: usize, pawn: PawnId, game: &Game) -> bool {
        match self.defs.get(index) {
            Some(def) => {
                let ctx = PowerCtx {
                    pawn,
                    direction: def.direction,
                };
                (def.test_fn)(&ctx, game)
            }
            None => false,
        }
    }

    /// Runs the effect routine for entry `index`.
    pub fn apply(&self, index: usize, pawn: PawnId, game: &mut Game, rng: &mut dyn RngCore) -> bool {
        match self.defs.get(index) {
            Some(def) => {
                let ctx = PowerCtx {
                    pawn,
                    direction: def.direction,
                };
                (def.use_fn)(&ctx, game, rng)
            }
            None => false,
        }
    }
}

/// Tiles covered by the power's direction binding, widened by pawn range.
fn area_tiles(ctx: &PowerCtx, game: &Game) -> Vec<Coords> {
    let pawn = match game.board.pawn(ctx.pawn) {
        Some(p) => p,
        None => return Vec::new(),
    };
    let (at, range) = (pawn.tile, pawn.range);
    match ctx.direction {
        Directionality::Radial => game.board.radial_tiles(at, range),
        Directionality::Row => game.board.row_tiles(at, range),
        Directionality::RisingLine => game.board.fs_tiles(at, range),
        Directionality::FallingLine => game.board.bs_tiles(at, range),
        Directionality::Undirected => vec![at],
    }
}

fn caster_colour(ctx: &PowerCtx, game: &Game) -> Option<shared::Colour> {
    game.board.pawn(ctx.pawn).map(|p| p.colour)
}

fn destroy_test(ctx: &PowerCtx, game: &Game) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    area_tiles(ctx, game)
        .iter()
        .any(|at| game.board.pawn_at(*at).map(|p| p.colour != colour) == Some(true))
}

fn destroy_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    let mut hit = false;
    for at in area_tiles(ctx, game) {
        let target = game
            .board
            .pawn_at(at)
            .map(|p| (p.id, p.colour, p.has_flag(flags::SHIELD)));
        if let Some((id, target_colour, shielded)) = target {
            if target_colour == colour {
                continue;
            }
            if shielded {
                // The shield absorbs the hit and is spent.
                if let Some(p) = game.board.pawn_mut(id) {
                    p.flags &= !flags::SHIELD;
                }
                game.touch_pawn(id);
            } else {
                game.destroy_pawn(id, shared::DestroyCause::Action);
            }
            hit = true;
        }
    }
    hit
}

fn shatter_test(ctx: &PowerCtx, game: &Game) -> bool {
    area_tiles(ctx, game).iter().any(|at| {
        game.board
            .tile(*at)
            .map(|t| !t.smashed || t.pawn.is_some())
            .unwrap_or(false)
    })
}

fn shatter_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let mut hit = false;
    // Shatter spares nobody: pawns of every colour (the caster included,
    // when the area covers its own tile) die before the tiles are smashed.
    for at in area_tiles(ctx, game) {
        if let Some(id) = game.board.tile(at).and_then(|t| t.pawn) {
            game.destroy_pawn(id, shared::DestroyCause::Action);
            hit = true;
        }
        if let Some(tile) = game.board.tile_mut(at) {
            if !tile.smashed {
                tile.smash();
                hit = true;
            }
        }
        game.touch_tile(at);
    }
    hit
}

fn purify_test(ctx: &PowerCtx, game: &Game) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    area_tiles(ctx, game).iter().any(|at| {
        let pawn_dirty = game
            .board
            .pawn_at(*at)
            .map(|p| p.colour != colour && (p.flags & flags::GOOD != 0 || p.range > 0))
            == Some(true);
        let tile_dirty = game
            .board
            .tile(*at)
            .map(|t| {
                t.mine.map(|c| c != colour) == Some(true)
                    || t.pad.map(|c| c != colour) == Some(true)
            })
            .unwrap_or(false);
        pawn_dirty || tile_dirty
    })
}

fn purify_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    let mut hit = false;
    for at in area_tiles(ctx, game) {
        let target = game
            .board
            .pawn_at(at)
            .filter(|p| p.colour != colour && (p.flags & flags::GOOD != 0 || p.range > 0))
            .map(|p| p.id);
        if let Some(id) = target {
            if let Some(p) = game.board.pawn_mut(id) {
                p.flags &= !flags::GOOD;
                p.range = 0;
            }
            game.touch_pawn(id);
            hit = true;
        }

        let mut tile_hit = false;
        if let Some(tile) = game.board.tile_mut(at) {
            if tile.mine.map(|c| c != colour) == Some(true) {
                tile.mine = None;
                tile_hit = true;
            }
            if tile.pad.map(|c| c != colour) == Some(true) {
                tile.pad = None;
                tile_hit = true;
            }
        }
        if tile_hit {
            game.touch_tile(at);
            hit = true;
        }
    }
    hit
}

fn mineable(tile: &crate::board::Tile) -> bool {
    !tile.smashed && tile.hole.is_none() && tile.mine.is_none()
}

fn mine_test(ctx: &PowerCtx, game: &Game) -> bool {
    area_tiles(ctx, game)
        .iter()
        .any(|at| game.board.tile(*at).map(mineable).unwrap_or(false))
}

fn mine_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    let mut hit = false;
    for at in area_tiles(ctx, game) {
        let placed = match game.board.tile_mut(at) {
            Some(tile) if mineable(tile) => {
                tile.mine = Some(colour);
                true
            }
            _ => false,
        };
        if placed {
            game.touch_tile(at);
            hit = true;
        }
    }
    hit
}

fn confuse_test(ctx: &PowerCtx, game: &Game) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    area_tiles(ctx, game).iter().any(|at| {
        game.board
            .pawn_at(*at)
            .map(|p| p.colour != colour && !p.has_flag(flags::CONFUSED))
            == Some(true)
    })
}

fn confuse_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    let mut hit = false;
    for at in area_tiles(ctx, game) {
        let target = game
            .board
            .pawn_at(at)
            .filter(|p| p.colour != colour && !p.has_flag(flags::CONFUSED))
            .map(|p| p.id);
        if let Some(id) = target {
            if let Some(p) = game.board.pawn_mut(id) {
                p.flags |= flags::CONFUSED;
            }
            game.touch_pawn(id);
            hit = true;
        }
    }
    hit
}

fn wall_test(ctx: &PowerCtx, game: &Game) -> bool {
    area_tiles(ctx, game).iter().any(|at| {
        game.board
            .tile(*at)
            .map(|t| !t.smashed && t.height < crate::board::MAX_HEIGHT)
            .unwrap_or(false)
    })
}

fn wall_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let mut hit = false;
    for at in area_tiles(ctx, game) {
        let raised = match game.board.tile_mut(at) {
            Some(tile) if !tile.smashed => tile.set_height(crate::board::MAX_HEIGHT),
            _ => false,
        };
        if raised {
            game.touch_tile(at);
            hit = true;
        }
    }
    hit
}

fn own_tile_height(ctx: &PowerCtx, game: &Game) -> Option<(Coords, i32)> {
    let pawn = game.board.pawn(ctx.pawn)?;
    let tile = game.board.tile(pawn.tile)?;
    Some((pawn.tile, tile.height))
}

fn raise_test(ctx: &PowerCtx, game: &Game) -> bool {
    own_tile_height(ctx, game)
        .map(|(_, h)| h < crate::board::MAX_HEIGHT)
        .unwrap_or(false)
}

fn raise_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    adjust_own_tile(ctx, game, 1)
}

fn lower_test(ctx: &PowerCtx, game: &Game) -> bool {
    own_tile_height(ctx, game)
        .map(|(_, h)| h > crate::board::MIN_HEIGHT)
        .unwrap_or(false)
}

fn lower_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    adjust_own_tile(ctx, game, -1)
}

fn adjust_own_tile(ctx: &PowerCtx, game: &mut Game, delta: i32) -> bool {
    let (at, height) = match own_tile_height(ctx, game) {
        Some(v) => v,
        None => return false,
    };
    let changed = game
        .board
        .tile_mut(at)
        .map(|t| t.set_height(height + delta))
        .unwrap_or(false);
    if changed {
        game.touch_tile(at);
    }
    changed
}

fn range_test(ctx: &PowerCtx, game: &Game) -> bool {
    game.board
        .pawn(ctx.pawn)
        .map(|p| p.range < MAX_RANGE)
        .unwrap_or(false)
}

fn range_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    game.grant_range(ctx.pawn)
}

macro_rules! flag_power {
    ($test:ident, $use:ident, $flag:expr) => {
        fn $test(ctx: &PowerCtx, game: &Game) -> bool {
            game.board
                .pawn(ctx.pawn)
                .map(|p| !p.has_flag($flag))
                .unwrap_or(false)
        }

        fn $use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
            game.grant_flag(ctx.pawn, $flag)
        }
    };
}

flag_power!(climb_test, climb_use, flags::CLIMB);
flag_power!(jump_test, jump_use, flags::JUMP);
flag_power!(armour_test, armour_use, flags::ARMOUR);
flag_power!(shield_test, shield_use, flags::SHIELD);
flag_power!(invis_test, invis_use, flags::INVIS);

fn pad_test(ctx: &PowerCtx, game: &Game) -> bool {
    let colour = match caster_colour(ctx, game) {
        Some(c) => c,
        None => return false,
    };
    game.board
        .pawn(ctx.pawn)
        .and_then(|p| game.board.tile(p.tile))
        .map(|t| !t.smashed && t.hole.is_none() && t.mine.is_none() && t.pad != Some(colour))
        .unwrap_or(false)
}

fn pad_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let (colour, at) = match game.board.pawn(ctx.pawn) {
        Some(p) => (p.colour, p.tile),
        None => return false,
    };
    let placed = match game.board.tile_mut(at) {
        Some(tile) if !tile.smashed && tile.hole.is_none() && tile.mine.is_none() => {
            if tile.pad == Some(colour) {
                false
            } else {
                tile.pad = Some(colour);
                true
            }
        }
        _ => false,
    };
    if placed {
        game.touch_tile(at);
    }
    placed
}

fn teleport_test(_ctx: &PowerCtx, game: &Game) -> bool {
    game.board.tiles().any(|t| t.is_open() && t.mine.is_none())
}

fn teleport_use(ctx: &PowerCtx, game: &mut Game, rng: &mut dyn RngCore) -> bool {
    // Reborrow: the sized `&mut dyn RngCore` satisfies the generic bound.
    game.teleport_pawn(ctx.pawn, &mut &mut *rng)
}

fn black_hole_test(_ctx: &PowerCtx, _game: &Game) -> bool {
    true
}

fn black_hole_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let (at, range) = match game.board.pawn(ctx.pawn) {
        Some(p) => (p.tile, p.range),
        None => return false,
    };
    // The casting pawn is consumed; its tile becomes the hazard.
    game.destroy_pawn(ctx.pawn, shared::DestroyCause::BlackHole);
    if let Some(tile) = game.board.tile_mut(at) {
        tile.pickup = None;
        tile.mine = None;
        tile.pad = None;
        tile.hole = Some(range as u32 + 1);
    }
    game.touch_tile(at);
    true
}

fn worm_test(_ctx: &PowerCtx, _game: &Game) -> bool {
    true
}

fn worm_use(ctx: &PowerCtx, game: &mut Game, _rng: &mut dyn RngCore) -> bool {
    let (at, colour, range) = match game.board.pawn(ctx.pawn) {
        Some(p) => (p.tile, p.colour, p.range),
        None => return false,
    };
    game.pending_worm = Some(WormSeed {
        start: at,
        colour,
        ticks: range + 2,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::Colour;
    use std::collections::HashMap;

    fn setup(caster: Coords) -> (Game, PawnId, Registry) {
        let mut board = Board::grid(7, 7);
        let id = board.spawn_pawn(caster, Colour::Blue).unwrap();
        (Game::new(board), id, Registry::standard())
    }

    #[test]
    fn registry_weight_sum_is_positive() {
        let reg = Registry::standard();
        assert!(reg.total_weight() > 0);
        assert!(!reg.is_empty());
    }

    #[test]
    fn directional_powers_registered_four_times() {
        let reg = Registry::standard();
        for prefix in ["Destroy", "Shatter", "Purify", "Minefield", "Confuse", "Wall"] {
            let count = reg
                .iter()
                .filter(|d| d.name.starts_with(prefix))
                .count();
            assert_eq!(count, 4, "{} must bind all four directions", prefix);
        }
    }

    #[test]
    fn weighted_selection_matches_weights() {
        let reg = Registry::standard();
        let mut rng = StdRng::seed_from_u64(99);
        let draws = 200_000;
        let mut counts: HashMap<usize, u32> = HashMap::new();
        for _ in 0..draws {
            *counts.entry(reg.random_power(&mut rng)).or_insert(0) += 1;
        }
        let total = reg.total_weight() as f64;
        for (index, def) in reg.iter().enumerate() {
            let expected = def.spawn_weight as f64 / total;
            let got = *counts.get(&index).unwrap_or(&0) as f64 / draws as f64;
            assert!(
                counts.get(&index).is_some(),
                "{} never selected",
                def.name
            );
            assert!(
                (expected - got).abs() < 0.005,
                "{}: expected {:.4}, got {:.4}",
                def.name,
                expected,
                got
            );
        }
    }

    #[test]
    fn destroy_row_kills_enemies_spares_allies() {
        let (mut game, id, reg) = setup((3, 3));
        let enemy = game.board.spawn_pawn((5, 3), Colour::Red).unwrap();
        let ally = game.board.spawn_pawn((1, 3), Colour::Blue).unwrap();
        let other_row = game.board.spawn_pawn((3, 4), Colour::Red).unwrap();
        let index = reg.find("Destroy Row").unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.test(index, id, &game));
        assert!(reg.apply(index, id, &mut game, &mut rng));

        assert!(game.board.pawn(enemy).is_none());
        assert!(game.board.pawn(ally).is_some());
        assert!(game.board.pawn(other_row).is_some());
        assert!(game.board.pawn(id).is_some(), "caster survives");
    }

    #[test]
    fn destroy_spent_on_shielded_enemy() {
        let (mut game, id, reg) = setup((3, 3));
        let enemy = game.board.spawn_pawn((4, 3), Colour::Red).unwrap();
        game.board.pawn_mut(enemy).unwrap().flags |= flags::SHIELD;
        let index = reg.find("Destroy Radial").unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        let survivor = game.board.pawn(enemy).unwrap();
        assert!(!survivor.has_flag(flags::SHIELD), "shield spent");
    }

    #[test]
    fn destroy_fails_without_targets() {
        let (game, id, reg) = setup((3, 3));
        let index = reg.find("Destroy Radial").unwrap();
        assert!(!reg.test(index, id, &game));
    }

    #[test]
    fn shatter_row_smashes_tiles_and_kills_everything() {
        let (mut game, id, reg) = setup((3, 3));
        let enemy = game.board.spawn_pawn((5, 3), Colour::Red).unwrap();
        let index = reg.find("Shatter Row").unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        assert!(game.board.pawn(enemy).is_none());
        // Row shatter covers the caster's own tile.
        assert!(game.board.pawn(id).is_none());
        assert!(game.board.tile((3, 3)).unwrap().smashed);
        assert!(game.board.tile((0, 3)).unwrap().smashed);
        assert!(!game.board.tile((3, 2)).unwrap().smashed);
    }

    #[test]
    fn purify_strips_enemy_bonuses_and_tags() {
        let (mut game, id, reg) = setup((3, 3));
        let enemy = game.board.spawn_pawn((4, 3), Colour::Red).unwrap();
        {
            let p = game.board.pawn_mut(enemy).unwrap();
            p.flags |= flags::SHIELD | flags::CONFUSED;
            p.range = 2;
        }
        game.board.tile_mut((2, 3)).unwrap().mine = Some(Colour::Red);
        game.board.tile_mut((3, 2)).unwrap().pad = Some(Colour::Blue);
        let index = reg.find("Purify Radial").unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.test(index, id, &game));
        assert!(reg.apply(index, id, &mut game, &mut rng));

        let purified = game.board.pawn(enemy).unwrap();
        assert_eq!(purified.flags & flags::GOOD, 0);
        assert_eq!(purified.range, 0);
        assert!(purified.has_flag(flags::CONFUSED), "bad flags stay");
        assert_eq!(game.board.tile((2, 3)).unwrap().mine, None);
        // Own pad untouched: purify only clears enemy tags.
        assert_eq!(game.board.tile((3, 2)).unwrap().pad, Some(Colour::Blue));
    }

    #[test]
    fn mines_refuse_smashed_hole_and_mined_tiles() {
        let (mut game, id, reg) = setup((3, 3));
        game.board.tile_mut((2, 3)).unwrap().smash();
        game.board.tile_mut((4, 3)).unwrap().hole = Some(1);
        game.board.tile_mut((3, 2)).unwrap().mine = Some(Colour::Red);
        let index = reg.find("Minefield Radial").unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        assert_eq!(game.board.tile((2, 3)).unwrap().mine, None);
        assert_eq!(game.board.tile((4, 3)).unwrap().mine, None);
        assert_eq!(game.board.tile((3, 2)).unwrap().mine, Some(Colour::Red));
        // The rest of the neighbourhood got mined.
        assert_eq!(game.board.tile((3, 4)).unwrap().mine, Some(Colour::Blue));
    }

    #[test]
    fn wall_row_raises_to_ceiling() {
        let (mut game, id, reg) = setup((3, 3));
        let index = reg.find("Wall Row").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        for col in 0..7 {
            assert_eq!(game.board.tile((col, 3)).unwrap().height, 2);
        }
        // Applying again changes nothing.
        assert!(!reg.test(index, id, &game));
    }

    #[test]
    fn raise_and_lower_respect_clamp() {
        let (mut game, id, reg) = setup((3, 3));
        let raise = reg.find("Raise Tile").unwrap();
        let lower = reg.find("Lower Tile").unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(reg.apply(raise, id, &mut game, &mut rng));
        assert!(reg.apply(raise, id, &mut game, &mut rng));
        assert!(!reg.apply(raise, id, &mut game, &mut rng), "ceiling");
        assert_eq!(game.board.tile((3, 3)).unwrap().height, 2);

        for _ in 0..4 {
            assert!(reg.apply(lower, id, &mut game, &mut rng));
        }
        assert!(!reg.apply(lower, id, &mut game, &mut rng), "floor");
        assert_eq!(game.board.tile((3, 3)).unwrap().height, -2);
    }

    #[test]
    fn flag_powers_apply_once() {
        let (mut game, id, reg) = setup((3, 3));
        let mut rng = StdRng::seed_from_u64(0);
        for name in ["Climb", "Jump", "Armour", "Shield", "Invisibility"] {
            let index = reg.find(name).unwrap();
            assert!(reg.test(index, id, &game), "{}", name);
            assert!(reg.apply(index, id, &mut game, &mut rng), "{}", name);
            assert!(!reg.test(index, id, &game), "{} twice", name);
        }
    }

    #[test]
    fn extra_range_caps_at_three() {
        let (mut game, id, reg) = setup((3, 3));
        let index = reg.find("Extra Range").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..3 {
            assert!(reg.apply(index, id, &mut game, &mut rng));
        }
        assert!(!reg.apply(index, id, &mut game, &mut rng));
        assert_eq!(game.board.pawn(id).unwrap().range, MAX_RANGE);
    }

    #[test]
    fn teleport_relocates_through_the_registry() {
        let (mut game, id, reg) = setup((3, 3));
        game.board.tile_mut((0, 0)).unwrap().pad = Some(Colour::Blue);
        let index = reg.find("Teleport").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        assert_eq!(game.board.pawn(id).unwrap().tile, (0, 0), "own pad wins");
    }

    #[test]
    fn black_hole_consumes_caster() {
        let (mut game, id, reg) = setup((3, 3));
        game.board.pawn_mut(id).unwrap().range = 2;
        let index = reg.find("Black Hole").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        assert!(game.board.pawn(id).is_none());
        assert_eq!(game.board.tile((3, 3)).unwrap().hole, Some(3));
        let (_, pawns) = game.effects.take();
        let dead = pawns.iter().find(|p| p.destroyed).unwrap();
        assert_eq!(dead.cause, Some(shared::DestroyCause::BlackHole));
    }

    #[test]
    fn worm_power_seeds_the_hazard() {
        let (mut game, id, reg) = setup((3, 3));
        game.board.pawn_mut(id).unwrap().range = 1;
        let index = reg.find("Worm").unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(reg.apply(index, id, &mut game, &mut rng));
        let seed = game.pending_worm.unwrap();
        assert_eq!(seed.start, (3, 3));
        assert_eq!(seed.colour, Colour::Blue);
        assert_eq!(seed.ticks, 3);
    }
}
