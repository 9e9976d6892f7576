//! Board model: tiles, the pawn arena, and hex geometry queries
//!
//! Tiles live on a staggered hex grid ("odd-r" layout: odd rows are shifted
//! half a column to the right). Tiles are keyed by (column, row); pawns live
//! in an arena keyed by a stable [`PawnId`], with tiles holding an optional
//! pawn id and pawns holding their current coordinates. Pure data and query
//! logic: no I/O, no protocol knowledge beyond the snapshot conversions.

use rand::Rng;
use shared::{Colour, PawnState, TileState, MAX_RANGE};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// (column, row) address of a tile.
pub type Coords = (i32, i32);

/// Lowest legal tile elevation.
pub const MIN_HEIGHT: i32 = -2;
/// Highest legal tile elevation.
pub const MAX_HEIGHT: i32 = 2;

/// Stable pawn identifier. Never reused within one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PawnId(pub u32);

/// The six hex directions in the odd-r offset layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexDir {
    Left,
    Right,
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl HexDir {
    pub const ALL: [HexDir; 6] = [
        HexDir::Left,
        HexDir::Right,
        HexDir::NorthWest,
        HexDir::NorthEast,
        HexDir::SouthWest,
        HexDir::SouthEast,
    ];
}

/// Neighbour coordinates in the given direction, using the odd-r offset rule.
pub fn neighbour_coords((col, row): Coords, dir: HexDir) -> Coords {
    let odd = row.rem_euclid(2); // 1 on shifted rows
    match dir {
        HexDir::Left => (col - 1, row),
        HexDir::Right => (col + 1, row),
        HexDir::NorthWest => (col - (1 - odd), row - 1),
        HexDir::NorthEast => (col + odd, row - 1),
        HexDir::SouthWest => (col - (1 - odd), row + 1),
        HexDir::SouthEast => (col + odd, row + 1),
    }
}

/// Planar (Cartesian) position of a tile centre: odd rows sit half a column
/// to the right, rows are half a unit apart.
pub fn planar((col, row): Coords) -> (f32, f32) {
    (
        col as f32 + 0.5 * row.rem_euclid(2) as f32,
        row as f32 * 0.5,
    )
}

/// One cell of the board.
#[derive(Debug, Clone)]
pub struct Tile {
    pub col: i32,
    pub row: i32,
    pub height: i32,
    pub smashed: bool,
    /// Power pickup waiting on this tile (registry index).
    pub pickup: Option<usize>,
    /// Mine owner, if mined.
    pub mine: Option<Colour>,
    /// Landing pad owner, if tagged.
    pub pad: Option<Colour>,
    /// Black-hole pull strength, if converted.
    pub hole: Option<u32>,
    pub pawn: Option<PawnId>,
}

impl Tile {
    pub fn new(col: i32, row: i32, height: i32) -> Tile {
        Tile {
            col,
            row,
            height,
            smashed: false,
            pickup: None,
            mine: None,
            pad: None,
            hole: None,
            pawn: None,
        }
    }

    pub fn coords(&self) -> Coords {
        (self.col, self.row)
    }

    /// Sets the elevation. Returns false (leaving the tile unchanged) when
    /// the value is out of range or equal to the current height.
    pub fn set_height(&mut self, height: i32) -> bool {
        if height != self.height && (MIN_HEIGHT..=MAX_HEIGHT).contains(&height) {
            self.height = height;
            true
        } else {
            false
        }
    }

    /// Permanently destroys the tile, clearing every modifier. The occupying
    /// pawn, if any, must be removed by the caller first.
    pub fn smash(&mut self) {
        self.smashed = true;
        self.pickup = None;
        self.mine = None;
        self.pad = None;
        self.hole = None;
    }

    /// True when a pawn could stand here: not smashed, not a black hole,
    /// and unoccupied.
    pub fn is_open(&self) -> bool {
        !self.smashed && self.hole.is_none() && self.pawn.is_none()
    }

    pub fn to_state(&self) -> TileState {
        TileState {
            col: self.col,
            row: self.row,
            height: self.height,
            smashed: self.smashed,
            has_pickup: self.pickup.is_some(),
            mine: self.mine,
            pad: self.pad,
            hole: self.hole,
        }
    }
}

/// A player-owned piece occupying exactly one tile.
#[derive(Debug, Clone)]
pub struct Pawn {
    pub id: PawnId,
    pub colour: Colour,
    pub tile: Coords,
    pub flags: u8,
    pub range: u8,
    /// Collected power pickups: registry index -> remaining uses.
    pub powers: HashMap<usize, u32>,
}

impl Pawn {
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn to_state(&self) -> PawnState {
        let mut powers: Vec<(usize, u32)> = self.powers.iter().map(|(i, n)| (*i, *n)).collect();
        powers.sort_unstable();
        PawnState {
            col: self.tile.0,
            row: self.tile.1,
            moved_from: None,
            colour: self.colour,
            flags: self.flags,
            range: self.range,
            powers,
            destroyed: false,
            cause: None,
        }
    }
}

/// Criteria for [`Board::random_tiles`].
#[derive(Debug, Clone, Copy)]
pub struct TileFilter {
    pub allow_occupied: bool,
    pub allow_smashed: bool,
    pub allow_mines: bool,
    pub allow_holes: bool,
}

impl TileFilter {
    /// Tiles eligible to receive a spawned power pickup.
    pub fn power_spawn() -> TileFilter {
        TileFilter {
            allow_occupied: true,
            allow_smashed: false,
            allow_mines: true,
            allow_holes: false,
        }
    }

    /// Tiles eligible as a teleport destination.
    pub fn teleport() -> TileFilter {
        TileFilter {
            allow_occupied: false,
            allow_smashed: false,
            allow_mines: false,
            allow_holes: false,
        }
    }
}

/// The whole board: tile grid plus pawn arena.
#[derive(Debug, Clone, Default)]
pub struct Board {
    tiles: BTreeMap<Coords, Tile>,
    pawns: BTreeMap<PawnId, Pawn>,
    next_pawn: u32,
}

impl Board {
    pub fn new() -> Board {
        Board::default()
    }

    /// Builds a full cols x rows grid at elevation 0. Scenario files start
    /// from this and then carve gaps and set heights.
    pub fn grid(cols: i32, rows: i32) -> Board {
        let mut board = Board::new();
        for row in 0..rows {
            for col in 0..cols {
                board.insert_tile(Tile::new(col, row, 0));
            }
        }
        board
    }

    pub fn insert_tile(&mut self, tile: Tile) {
        self.tiles.insert(tile.coords(), tile);
    }

    pub fn remove_tile(&mut self, at: Coords) {
        self.tiles.remove(&at);
    }

    pub fn tile(&self, at: Coords) -> Option<&Tile> {
        self.tiles.get(&at)
    }

    pub fn tile_mut(&mut self, at: Coords) -> Option<&mut Tile> {
        self.tiles.get_mut(&at)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn pawn(&self, id: PawnId) -> Option<&Pawn> {
        self.pawns.get(&id)
    }

    pub fn pawn_mut(&mut self, id: PawnId) -> Option<&mut Pawn> {
        self.pawns.get_mut(&id)
    }

    pub fn pawn_at(&self, at: Coords) -> Option<&Pawn> {
        self.tile(at)
            .and_then(|t| t.pawn)
            .and_then(|id| self.pawn(id))
    }

    pub fn pawn_ids(&self) -> Vec<PawnId> {
        self.pawns.keys().copied().collect()
    }

    /// Ids of every pawn of the given colour.
    pub fn player_pawns(&self, colour: Colour) -> Vec<PawnId> {
        self.pawns
            .values()
            .filter(|p| p.colour == colour)
            .map(|p| p.id)
            .collect()
    }

    /// Colours that own at least one pawn on the board.
    pub fn colours(&self) -> BTreeSet<Colour> {
        self.pawns.values().map(|p| p.colour).collect()
    }

    /// Places a new pawn. Fails if the tile is missing or not open.
    pub fn spawn_pawn(&mut self, at: Coords, colour: Colour) -> Option<PawnId> {
        if !self.tile(at).map(Tile::is_open).unwrap_or(false) {
            return None;
        }
        let id = PawnId(self.next_pawn);
        self.next_pawn += 1;
        self.pawns.insert(
            id,
            Pawn {
                id,
                colour,
                tile: at,
                flags: 0,
                range: 0,
                powers: HashMap::new(),
            },
        );
        if let Some(tile) = self.tile_mut(at) {
            tile.pawn = Some(id);
        }
        Some(id)
    }

    /// Detaches the pawn from its tile and drops it from the arena.
    pub fn remove_pawn(&mut self, id: PawnId) -> Option<Pawn> {
        let pawn = self.pawns.remove(&id)?;
        if let Some(tile) = self.tile_mut(pawn.tile) {
            tile.pawn = None;
        }
        Some(pawn)
    }

    /// Moves the pawn to an open tile: detach from the old tile, attach to
    /// the new. The destination must be open.
    pub fn relocate_pawn(&mut self, id: PawnId, to: Coords) -> bool {
        if !self.tile(to).map(Tile::is_open).unwrap_or(false) {
            return false;
        }
        let from = match self.pawns.get(&id) {
            Some(p) => p.tile,
            None => return false,
        };
        if let Some(tile) = self.tile_mut(from) {
            tile.pawn = None;
        }
        if let Some(tile) = self.tile_mut(to) {
            tile.pawn = Some(id);
        }
        if let Some(pawn) = self.pawns.get_mut(&id) {
            pawn.tile = to;
        }
        true
    }

    pub fn neighbour(&self, at: Coords, dir: HexDir) -> Option<&Tile> {
        self.tile(neighbour_coords(at, dir))
    }

    /// The radial neighbourhood: every tile within `1 + range` steps of the
    /// origin, origin excluded.
    pub fn radial_tiles(&self, origin: Coords, range: u8) -> Vec<Coords> {
        let radius = 1 + range.min(MAX_RANGE) as i32;
        let mut seen = BTreeSet::from([origin]);
        let mut frontier = vec![origin];
        for _ in 0..radius {
            let mut next = Vec::new();
            for at in frontier {
                for dir in HexDir::ALL {
                    let n = neighbour_coords(at, dir);
                    if self.tiles.contains_key(&n) && seen.insert(n) {
                        next.push(n);
                    }
                }
            }
            frontier = next;
        }
        seen.remove(&origin);
        seen.into_iter().collect()
    }

    /// Every tile whose row is within `range` rows of the origin's,
    /// origin's own tile included.
    pub fn row_tiles(&self, origin: Coords, range: u8) -> Vec<Coords> {
        let span = range.min(MAX_RANGE) as i32;
        self.tiles
            .keys()
            .filter(|(_, row)| (row - origin.1).abs() <= span)
            .copied()
            .collect()
    }

    /// Contiguous chain of tiles through the origin along the axis given by
    /// the two opposite directions. Stops at board edges and gaps; smashed
    /// tiles still count as part of the chain.
    fn chain(&self, origin: Coords, forward: HexDir, backward: HexDir) -> Vec<Coords> {
        let mut out = vec![origin];
        for dir in [forward, backward] {
            let mut at = origin;
            loop {
                at = neighbour_coords(at, dir);
                if self.tiles.contains_key(&at) {
                    out.push(at);
                } else {
                    break;
                }
            }
        }
        out
    }

    /// Diagonal line through NE/SW, widened by `range` parallel lines on
    /// each side.
    pub fn fs_tiles(&self, origin: Coords, range: u8) -> Vec<Coords> {
        self.diagonal(origin, range, HexDir::NorthEast, HexDir::SouthWest)
    }

    /// Diagonal line through NW/SE, widened by `range` parallel lines on
    /// each side.
    pub fn bs_tiles(&self, origin: Coords, range: u8) -> Vec<Coords> {
        self.diagonal(origin, range, HexDir::NorthWest, HexDir::SouthEast)
    }

    fn diagonal(&self, origin: Coords, range: u8, forward: HexDir, backward: HexDir) -> Vec<Coords> {
        let mut seen: BTreeSet<Coords> = BTreeSet::new();
        let span = range.min(MAX_RANGE) as i32;
        for offset in -span..=span {
            let start = (origin.0 + offset, origin.1);
            // Parallel lines start from tiles in the same row; a missing
            // start tile means that line is off the board here.
            if offset != 0 && !self.tiles.contains_key(&start) {
                continue;
            }
            seen.extend(self.chain(start, forward, backward));
        }
        seen.into_iter().collect()
    }

    /// Coordinates of every black-hole tile.
    pub fn holes(&self) -> Vec<Coords> {
        self.tiles
            .values()
            .filter(|t| t.hole.is_some())
            .map(Tile::coords)
            .collect()
    }

    /// Picks up to `num` random tiles matching the filter. With `unique`
    /// set, no tile is returned twice.
    pub fn random_tiles(
        &self,
        rng: &mut impl Rng,
        num: usize,
        unique: bool,
        filter: TileFilter,
    ) -> Vec<Coords> {
        let mut pool: Vec<Coords> = self
            .tiles
            .values()
            .filter(|t| {
                (filter.allow_occupied || t.pawn.is_none())
                    && (filter.allow_smashed || !t.smashed)
                    && (filter.allow_mines || t.mine.is_none())
                    && (filter.allow_holes || t.hole.is_none())
            })
            .map(Tile::coords)
            .collect();

        let mut out = Vec::new();
        while !pool.is_empty() && out.len() < num {
            let i = rng.gen_range(0..pool.len());
            out.push(pool[i]);
            if unique {
                pool.swap_remove(i);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn set_height_rejects_out_of_range_and_unchanged() {
        let mut tile = Tile::new(0, 0, 0);
        assert!(tile.set_height(2));
        assert!(!tile.set_height(2), "unchanged height must fail");
        assert!(!tile.set_height(3), "above ceiling must fail");
        assert!(!tile.set_height(-3), "below floor must fail");
        assert_eq!(tile.height, 2);
        assert!(tile.set_height(-2));
        assert_eq!(tile.height, -2);
    }

    #[test]
    fn smash_clears_modifiers() {
        let mut tile = Tile::new(0, 0, 0);
        tile.pickup = Some(3);
        tile.mine = Some(Colour::Red);
        tile.pad = Some(Colour::Blue);
        tile.smash();
        assert!(tile.smashed);
        assert_eq!(tile.pickup, None);
        assert_eq!(tile.mine, None);
        assert_eq!(tile.pad, None);
        assert!(!tile.is_open());
    }

    #[test]
    fn neighbour_offsets_follow_odd_r_rule() {
        // Even row: both north neighbours lean left.
        assert_eq!(neighbour_coords((3, 2), HexDir::NorthWest), (2, 1));
        assert_eq!(neighbour_coords((3, 2), HexDir::NorthEast), (3, 1));
        // Odd row: both north neighbours lean right.
        assert_eq!(neighbour_coords((3, 3), HexDir::NorthWest), (3, 2));
        assert_eq!(neighbour_coords((3, 3), HexDir::NorthEast), (4, 2));
        assert_eq!(neighbour_coords((3, 3), HexDir::Left), (2, 3));
        assert_eq!(neighbour_coords((3, 3), HexDir::Right), (4, 3));
    }

    #[test]
    fn planar_offsets_odd_rows() {
        assert_eq!(planar((2, 2)), (2.0, 1.0));
        assert_eq!(planar((2, 3)), (2.5, 1.5));
    }

    #[test]
    fn spawn_and_relocate_keep_occupancy_consistent() {
        let mut board = Board::grid(4, 4);
        let id = board.spawn_pawn((1, 1), Colour::Blue).unwrap();
        assert_eq!(board.tile((1, 1)).unwrap().pawn, Some(id));

        // Occupied tile refuses a second pawn.
        assert_eq!(board.spawn_pawn((1, 1), Colour::Red), None);

        assert!(board.relocate_pawn(id, (2, 1)));
        assert_eq!(board.tile((1, 1)).unwrap().pawn, None);
        assert_eq!(board.tile((2, 1)).unwrap().pawn, Some(id));
        assert_eq!(board.pawn(id).unwrap().tile, (2, 1));

        // Occupied destination refuses the move.
        let other = board.spawn_pawn((3, 1), Colour::Red).unwrap();
        assert!(!board.relocate_pawn(other, (2, 1)));
        assert_eq!(board.pawn(other).unwrap().tile, (3, 1));
    }

    #[test]
    fn remove_pawn_clears_tile() {
        let mut board = Board::grid(2, 2);
        let id = board.spawn_pawn((0, 0), Colour::Green).unwrap();
        let pawn = board.remove_pawn(id).unwrap();
        assert_eq!(pawn.colour, Colour::Green);
        assert_eq!(board.tile((0, 0)).unwrap().pawn, None);
        assert!(board.remove_pawn(id).is_none());
    }

    #[test]
    fn radial_tiles_cover_six_neighbours_at_base_range() {
        let board = Board::grid(5, 5);
        let area = board.radial_tiles((2, 2), 0);
        assert_eq!(area.len(), 6);
        assert!(!area.contains(&(2, 2)), "origin excluded");
        for at in &area {
            assert!(board.tile(*at).is_some());
        }
        // Range widens the ball: radius 2 around an interior tile.
        let wide = board.radial_tiles((2, 2), 1);
        assert!(wide.len() > area.len());
    }

    #[test]
    fn radial_tiles_clipped_at_board_edge() {
        let board = Board::grid(3, 3);
        let corner = board.radial_tiles((0, 0), 0);
        assert!(corner.len() < 6);
    }

    #[test]
    fn row_tiles_span_widens_with_range() {
        let board = Board::grid(4, 5);
        let base = board.row_tiles((1, 2), 0);
        assert_eq!(base.len(), 4);
        assert!(base.contains(&(1, 2)));
        let wide = board.row_tiles((1, 2), 1);
        assert_eq!(wide.len(), 12);
    }

    #[test]
    fn diagonal_chains_stop_at_gaps() {
        let mut board = Board::grid(5, 5);
        board.remove_tile(neighbour_coords((2, 2), HexDir::NorthEast));
        let line = board.fs_tiles((2, 2), 0);
        assert!(line.contains(&(2, 2)));
        // Severed on the NE side: nothing beyond the gap.
        assert!(!line.contains(&neighbour_coords(
            neighbour_coords((2, 2), HexDir::NorthEast),
            HexDir::NorthEast
        )));
        // SW side intact.
        assert!(line.contains(&neighbour_coords((2, 2), HexDir::SouthWest)));
    }

    #[test]
    fn random_tiles_respect_filter() {
        let mut board = Board::grid(3, 3);
        board.spawn_pawn((0, 0), Colour::Blue).unwrap();
        board.tile_mut((1, 0)).unwrap().smash();
        board.tile_mut((2, 0)).unwrap().mine = Some(Colour::Red);
        board.tile_mut((0, 1)).unwrap().hole = Some(2);

        let mut rng = StdRng::seed_from_u64(7);
        let picks = board.random_tiles(&mut rng, 50, false, TileFilter::teleport());
        assert!(!picks.is_empty());
        for at in picks {
            let tile = board.tile(at).unwrap();
            assert!(tile.pawn.is_none());
            assert!(!tile.smashed);
            assert!(tile.mine.is_none());
            assert!(tile.hole.is_none());
        }
    }

    #[test]
    fn random_tiles_unique_never_repeats() {
        let board = Board::grid(3, 3);
        let mut rng = StdRng::seed_from_u64(1);
        let picks = board.random_tiles(&mut rng, 100, true, TileFilter::power_spawn());
        assert_eq!(picks.len(), 9);
        let unique: BTreeSet<_> = picks.iter().collect();
        assert_eq!(unique.len(), picks.len());
    }
}
