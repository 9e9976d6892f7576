//! Plain-text scenario maps
//!
//! A scenario file starts with a `SIZE cols rows` header building a flat
//! grid, followed by directives that reshape it: `TILE col row height`,
//! `GAP col row` (removes the tile), `SPAWN col row colour`, and
//! `HOLE col row power` (a pre-placed black hole). `#` starts a comment.
//! Load failures are recoverable: the lobby keeps its previous board.

use crate::board::Board;
use log::info;
use shared::Colour;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug)]
pub enum ScenarioError {
    Io(io::Error),
    Parse { line: usize, reason: String },
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Io(err) => write!(f, "scenario read failed: {}", err),
            ScenarioError::Parse { line, reason } => {
                write!(f, "scenario line {}: {}", line, reason)
            }
        }
    }
}

impl Error for ScenarioError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ScenarioError::Io(err) => Some(err),
            ScenarioError::Parse { .. } => None,
        }
    }
}

impl From<io::Error> for ScenarioError {
    fn from(err: io::Error) -> ScenarioError {
        ScenarioError::Io(err)
    }
}

fn parse_error(line: usize, reason: impl Into<String>) -> ScenarioError {
    ScenarioError::Parse {
        line,
        reason: reason.into(),
    }
}

/// Map names come off the wire; refuse anything that could reach outside
/// the scenario directory.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

/// Loads `<dir>/<name>.hxm` into a board.
pub fn load_board(dir: &Path, name: &str) -> Result<Board, ScenarioError> {
    if !valid_name(name) {
        return Err(parse_error(0, format!("bad map name {:?}", name)));
    }
    let path = dir.join(format!("{}.hxm", name));
    let text = fs::read_to_string(&path)?;
    let board = parse(&text)?;
    info!(
        "loaded scenario {:?}: {} tiles, {} pawns",
        name,
        board.tiles().count(),
        board.pawn_ids().len()
    );
    Ok(board)
}

/// Parses scenario text into a board.
pub fn parse(text: &str) -> Result<Board, ScenarioError> {
    let mut board = Board::new();
    let mut sized = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let body = raw.split('#').next().unwrap_or("").trim();
        if body.is_empty() {
            continue;
        }
        let mut words = body.split_whitespace();
        let keyword = match words.next() {
            Some(k) => k,
            None => continue,
        };

        if keyword != "SIZE" && !sized {
            return Err(parse_error(line, "directive before SIZE header"));
        }

        match keyword {
            "SIZE" => {
                if sized {
                    return Err(parse_error(line, "duplicate SIZE header"));
                }
                let cols = number(&mut words, line, "cols")?;
                let rows = number(&mut words, line, "rows")?;
                if cols <= 0 || rows <= 0 {
                    return Err(parse_error(line, "grid dimensions must be positive"));
                }
                board = Board::grid(cols, rows);
                sized = true;
            }
            "TILE" => {
                let at = coords(&mut words, line)?;
                let height = number(&mut words, line, "height")?;
                let set = board
                    .tile_mut(at)
                    .map(|t| t.set_height(height) || t.height == height);
                match set {
                    Some(true) => {}
                    Some(false) => {
                        return Err(parse_error(line, format!("height {} out of range", height)))
                    }
                    None => return Err(parse_error(line, format!("no tile at {:?}", at))),
                }
            }
            "GAP" => {
                let at = coords(&mut words, line)?;
                if board.tile(at).is_none() {
                    return Err(parse_error(line, format!("no tile at {:?}", at)));
                }
                board.remove_tile(at);
            }
            "SPAWN" => {
                let at = coords(&mut words, line)?;
                let slot = number(&mut words, line, "colour")?;
                let colour = usize::try_from(slot)
                    .ok()
                    .and_then(Colour::from_index)
                    .ok_or_else(|| parse_error(line, format!("bad colour index {}", slot)))?;
                if board.spawn_pawn(at, colour).is_none() {
                    return Err(parse_error(line, format!("cannot spawn at {:?}", at)));
                }
            }
            "HOLE" => {
                let at = coords(&mut words, line)?;
                let power = number(&mut words, line, "power")?;
                if power <= 0 {
                    return Err(parse_error(line, "hole power must be positive"));
                }
                match board.tile_mut(at) {
                    Some(tile) => tile.hole = Some(power as u32),
                    None => return Err(parse_error(line, format!("no tile at {:?}", at))),
                }
            }
            other => {
                return Err(parse_error(line, format!("unknown directive {:?}", other)));
            }
        }
    }

    if !sized {
        return Err(parse_error(0, "missing SIZE header"));
    }
    Ok(board)
}

fn number<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    line: usize,
    what: &str,
) -> Result<i32, ScenarioError> {
    let word = words
        .next()
        .ok_or_else(|| parse_error(line, format!("missing {}", what)))?;
    word.parse()
        .map_err(|_| parse_error(line, format!("bad {} {:?}", what, word)))
}

fn coords<'a>(
    words: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<(i32, i32), ScenarioError> {
    Ok((number(words, line, "col")?, number(words, line, "row")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_map() {
        let text = "\
# two player strip
SIZE 4 2
TILE 1 0 2
GAP 3 1
SPAWN 0 0 0
SPAWN 3 0 1
HOLE 2 1 3
";
        let board = parse(text).unwrap();
        assert_eq!(board.tiles().count(), 7);
        assert_eq!(board.tile((1, 0)).unwrap().height, 2);
        assert!(board.tile((3, 1)).is_none());
        assert_eq!(board.tile((2, 1)).unwrap().hole, Some(3));
        assert_eq!(
            board.pawn_at((0, 0)).map(|p| p.colour),
            Some(Colour::Blue)
        );
        assert_eq!(board.pawn_at((3, 0)).map(|p| p.colour), Some(Colour::Red));
    }

    #[test]
    fn trailing_comments_and_blank_lines_are_ignored() {
        let board = parse("SIZE 2 2 # tiny\n\n  # nothing here\nTILE 0 0 -1\n").unwrap();
        assert_eq!(board.tile((0, 0)).unwrap().height, -1);
    }

    #[test]
    fn rejects_directive_before_size() {
        let err = parse("SPAWN 0 0 0\n").unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { line: 1, .. }));
    }

    #[test]
    fn rejects_unknown_directive() {
        let err = parse("SIZE 2 2\nWALL 0 0\n").unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { line: 2, .. }));
    }

    #[test]
    fn rejects_out_of_range_height() {
        let err = parse("SIZE 2 2\nTILE 0 0 5\n").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn rejects_spawn_on_missing_tile() {
        let err = parse("SIZE 2 2\nGAP 1 1\nSPAWN 1 1 0\n").unwrap_err();
        assert!(matches!(err, ScenarioError::Parse { line: 3, .. }));
    }

    #[test]
    fn rejects_bad_colour_index() {
        let err = parse("SIZE 2 2\nSPAWN 0 0 9\n").unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn name_validation_blocks_traversal() {
        assert!(valid_name("hexagon"));
        assert!(valid_name("trench_2p"));
        assert!(!valid_name(""));
        assert!(!valid_name("../secret"));
        assert!(!valid_name("maps/hexagon"));
        assert!(!valid_name("maps\\hexagon"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_board(Path::new("scenario"), "no_such_map").unwrap_err();
        assert!(matches!(err, ScenarioError::Io(_)));
    }
}
