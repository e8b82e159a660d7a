//! Move extraction: turn this turn's pending tiles into the words they form
//!
//! Checks, in order:
//! 1. At least one tile, all on the board, none on an occupied cell
//! 2. All tiles share one row or one column
//! 3. The tiles lie in one contiguous run (existing tiles may fill gaps)
//!
//! The main word is the full run along the shared axis; every pending tile
//! whose perpendicular run is longer than one cell adds a cross word.

use super::board::{Board, Position, BOARD_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A tile placed on the board this turn but not yet submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingTile {
    pub x: usize,
    pub y: usize,
    pub letter: char,
}

impl PendingTile {
    pub fn new(x: usize, y: usize, letter: char) -> Self {
        Self { x, y, letter }
    }

    pub fn pos(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Direction of a run of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    fn perpendicular(self) -> Self {
        match self {
            Orientation::Horizontal => Orientation::Vertical,
            Orientation::Vertical => Orientation::Horizontal,
        }
    }

    fn step_back(self, pos: Position) -> Option<Position> {
        match self {
            Orientation::Horizontal if pos.x > 0 => Some(Position::new(pos.x - 1, pos.y)),
            Orientation::Vertical if pos.y > 0 => Some(Position::new(pos.x, pos.y - 1)),
            _ => None,
        }
    }

    fn step_forward(self, pos: Position) -> Option<Position> {
        match self {
            Orientation::Horizontal if pos.x + 1 < BOARD_SIZE => {
                Some(Position::new(pos.x + 1, pos.y))
            }
            Orientation::Vertical if pos.y + 1 < BOARD_SIZE => {
                Some(Position::new(pos.x, pos.y + 1))
            }
            _ => None,
        }
    }
}

/// A word on the board with the coordinates of each of its letters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedWord {
    pub word: String,
    pub positions: Vec<Position>,
}

impl PlacedWord {
    /// Letters paired with their cells, in reading order
    pub fn letters(&self) -> impl Iterator<Item = (char, Position)> + '_ {
        self.word.chars().zip(self.positions.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Every word formed by one turn's placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMove {
    pub orientation: Orientation,
    pub main: PlacedWord,
    pub cross: Vec<PlacedWord>,
}

impl ExtractedMove {
    /// Main word first, then cross words in tile order
    pub fn words(&self) -> impl Iterator<Item = &PlacedWord> {
        std::iter::once(&self.main).chain(self.cross.iter())
    }

    pub fn word_count(&self) -> usize {
        1 + self.cross.len()
    }
}

/// Why a placement could not be turned into words
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("place at least one tile first")]
    NoTiles,
    #[error("{0} is off the board")]
    OutOfBounds(Position),
    #[error("cell {0} is already occupied")]
    CellOccupied(Position),
    #[error("two tiles placed on {0}")]
    DuplicatePosition(Position),
    #[error("tiles must be placed in a straight line")]
    NotInLine,
    #[error("tiles must form one unbroken word")]
    NotContiguous,
}

/// Sort pending tiles by row, then column
pub fn sort_pending(pending: &[PendingTile]) -> Vec<PendingTile> {
    let mut sorted = pending.to_vec();
    sorted.sort_by_key(|t| (t.y, t.x));
    sorted
}

/// Derive the main word and cross words formed by `pending` on `board`.
/// `board` holds only previously submitted tiles.
pub fn extract_words(board: &Board, pending: &[PendingTile]) -> Result<ExtractedMove, MoveError> {
    if pending.is_empty() {
        return Err(MoveError::NoTiles);
    }

    let sorted = sort_pending(pending);
    let mut seen = HashSet::new();
    for tile in &sorted {
        let pos = tile.pos();
        if !pos.in_bounds() {
            return Err(MoveError::OutOfBounds(pos));
        }
        if board.is_occupied(pos) {
            return Err(MoveError::CellOccupied(pos));
        }
        if !seen.insert(pos) {
            return Err(MoveError::DuplicatePosition(pos));
        }
    }

    let first = sorted[0];
    let horizontal = sorted.iter().all(|t| t.y == first.y);
    let vertical = sorted.iter().all(|t| t.x == first.x);
    if !horizontal && !vertical {
        return Err(MoveError::NotInLine);
    }

    let mut overlay = board.clone();
    for tile in &sorted {
        overlay.set(tile.pos(), tile.letter);
    }

    let orientation = if horizontal && vertical {
        // A lone tile reads along whichever axis actually forms a word
        if run_through(&overlay, first.pos(), Orientation::Horizontal).len() > 1 {
            Orientation::Horizontal
        } else if run_through(&overlay, first.pos(), Orientation::Vertical).len() > 1 {
            Orientation::Vertical
        } else {
            Orientation::Horizontal
        }
    } else if horizontal {
        Orientation::Horizontal
    } else {
        Orientation::Vertical
    };

    let main = run_through(&overlay, first.pos(), orientation);
    if !sorted.iter().all(|t| main.positions.contains(&t.pos())) {
        return Err(MoveError::NotContiguous);
    }

    let cross = sorted
        .iter()
        .map(|t| run_through(&overlay, t.pos(), orientation.perpendicular()))
        .filter(|w| w.len() > 1)
        .collect();

    Ok(ExtractedMove {
        orientation,
        main,
        cross,
    })
}

/// The maximal run of occupied cells along `orientation` that contains `pos`
fn run_through(board: &Board, pos: Position, orientation: Orientation) -> PlacedWord {
    let mut start = pos;
    while let Some(prev) = orientation.step_back(start) {
        if !board.is_occupied(prev) {
            break;
        }
        start = prev;
    }

    let mut positions = Vec::new();
    let mut word = String::new();
    let mut cursor = Some(start);
    while let Some(current) = cursor {
        match board.get(current) {
            Some(letter) => {
                word.push(letter);
                positions.push(current);
                cursor = orientation.step_forward(current);
            }
            None => break,
        }
    }

    PlacedWord { word, positions }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(tiles: &[(usize, usize, char)]) -> Board {
        let mut board = Board::new();
        for &(x, y, c) in tiles {
            board.set(Position::new(x, y), c);
        }
        board
    }

    fn pending(tiles: &[(usize, usize, char)]) -> Vec<PendingTile> {
        tiles.iter().map(|&(x, y, c)| PendingTile::new(x, y, c)).collect()
    }

    #[test]
    fn test_single_word_on_empty_board() {
        let board = Board::new();
        let mv = extract_words(&board, &pending(&[(9, 7, 'T'), (7, 7, 'C'), (8, 7, 'A')])).unwrap();
        assert_eq!(mv.main.word, "CAT");
        assert_eq!(
            mv.main.positions,
            vec![Position::new(7, 7), Position::new(8, 7), Position::new(9, 7)]
        );
        assert!(mv.cross.is_empty());
        assert_eq!(mv.orientation, Orientation::Horizontal);
    }

    #[test]
    fn test_vertical_word() {
        let board = Board::new();
        let mv = extract_words(&board, &pending(&[(4, 2, 'D'), (4, 3, 'O'), (4, 4, 'G')])).unwrap();
        assert_eq!(mv.main.word, "DOG");
        assert_eq!(mv.orientation, Orientation::Vertical);
    }

    #[test]
    fn test_main_word_extends_through_existing_tiles() {
        let board = board_with(&[(7, 7, 'C'), (8, 7, 'A')]);
        let mv = extract_words(&board, &pending(&[(9, 7, 'T'), (10, 7, 'S')])).unwrap();
        assert_eq!(mv.main.word, "CATS");
        assert_eq!(mv.main.positions.first(), Some(&Position::new(7, 7)));
    }

    #[test]
    fn test_existing_tile_fills_gap() {
        let board = board_with(&[(8, 7, 'A')]);
        let mv = extract_words(&board, &pending(&[(7, 7, 'C'), (9, 7, 'T')])).unwrap();
        assert_eq!(mv.main.word, "CAT");
    }

    #[test]
    fn test_gap_is_rejected() {
        let board = Board::new();
        let err = extract_words(&board, &pending(&[(7, 7, 'C'), (9, 7, 'T')])).unwrap_err();
        assert_eq!(err, MoveError::NotContiguous);
    }

    #[test]
    fn test_not_in_line_is_rejected() {
        let board = Board::new();
        let err = extract_words(&board, &pending(&[(7, 7, 'C'), (8, 8, 'A')])).unwrap_err();
        assert_eq!(err, MoveError::NotInLine);
    }

    #[test]
    fn test_cross_words_one_per_tile_with_perpendicular_run() {
        // Existing vertical "AT" in column 8; playing CAT across row 8
        // extends that column to "ATA" and leaves columns 7 and 9 alone.
        let board = board_with(&[(8, 6, 'A'), (8, 7, 'T')]);
        let mv = extract_words(&board, &pending(&[(7, 8, 'C'), (8, 8, 'A'), (9, 8, 'T')])).unwrap();
        assert_eq!(mv.main.word, "CAT");
        assert_eq!(mv.cross.len(), 1);
        assert_eq!(mv.cross[0].word, "ATA");
        assert_eq!(mv.word_count(), 2);
    }

    #[test]
    fn test_single_tile_picks_axis_with_a_word() {
        let board = board_with(&[(5, 4, 'A')]);
        let mv = extract_words(&board, &pending(&[(5, 5, 'T')])).unwrap();
        assert_eq!(mv.orientation, Orientation::Vertical);
        assert_eq!(mv.main.word, "AT");
        assert!(mv.cross.is_empty());
    }

    #[test]
    fn test_single_tile_both_axes() {
        let board = board_with(&[(4, 5, 'A'), (5, 4, 'O')]);
        let mv = extract_words(&board, &pending(&[(5, 5, 'X')])).unwrap();
        assert_eq!(mv.main.word, "AX");
        assert_eq!(mv.cross.len(), 1);
        assert_eq!(mv.cross[0].word, "OX");
    }

    #[test]
    fn test_occupied_and_out_of_bounds() {
        let board = board_with(&[(3, 3, 'A')]);
        assert_eq!(
            extract_words(&board, &pending(&[(3, 3, 'B')])),
            Err(MoveError::CellOccupied(Position::new(3, 3)))
        );
        assert_eq!(
            extract_words(&board, &pending(&[(15, 3, 'B')])),
            Err(MoveError::OutOfBounds(Position::new(15, 3)))
        );
        assert_eq!(
            extract_words(&board, &pending(&[(1, 1, 'B'), (1, 1, 'C')])),
            Err(MoveError::DuplicatePosition(Position::new(1, 1)))
        );
        assert_eq!(extract_words(&board, &[]), Err(MoveError::NoTiles));
    }

    #[test]
    fn test_run_stops_at_board_edge() {
        let board = board_with(&[(13, 0, 'O')]);
        let mv = extract_words(&board, &pending(&[(14, 0, 'X')])).unwrap();
        assert_eq!(mv.main.word, "OX");
        assert_eq!(mv.main.positions.last(), Some(&Position::new(14, 0)));
    }

    #[test]
    fn test_sort_pending_row_then_column() {
        let sorted = sort_pending(&pending(&[(2, 1, 'B'), (5, 0, 'A'), (1, 1, 'C')]));
        let order: String = sorted.iter().map(|t| t.letter).collect();
        assert_eq!(order, "ACB");
    }
}
