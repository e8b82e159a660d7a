//! The 15x15 board and its fixed special-cell layout

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::tiles::BLANK;

/// Width and height of the board
pub const BOARD_SIZE: usize = 15;

/// A board coordinate. `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Whether the coordinate lies on the board
    pub fn in_bounds(&self) -> bool {
        self.x < BOARD_SIZE && self.y < BOARD_SIZE
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Score modifier attached to a board cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCell {
    Plain,
    TripleWord,
    DoubleWord,
    TripleLetter,
    DoubleLetter,
}

impl SpecialCell {
    /// Multiplier applied to the letter placed on this cell
    pub fn letter_multiplier(&self) -> u32 {
        match self {
            SpecialCell::TripleLetter => 3,
            SpecialCell::DoubleLetter => 2,
            _ => 1,
        }
    }

    /// Multiplier applied to any word running through this cell
    pub fn word_multiplier(&self) -> u32 {
        match self {
            SpecialCell::TripleWord => 3,
            SpecialCell::DoubleWord => 2,
            _ => 1,
        }
    }

    /// Two-character label for terminal rendering
    pub fn label(&self) -> &'static str {
        match self {
            SpecialCell::Plain => " .",
            SpecialCell::TripleWord => "TW",
            SpecialCell::DoubleWord => "DW",
            SpecialCell::TripleLetter => "TL",
            SpecialCell::DoubleLetter => "DL",
        }
    }
}

const TRIPLE_WORD: [(usize, usize); 8] = [
    (0, 0), (0, 7), (0, 14), (7, 0), (7, 14), (14, 0), (14, 7), (14, 14),
];

const DOUBLE_WORD: [(usize, usize); 8] = [
    (1, 1), (2, 2), (3, 3), (4, 4), (13, 13), (12, 12), (11, 11), (10, 10),
];

const TRIPLE_LETTER: [(usize, usize); 12] = [
    (1, 5), (1, 9), (5, 1), (5, 5), (5, 9), (5, 13),
    (9, 1), (9, 5), (9, 9), (9, 13), (13, 5), (13, 9),
];

const DOUBLE_LETTER: [(usize, usize); 24] = [
    (0, 3), (0, 11), (2, 6), (2, 8), (3, 0), (3, 7), (3, 14), (6, 2),
    (6, 6), (6, 8), (6, 12), (7, 3), (7, 11), (8, 2), (8, 6), (8, 8),
    (8, 12), (11, 0), (11, 7), (11, 14), (12, 6), (12, 8), (14, 3), (14, 11),
];

/// Lookup grid indexed `[x][y]`, built once from the coordinate lists.
/// The lists are disjoint; later categories would win on overlap.
static SPECIAL_CELLS: Lazy<[[SpecialCell; BOARD_SIZE]; BOARD_SIZE]> = Lazy::new(|| {
    let mut grid = [[SpecialCell::Plain; BOARD_SIZE]; BOARD_SIZE];
    let layers: [(&[(usize, usize)], SpecialCell); 4] = [
        (&TRIPLE_WORD, SpecialCell::TripleWord),
        (&DOUBLE_WORD, SpecialCell::DoubleWord),
        (&TRIPLE_LETTER, SpecialCell::TripleLetter),
        (&DOUBLE_LETTER, SpecialCell::DoubleLetter),
    ];
    for (cells, kind) in layers {
        for &(x, y) in cells {
            grid[x][y] = kind;
        }
    }
    grid
});

/// Classify a cell. Off-board coordinates are plain.
pub fn classify(pos: Position) -> SpecialCell {
    if !pos.in_bounds() {
        return SpecialCell::Plain;
    }
    SPECIAL_CELLS[pos.x][pos.y]
}

/// Row-major wire form of the board: `rows[y][x]`, one-character strings or null
pub type BoardRows = Vec<Vec<Option<String>>>;

/// A 15x15 grid of optional tile symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "BoardRows", try_from = "BoardRows")]
pub struct Board {
    cells: [[Option<char>; BOARD_SIZE]; BOARD_SIZE],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// An empty board
    pub fn new() -> Self {
        Self {
            cells: [[None; BOARD_SIZE]; BOARD_SIZE],
        }
    }

    /// Symbol at a position, `None` when empty or off the board
    pub fn get(&self, pos: Position) -> Option<char> {
        if !pos.in_bounds() {
            return None;
        }
        self.cells[pos.y][pos.x]
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.get(pos).is_some()
    }

    /// Place a symbol. Off-board positions are ignored.
    pub fn set(&mut self, pos: Position, symbol: char) {
        if pos.in_bounds() {
            self.cells[pos.y][pos.x] = Some(symbol);
        }
    }

    /// Empty a cell
    pub fn clear(&mut self, pos: Position) {
        if pos.in_bounds() {
            self.cells[pos.y][pos.x] = None;
        }
    }

    /// Whether no cell is occupied
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|c| c.is_none())
    }

    /// Number of occupied cells
    pub fn tile_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Iterate over occupied cells in row-major order
    pub fn occupied(&self) -> impl Iterator<Item = (Position, char)> + '_ {
        self.cells.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(x, cell)| cell.map(|c| (Position::new(x, y), c)))
        })
    }

    /// Convert to the row-major wire form
    pub fn to_rows(&self) -> BoardRows {
        self.cells
            .iter()
            .map(|row| row.iter().map(|c| c.map(|ch| ch.to_string())).collect())
            .collect()
    }

    /// Parse the row-major wire form
    pub fn from_rows(rows: &[Vec<Option<String>>]) -> Result<Self, BoardFormatError> {
        if rows.len() != BOARD_SIZE {
            return Err(BoardFormatError::WrongRowCount(rows.len()));
        }
        let mut board = Board::new();
        for (y, row) in rows.iter().enumerate() {
            if row.len() != BOARD_SIZE {
                return Err(BoardFormatError::WrongRowLength { row: y, len: row.len() });
            }
            for (x, cell) in row.iter().enumerate() {
                if let Some(text) = cell {
                    let mut chars = text.chars();
                    match (chars.next(), chars.next()) {
                        (Some(ch), None) if ch.is_ascii_uppercase() || ch == BLANK => {
                            board.cells[y][x] = Some(ch);
                        }
                        _ => {
                            return Err(BoardFormatError::BadCell {
                                pos: Position::new(x, y),
                                value: text.clone(),
                            })
                        }
                    }
                }
            }
        }
        Ok(board)
    }
}

/// Malformed persisted board
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardFormatError {
    #[error("board has {0} rows, expected 15")]
    WrongRowCount(usize),
    #[error("board row {row} has {len} cells, expected 15")]
    WrongRowLength { row: usize, len: usize },
    #[error("board cell {pos} holds {value:?}, expected one letter or blank")]
    BadCell { pos: Position, value: String },
}

impl From<Board> for BoardRows {
    fn from(board: Board) -> Self {
        board.to_rows()
    }
}

impl TryFrom<BoardRows> for Board {
    type Error = BoardFormatError;

    fn try_from(rows: BoardRows) -> Result<Self, Self::Error> {
        Board::from_rows(&rows)
    }
}
