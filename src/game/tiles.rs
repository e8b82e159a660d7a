//! Tile supply: letter distribution, the shuffled bag, and player racks

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Symbol used for an unassigned blank tile
pub const BLANK: char = '_';

/// Maximum tiles held in a rack
pub const RACK_SIZE: usize = 7;

/// Standard distribution: (symbol, count in bag, point value).
const LETTER_DISTRIBUTION: [(char, u32, u32); 27] = [
    ('A', 9, 1),
    ('B', 2, 3),
    ('C', 2, 3),
    ('D', 4, 2),
    ('E', 12, 1),
    ('F', 2, 4),
    ('G', 3, 2),
    ('H', 2, 4),
    ('I', 9, 1),
    ('J', 1, 8),
    ('K', 1, 5),
    ('L', 4, 1),
    ('M', 2, 3),
    ('N', 6, 1),
    ('O', 8, 1),
    ('P', 2, 3),
    ('Q', 1, 10),
    ('R', 6, 1),
    ('S', 4, 1),
    ('T', 6, 1),
    ('U', 4, 1),
    ('V', 2, 4),
    ('W', 2, 4),
    ('X', 1, 8),
    ('Y', 2, 4),
    ('Z', 1, 10),
    (BLANK, 2, 0),
];

/// Point value of a tile symbol. Blank and unknown symbols score 0.
pub fn letter_points(symbol: char) -> u32 {
    let upper = symbol.to_ascii_uppercase();
    LETTER_DISTRIBUTION
        .iter()
        .find(|(c, _, _)| *c == upper)
        .map(|(_, _, points)| *points)
        .unwrap_or(0)
}

/// The 26 non-blank symbols, in alphabetical order
pub fn alphabet() -> impl Iterator<Item = char> {
    LETTER_DISTRIBUTION
        .iter()
        .map(|(c, _, _)| *c)
        .filter(|c| *c != BLANK)
}

/// Total tiles in a full bag
pub fn full_bag_size() -> usize {
    LETTER_DISTRIBUTION.iter().map(|(_, count, _)| *count as usize).sum()
}

/// A draw asked for more tiles than the bag holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("requested {requested} tiles but only {available} remain in the bag")]
pub struct InsufficientTiles {
    pub requested: usize,
    pub available: usize,
}

/// Take the first `count` tiles of a sequence, returning `(drawn, remaining)`.
/// Drawing past the end yields everything that is left.
pub fn split_draw(count: usize, tiles: &[char]) -> (Vec<char>, Vec<char>) {
    let cut = count.min(tiles.len());
    (tiles[..cut].to_vec(), tiles[cut..].to_vec())
}

/// Shuffled pool of undrawn tiles, consumed from the front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBag {
    tiles: Vec<char>,
}

impl TileBag {
    /// A freshly shuffled full bag
    pub fn new_shuffled() -> Self {
        Self::new_shuffled_with_rng(&mut rand::rng())
    }

    /// A freshly shuffled full bag using a specific RNG (for testing/seeding)
    pub fn new_shuffled_with_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut tiles = Vec::with_capacity(full_bag_size());
        for (symbol, count, _) in LETTER_DISTRIBUTION {
            for _ in 0..count {
                tiles.push(symbol);
            }
        }
        // Fisher-Yates
        tiles.shuffle(rng);
        Self { tiles }
    }

    /// Wrap an explicit tile order
    pub fn from_tiles(tiles: Vec<char>) -> Self {
        Self { tiles }
    }

    /// Draw exactly `count` tiles, or fail without consuming anything
    pub fn draw(&mut self, count: usize) -> Result<Vec<char>, InsufficientTiles> {
        if count > self.tiles.len() {
            return Err(InsufficientTiles {
                requested: count,
                available: self.tiles.len(),
            });
        }
        Ok(self.tiles.drain(..count).collect())
    }

    /// Draw up to `count` tiles, taking whatever remains if the bag runs short
    pub fn draw_up_to(&mut self, count: usize) -> Vec<char> {
        let cut = count.min(self.tiles.len());
        self.tiles.drain(..cut).collect()
    }

    /// Tiles still in the bag, front first
    pub fn tiles(&self) -> &[char] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// With probability `chance`, overwrite one uniformly chosen tile with a blank.
/// Returns the overwritten index.
pub fn maybe_substitute_blank<R: Rng + ?Sized>(
    rng: &mut R,
    tiles: &mut [char],
    chance: f64,
) -> Option<usize> {
    if tiles.is_empty() || !rng.random_bool(chance.clamp(0.0, 1.0)) {
        return None;
    }
    let index = rng.random_range(0..tiles.len());
    tiles[index] = BLANK;
    Some(index)
}

/// A player's private hand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rack {
    tiles: Vec<char>,
}

impl Rack {
    pub fn new(tiles: Vec<char>) -> Self {
        Self { tiles }
    }

    /// Tiles in rack order
    pub fn tiles(&self) -> &[char] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Number of tiles needed to refill to `capacity`
    pub fn missing(&self, capacity: usize) -> usize {
        capacity.saturating_sub(self.tiles.len())
    }

    /// Remove the first tile matching `symbol`. Returns false if absent.
    pub fn take(&mut self, symbol: char) -> bool {
        match self.tiles.iter().position(|&t| t == symbol) {
            Some(index) => {
                self.tiles.remove(index);
                true
            }
            None => false,
        }
    }

    /// Return a tile to the end of the rack
    pub fn put_back(&mut self, symbol: char) {
        self.tiles.push(symbol);
    }

    /// Append newly drawn tiles
    pub fn extend(&mut self, drawn: impl IntoIterator<Item = char>) {
        self.tiles.extend(drawn);
    }

    /// Indices of unassigned blanks
    pub fn blank_indices(&self) -> Vec<usize> {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == BLANK)
            .map(|(i, _)| i)
            .collect()
    }

    /// Turn the blank at `index` into `letter`. Returns false if that slot
    /// is not a blank or the letter is not A-Z.
    pub fn assign_blank(&mut self, index: usize, letter: char) -> bool {
        let letter = letter.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return false;
        }
        match self.tiles.get_mut(index) {
            Some(slot) if *slot == BLANK => {
                *slot = letter;
                true
            }
            _ => false,
        }
    }

    /// Display the rack as a string
    pub fn as_string(&self) -> String {
        self.tiles.iter().collect()
    }
}
