//! Game logic: board, tiles, word validation, scoring, turns

pub mod board;
pub mod dictionary;
pub mod scoring;
pub mod tiles;
pub mod turn;
pub mod validation;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use board::{Board, Position, SpecialCell, BOARD_SIZE};
pub use dictionary::{Lexicon, LexiconHandle, WordList};
pub use scoring::{BonusTile, TurnScore};
pub use tiles::{Rack, TileBag, BLANK, RACK_SIZE};
pub use turn::{TurnClock, TurnState};
pub use validation::{ExtractedMove, MoveError, PendingTile};

/// 16 random bytes rendered as lowercase hex
fn random_hex_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// A new random identifier
            pub fn generate() -> Self {
                Self(random_hex_id())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of one game
    GameId
);

string_id!(
    /// Identifier of one player seat in one game
    PlayerId
);
