//! wordgrid - networked, turn-based word placement on a shared 15x15 board
//!
//! Players take turns laying tiles from their rack. Each turn's tiles are
//! turned into words, checked against a lexicon, scored with the board's
//! special cells and a per-turn bonus tile, and written to a shared store
//! whose change feeds keep every client's replica current.

pub mod app;
pub mod config;
pub mod game;
pub mod network;
pub mod storage;
pub mod sync;
pub mod tui;

#[cfg(test)]
mod testing;

pub use app::{EngineError, ErrorKind, GameSession, TurnReport};
pub use config::{EngineConfig, StoreConfig};
