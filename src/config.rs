//! Engine tunables and store location

use crate::game::tiles::RACK_SIZE;
use crate::game::turn::{BonusOdds, TURN_SECONDS};
use crate::network::server::DEFAULT_PORT;
use crate::storage::{SqliteStore, StoreError};
use crate::sync::RETRY_INTERVAL;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rules and timings that are policy rather than board geometry
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub turn_seconds: u64,
    /// How often a disconnected session retries
    pub retry_interval: Duration,
    pub max_players: usize,
    pub rack_size: usize,
    /// Chance of a blank in a fresh deal
    pub initial_blank_chance: f64,
    /// Chance of a blank in an end-of-turn restock
    pub restock_blank_chance: f64,
    pub bonus_odds: BonusOdds,
    /// Extra word list merged into the embedded one
    pub extra_words: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turn_seconds: TURN_SECONDS,
            retry_interval: RETRY_INTERVAL,
            max_players: 4,
            rack_size: RACK_SIZE,
            initial_blank_chance: 0.25,
            restock_blank_chance: 0.10,
            bonus_odds: BonusOdds::default(),
            extra_words: None,
        }
    }
}

/// Where the authoritative store lives
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file; `None` means `<data dir>/wordgrid.db`
    pub db_path: Option<PathBuf>,
    /// First port the host tries
    pub port: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
        }
    }
}

impl StoreConfig {
    /// Open the configured SQLite store. `:memory:` gives a throwaway one.
    pub fn open(&self) -> Result<SqliteStore, StoreError> {
        match &self.db_path {
            Some(path) => SqliteStore::open(path),
            None => SqliteStore::open_default(),
        }
    }

    pub fn with_db_path(mut self, path: impl AsRef<Path>) -> Self {
        self.db_path = Some(path.as_ref().to_path_buf());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.turn_seconds, 20);
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.max_players, 4);
        assert_eq!(config.rack_size, 7);
        assert!((config.bonus_odds.blank - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_store_config() {
        let config = StoreConfig::default().with_db_path(":memory:");
        let mut store = config.open().unwrap();
        assert!(store.get_game(&crate::game::GameId::from("x")).unwrap().is_none());
        assert_eq!(StoreConfig::default().port, 55433);
    }
}
