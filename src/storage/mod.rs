#![allow(dead_code)]
//! Persistent storage using SQLite (rusqlite)
//!
//! This module provides:
//! - The record types shared by every client of a game
//! - The `Store` capability the engine reads and writes through
//! - OS-standard data directory location (via `directories` crate)
//! - A SQLite-backed store with schema versioning and a change feed

pub mod feed;

use crate::game::board::{Board, Position};
use crate::game::tiles::Rack;
use crate::game::{GameId, PlayerId};
use directories::ProjectDirs;
use feed::{FeedEvent, FeedHub, Subscription, Table};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Current schema version. Bump this when making schema changes.
/// Version history:
/// - v1: meta, games, players and live_placements tables
const SCHEMA_VERSION: u32 = 1;

/// Database file name inside the data directory
pub const DB_FILE_NAME: &str = "wordgrid.db";

/// Errors from storage and from the transport in front of a remote store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("could not determine data directory")]
    NoDataDirectory,
    #[error("database schema version {found} is newer than supported version {supported}")]
    FutureSchemaVersion { found: u32, supported: u32 },
    #[error("failed to create data directory: {0}")]
    CreateDirFailed(std::io::Error),
    #[error("corrupt {what} record: {reason}")]
    Corrupt { what: &'static str, reason: String },
    #[error("game {0} not found")]
    GameNotFound(GameId),
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),
    #[error("the name {0:?} is already taken in this game")]
    DuplicateName(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("host reported: {0}")]
    Remote(String),
}

impl StoreError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Game lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Fewer than the maximum number of players have joined
    Waiting,
    Active,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(GameStatus::Waiting),
            "active" => Some(GameStatus::Active),
            _ => None,
        }
    }
}

/// The shared game row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub board: Board,
    pub current_player_id: Option<PlayerId>,
    pub status: GameStatus,
    /// Positions of the last submitted main word
    pub last_played_positions: Vec<Position>,
    /// Store-assigned turn token, bumped on every write
    pub version: u64,
}

impl GameRecord {
    /// A waiting game with an empty board
    pub fn new(id: GameId) -> Self {
        Self {
            id,
            board: Board::new(),
            current_player_id: None,
            status: GameStatus::Waiting,
            last_played_positions: Vec::new(),
            version: 0,
        }
    }
}

/// One player seat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub game_id: GameId,
    /// Unique within the game
    pub name: String,
    pub score: u32,
    pub rack: Rack,
    /// Join order, starting at 1
    pub order_num: u32,
}

/// An unsubmitted tile broadcast for other clients to see
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LivePlacement {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub x: usize,
    pub y: usize,
    pub letter: char,
}

impl LivePlacement {
    pub fn pos(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Durable record store with per-game change feeds
pub trait Store: Send {
    fn get_game(&mut self, id: &GameId) -> Result<Option<GameRecord>, StoreError>;

    /// Insert a new game. Returns the stored record with its version.
    fn insert_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError>;

    /// Overwrite a game row. The store bumps the version and returns the result.
    fn update_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError>;

    /// Players of a game ordered by `order_num`
    fn players(&mut self, game_id: &GameId) -> Result<Vec<PlayerRecord>, StoreError>;

    /// Fails with `DuplicateName` if the name is taken in that game
    fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError>;

    fn update_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError>;

    fn placements(&mut self, game_id: &GameId) -> Result<Vec<LivePlacement>, StoreError>;

    /// Insert or replace, keyed by (game, player, x, y)
    fn upsert_placements(&mut self, placements: &[LivePlacement]) -> Result<(), StoreError>;

    /// Remove every live placement of one player
    fn delete_placements(&mut self, game_id: &GameId, player_id: &PlayerId)
        -> Result<(), StoreError>;

    /// Watch one table of one game
    fn subscribe(&mut self, game_id: &GameId, table: Table) -> Result<Subscription, StoreError>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Connection,
    feed: FeedHub,
}

impl SqliteStore {
    /// Open or create the store in the OS-standard data directory.
    ///
    /// - Linux: `$XDG_DATA_HOME/wordgrid/` or `~/.local/share/wordgrid/`
    /// - macOS: `~/Library/Application Support/wordgrid/`
    pub fn open_default() -> Result<Self, StoreError> {
        let data_dir = Self::data_dir()?;
        std::fs::create_dir_all(&data_dir).map_err(StoreError::CreateDirFailed)?;
        Self::open(&data_dir.join(DB_FILE_NAME))
    }

    /// Open or create the store at `path`. `:memory:` opens a private in-memory database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if path == Path::new(":memory:") {
            return Self::open_in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::CreateDirFailed)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = SqliteStore {
            conn,
            feed: FeedHub::new(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Get the OS-standard data directory
    pub fn data_dir() -> Result<PathBuf, StoreError> {
        ProjectDirs::from("", "", "wordgrid")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StoreError::NoDataDirectory)
    }

    /// Number of games stored
    pub fn game_count(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Close every subscription
    pub fn close_feeds(&mut self) {
        self.feed.close_all();
    }

    fn publish_players(&mut self, game_id: &GameId) -> Result<(), StoreError> {
        if self.feed.has_subscribers(game_id, Table::Players) {
            let players = self.players(game_id)?;
            self.feed.publish(game_id, FeedEvent::PlayersChanged(players));
        }
        Ok(())
    }

    fn publish_placements(&mut self, game_id: &GameId) -> Result<(), StoreError> {
        if self.feed.has_subscribers(game_id, Table::LivePlacements) {
            let placements = self.placements(game_id)?;
            self.feed
                .publish(game_id, FeedEvent::PlacementsChanged(placements));
        }
        Ok(())
    }

    // Private helper methods

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let current_version = self.get_schema_version()?;

        if current_version == 0 {
            self.create_schema_v1()?;
        } else if current_version > SCHEMA_VERSION {
            // Database is from a newer build
            return Err(StoreError::FutureSchemaVersion {
                found: current_version,
                supported: SCHEMA_VERSION,
            });
        }

        Ok(())
    }

    fn get_schema_version(&self) -> Result<u32, StoreError> {
        let table_exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='meta'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: u32 = self
            .conn
            .query_row("SELECT schema_version FROM meta LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        Ok(version)
    }

    fn create_schema_v1(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            -- Meta table: schema version
            CREATE TABLE meta (
                schema_version INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Games: board is a JSON 15x15 array, row-major
            CREATE TABLE games (
                id TEXT PRIMARY KEY,
                board TEXT NOT NULL,
                current_player_id TEXT,
                status TEXT NOT NULL,
                last_played TEXT NOT NULL DEFAULT '[]',
                version INTEGER NOT NULL DEFAULT 1
            );

            -- Players: names are unique per game
            CREATE TABLE players (
                id TEXT PRIMARY KEY,
                game_id TEXT NOT NULL,
                name TEXT NOT NULL,
                score INTEGER NOT NULL DEFAULT 0,
                rack TEXT NOT NULL DEFAULT '',
                order_num INTEGER NOT NULL,
                UNIQUE (game_id, name)
            );

            CREATE INDEX idx_players_game ON players (game_id, order_num);

            -- Live placements: advisory, one row per unsubmitted tile
            CREATE TABLE live_placements (
                game_id TEXT NOT NULL,
                player_id TEXT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                letter TEXT NOT NULL,
                PRIMARY KEY (game_id, player_id, x, y)
            );
            "#,
        )?;

        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        self.conn.execute(
            "INSERT INTO meta (schema_version, created_at) VALUES (?1, ?2)",
            params![SCHEMA_VERSION, created_at],
        )?;

        Ok(())
    }
}

/// Raw `games` row before JSON decoding
struct GameRow {
    id: String,
    board: String,
    current_player_id: Option<String>,
    status: String,
    last_played: String,
    version: i64,
}

impl GameRow {
    fn decode(self) -> Result<GameRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            what: "game",
            reason,
        };
        let board: Board = serde_json::from_str(&self.board).map_err(|e| corrupt(e.to_string()))?;
        let last_played_positions: Vec<Position> =
            serde_json::from_str(&self.last_played).map_err(|e| corrupt(e.to_string()))?;
        let status = GameStatus::parse(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {:?}", self.status)))?;
        Ok(GameRecord {
            id: GameId(self.id),
            board,
            current_player_id: self.current_player_id.map(PlayerId),
            status,
            last_played_positions,
            version: self.version.max(0) as u64,
        })
    }
}

fn encode_json<T: Serialize>(what: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        what,
        reason: e.to_string(),
    })
}

fn single_char(what: &'static str, text: &str) -> Result<char, StoreError> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(StoreError::Corrupt {
            what,
            reason: format!("expected one letter, found {:?}", text),
        }),
    }
}

impl Store for SqliteStore {
    fn get_game(&mut self, id: &GameId) -> Result<Option<GameRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, board, current_player_id, status, last_played, version FROM games WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(GameRow {
                        id: row.get(0)?,
                        board: row.get(1)?,
                        current_player_id: row.get(2)?,
                        status: row.get(3)?,
                        last_played: row.get(4)?,
                        version: row.get(5)?,
                    })
                },
            )
            .optional()?;
        row.map(GameRow::decode).transpose()
    }

    fn insert_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        self.conn.execute(
            "INSERT INTO games (id, board, current_player_id, status, last_played, version) VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![
                game.id.as_str(),
                encode_json("game", &game.board)?,
                game.current_player_id.as_ref().map(|p| p.as_str()),
                game.status.as_str(),
                encode_json("game", &game.last_played_positions)?,
            ],
        )?;
        let stored = self
            .get_game(&game.id)?
            .ok_or_else(|| StoreError::GameNotFound(game.id.clone()))?;
        tracing::debug!(game_id = %stored.id, "game inserted");
        self.feed
            .publish(&stored.id, FeedEvent::GameChanged(stored.clone()));
        Ok(stored)
    }

    fn update_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        let changed = self.conn.execute(
            "UPDATE games SET board = ?2, current_player_id = ?3, status = ?4, last_played = ?5, version = version + 1 WHERE id = ?1",
            params![
                game.id.as_str(),
                encode_json("game", &game.board)?,
                game.current_player_id.as_ref().map(|p| p.as_str()),
                game.status.as_str(),
                encode_json("game", &game.last_played_positions)?,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::GameNotFound(game.id.clone()));
        }
        let stored = self
            .get_game(&game.id)?
            .ok_or_else(|| StoreError::GameNotFound(game.id.clone()))?;
        tracing::debug!(game_id = %stored.id, version = stored.version, "game updated");
        self.feed
            .publish(&stored.id, FeedEvent::GameChanged(stored.clone()));
        Ok(stored)
    }

    fn players(&mut self, game_id: &GameId) -> Result<Vec<PlayerRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, game_id, name, score, rack, order_num FROM players WHERE game_id = ?1 ORDER BY order_num",
        )?;
        let rows = stmt.query_map(params![game_id.as_str()], |row| {
            let id: String = row.get(0)?;
            let game_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let score: u32 = row.get(3)?;
            let rack: String = row.get(4)?;
            let order_num: u32 = row.get(5)?;
            Ok((id, game_id, name, score, rack, order_num))
        })?;

        let mut players = Vec::new();
        for row in rows {
            let (id, game_id, name, score, rack, order_num) = row?;
            players.push(PlayerRecord {
                id: PlayerId(id),
                game_id: GameId(game_id),
                name,
                score,
                rack: Rack::new(rack.chars().collect()),
                order_num,
            });
        }
        Ok(players)
    }

    fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO players (id, game_id, name, score, rack, order_num) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                player.id.as_str(),
                player.game_id.as_str(),
                &player.name,
                player.score,
                player.rack.as_string(),
                player.order_num,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::DuplicateName(player.name.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(game_id = %player.game_id, player_id = %player.id, name = %player.name, "player inserted");
        self.publish_players(&player.game_id)
    }

    fn update_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE players SET score = ?2, rack = ?3 WHERE id = ?1",
            params![player.id.as_str(), player.score, player.rack.as_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::PlayerNotFound(player.id.clone()));
        }
        self.publish_players(&player.game_id)
    }

    fn placements(&mut self, game_id: &GameId) -> Result<Vec<LivePlacement>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id, x, y, letter FROM live_placements WHERE game_id = ?1 ORDER BY player_id, y, x",
        )?;
        let rows = stmt.query_map(params![game_id.as_str()], |row| {
            let player_id: String = row.get(0)?;
            let x: i64 = row.get(1)?;
            let y: i64 = row.get(2)?;
            let letter: String = row.get(3)?;
            Ok((player_id, x, y, letter))
        })?;

        let mut placements = Vec::new();
        for row in rows {
            let (player_id, x, y, letter) = row?;
            placements.push(LivePlacement {
                game_id: game_id.clone(),
                player_id: PlayerId(player_id),
                x: x.max(0) as usize,
                y: y.max(0) as usize,
                letter: single_char("live placement", &letter)?,
            });
        }
        Ok(placements)
    }

    fn upsert_placements(&mut self, placements: &[LivePlacement]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for p in placements {
            tx.execute(
                "INSERT OR REPLACE INTO live_placements (game_id, player_id, x, y, letter) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    p.game_id.as_str(),
                    p.player_id.as_str(),
                    p.x as i64,
                    p.y as i64,
                    p.letter.to_string(),
                ],
            )?;
        }
        tx.commit()?;

        let mut games: Vec<&GameId> = placements.iter().map(|p| &p.game_id).collect();
        games.dedup();
        for game_id in games {
            let game_id = game_id.clone();
            self.publish_placements(&game_id)?;
        }
        Ok(())
    }

    fn delete_placements(
        &mut self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM live_placements WHERE game_id = ?1 AND player_id = ?2",
            params![game_id.as_str(), player_id.as_str()],
        )?;
        self.publish_placements(game_id)
    }

    fn subscribe(&mut self, game_id: &GameId, table: Table) -> Result<Subscription, StoreError> {
        Ok(self.feed.subscribe(game_id, table))
    }
}

/// A store shared between several owners in one process
pub struct SharedStore<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, S>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl<S: Store> Store for SharedStore<S> {
    fn get_game(&mut self, id: &GameId) -> Result<Option<GameRecord>, StoreError> {
        self.lock()?.get_game(id)
    }

    fn insert_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        self.lock()?.insert_game(game)
    }

    fn update_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        self.lock()?.update_game(game)
    }

    fn players(&mut self, game_id: &GameId) -> Result<Vec<PlayerRecord>, StoreError> {
        self.lock()?.players(game_id)
    }

    fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        self.lock()?.insert_player(player)
    }

    fn update_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        self.lock()?.update_player(player)
    }

    fn placements(&mut self, game_id: &GameId) -> Result<Vec<LivePlacement>, StoreError> {
        self.lock()?.placements(game_id)
    }

    fn upsert_placements(&mut self, placements: &[LivePlacement]) -> Result<(), StoreError> {
        self.lock()?.upsert_placements(placements)
    }

    fn delete_placements(
        &mut self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<(), StoreError> {
        self.lock()?.delete_placements(game_id, player_id)
    }

    fn subscribe(&mut self, game_id: &GameId, table: Table) -> Result<Subscription, StoreError> {
        self.lock()?.subscribe(game_id, table)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn get_game(&mut self, id: &GameId) -> Result<Option<GameRecord>, StoreError> {
        (**self).get_game(id)
    }

    fn insert_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        (**self).insert_game(game)
    }

    fn update_game(&mut self, game: &GameRecord) -> Result<GameRecord, StoreError> {
        (**self).update_game(game)
    }

    fn players(&mut self, game_id: &GameId) -> Result<Vec<PlayerRecord>, StoreError> {
        (**self).players(game_id)
    }

    fn insert_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        (**self).insert_player(player)
    }

    fn update_player(&mut self, player: &PlayerRecord) -> Result<(), StoreError> {
        (**self).update_player(player)
    }

    fn placements(&mut self, game_id: &GameId) -> Result<Vec<LivePlacement>, StoreError> {
        (**self).placements(game_id)
    }

    fn upsert_placements(&mut self, placements: &[LivePlacement]) -> Result<(), StoreError> {
        (**self).upsert_placements(placements)
    }

    fn delete_placements(
        &mut self,
        game_id: &GameId,
        player_id: &PlayerId,
    ) -> Result<(), StoreError> {
        (**self).delete_placements(game_id, player_id)
    }

    fn subscribe(&mut self, game_id: &GameId, table: Table) -> Result<Subscription, StoreError> {
        (**self).subscribe(game_id, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed::{FeedMessage, SubscriptionStatus};

    fn player(game: &GameId, name: &str, order_num: u32) -> PlayerRecord {
        PlayerRecord {
            id: PlayerId::generate(),
            game_id: game.clone(),
            name: name.to_string(),
            score: 0,
            rack: Rack::new(vec!['C', 'A', 'T']),
            order_num,
        }
    }

    fn placement(game: &GameId, player: &PlayerId, x: usize, y: usize, letter: char) -> LivePlacement {
        LivePlacement {
            game_id: game.clone(),
            player_id: player.clone(),
            x,
            y,
            letter,
        }
    }

    #[test]
    fn test_storage_creation() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(store.game_count().unwrap(), 0);
    }

    #[test]
    fn test_game_roundtrip_and_version_bump() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut game = GameRecord::new(GameId::generate());
        game.board.set(Position::new(7, 7), 'Q');

        let stored = store.insert_game(&game).unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.board.get(Position::new(7, 7)), Some('Q'));
        assert_eq!(stored.status, GameStatus::Waiting);

        let mut next = stored.clone();
        next.status = GameStatus::Active;
        next.last_played_positions = vec![Position::new(7, 7)];
        let updated = store.update_game(&next).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(store.get_game(&game.id).unwrap(), Some(updated));
    }

    #[test]
    fn test_missing_game() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = GameId::from("nope");
        assert!(store.get_game(&id).unwrap().is_none());
        assert!(matches!(
            store.update_game(&GameRecord::new(id)),
            Err(StoreError::GameNotFound(_))
        ));
    }

    #[test]
    fn test_players_ordered_and_names_unique() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let game = GameId::generate();
        store.insert_player(&player(&game, "bea", 2)).unwrap();
        store.insert_player(&player(&game, "ann", 1)).unwrap();

        let names: Vec<String> = store.players(&game).unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["ann", "bea"]);

        let err = store.insert_player(&player(&game, "ann", 3)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(name) if name == "ann"));

        // Same name in a different game is fine
        store.insert_player(&player(&GameId::generate(), "ann", 1)).unwrap();
    }

    #[test]
    fn test_update_player_score_and_rack() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let game = GameId::generate();
        let mut p = player(&game, "ann", 1);
        store.insert_player(&p).unwrap();
        p.score = 42;
        p.rack = Rack::new(vec!['_', 'Z']);
        store.update_player(&p).unwrap();
        let stored = &store.players(&game).unwrap()[0];
        assert_eq!(stored.score, 42);
        assert_eq!(stored.rack.as_string(), "_Z");
    }

    #[test]
    fn test_upsert_is_keyed_by_cell() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let game = GameId::generate();
        let me = PlayerId::generate();
        store
            .upsert_placements(&[placement(&game, &me, 1, 1, 'A'), placement(&game, &me, 2, 1, 'B')])
            .unwrap();
        store.upsert_placements(&[placement(&game, &me, 1, 1, 'C')]).unwrap();
        let rows = store.placements(&game).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|p| p.x == 1 && p.letter == 'C'));
    }

    #[test]
    fn test_delete_placements_only_for_that_player() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let game = GameId::generate();
        let me = PlayerId::generate();
        let other = PlayerId::generate();
        store
            .upsert_placements(&[placement(&game, &me, 1, 1, 'A'), placement(&game, &other, 5, 5, 'B')])
            .unwrap();
        store.delete_placements(&game, &me).unwrap();
        let rows = store.placements(&game).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player_id, other);
    }

    #[test]
    fn test_writes_publish_full_snapshots() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let game = GameRecord::new(GameId::generate());
        let mut games = store.subscribe(&game.id, Table::Games).unwrap();
        let mut players = store.subscribe(&game.id, Table::Players).unwrap();

        let stored = store.insert_game(&game).unwrap();
        store.insert_player(&player(&game.id, "ann", 1)).unwrap();
        store.insert_player(&player(&game.id, "bea", 2)).unwrap();

        let game_msgs = games.drain();
        assert_eq!(game_msgs[0], FeedMessage::Status(SubscriptionStatus::Subscribed));
        assert_eq!(game_msgs[1], FeedMessage::Event(FeedEvent::GameChanged(stored)));

        let player_msgs = players.drain();
        match player_msgs.last() {
            Some(FeedMessage::Event(FeedEvent::PlayersChanged(list))) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_shared_store_sees_same_data() {
        let shared = SharedStore::new(SqliteStore::open_in_memory().unwrap());
        let mut a = shared.clone();
        let mut b = shared;
        let game = a.insert_game(&GameRecord::new(GameId::generate())).unwrap();
        assert_eq!(b.get_game(&game.id).unwrap(), Some(game));
    }

    #[test]
    fn test_file_backed_store_reopens() {
        let dir = std::env::temp_dir().join(format!("wordgrid-test-{}", GameId::generate()));
        let path = dir.join(DB_FILE_NAME);
        let id = GameId::generate();
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.insert_game(&GameRecord::new(id.clone())).unwrap();
        }
        let mut store = SqliteStore::open(&path).unwrap();
        assert!(store.get_game(&id).unwrap().is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
